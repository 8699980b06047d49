//! Media enrichment: the slow external "describe this media" call and the
//! bounded pool that runs it off the event-handling path.

use std::{
    collections::HashSet,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    domain::{ChatId, MediaMeta, MessageId},
    errors::Error,
    Result,
};

#[derive(Clone, Debug)]
pub struct DescribeRequest {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub media: MediaMeta,
}

/// Port for whatever produces a human-readable media description.
#[async_trait]
pub trait MediaDescriber: Send + Sync {
    async fn describe(&self, req: &DescribeRequest) -> Result<String>;
}

/// Describer used when no external service is configured: waits, then answers
/// with a fixed description.
pub struct StaticDescriber {
    delay: Duration,
    description: String,
}

impl StaticDescriber {
    pub fn new(delay: Duration, description: impl Into<String>) -> Self {
        Self {
            delay,
            description: description.into(),
        }
    }
}

#[async_trait]
impl MediaDescriber for StaticDescriber {
    async fn describe(&self, req: &DescribeRequest) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        if self.description.trim().is_empty() {
            return Ok(format!(
                "{} ({} bytes)",
                if req.media.mime_type.is_empty() {
                    "media"
                } else {
                    req.media.mime_type.as_str()
                },
                req.media.size_bytes
            ));
        }
        Ok(self.description.clone())
    }
}

type JobKey = (MessageId, String);

/// Bounded worker pool for enrichment jobs.
///
/// - at most `max_concurrency` describer calls run at once
/// - each call is bounded by `timeout`
/// - a job is keyed by `(message id, hash)`; a duplicate key still in flight is rejected
/// - `shutdown()` stops intake, waits the grace period, then cancels what is left
pub struct EnrichmentPool {
    describer: Arc<dyn MediaDescriber>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    tracker: TaskTracker,
    cancel: CancellationToken,
    in_flight: Arc<Mutex<HashSet<JobKey>>>,
}

impl EnrichmentPool {
    pub fn new(describer: Arc<dyn MediaDescriber>, max_concurrency: usize, timeout: Duration) -> Self {
        Self {
            describer,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            timeout,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Queue a job. `on_done` runs exactly once for an accepted job: with the
    /// description on success, or `None` after a failure, timeout or
    /// cancellation at shutdown.
    ///
    /// Returns `false` if the job was not accepted (shutting down or duplicate).
    pub fn submit<F, Fut>(&self, req: DescribeRequest, on_done: F) -> bool
    where
        F: FnOnce(Option<String>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            warn!(message_id = %req.message_id, "enrichment pool is shutting down; job dropped");
            return false;
        }

        let key: JobKey = (req.message_id.clone(), req.media.hash.clone());
        if !lock_set(&self.in_flight).insert(key.clone()) {
            debug!(message_id = %key.0, hash = %key.1, "enrichment already in flight");
            return false;
        }

        let describer = self.describer.clone();
        let permits = self.permits.clone();
        let timeout = self.timeout;
        let cancel = self.cancel.clone();
        let in_flight = self.in_flight.clone();

        self.tracker.spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                r = run_job(describer.as_ref(), &permits, timeout, &req) => Some(r),
            };

            let description = match outcome {
                Some(Ok(description)) => Some(description),
                Some(Err(e)) => {
                    warn!(message_id = %req.message_id, hash = %req.media.hash, "enrichment failed: {e}");
                    None
                }
                None => {
                    info!(message_id = %req.message_id, "enrichment cancelled at shutdown");
                    None
                }
            };
            on_done(description).await;

            lock_set(&in_flight).remove(&key);
        });

        true
    }

    /// Number of jobs queued or running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                pending = self.tracker.len(),
                "enrichment still running after grace period; cancelling"
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }
    }
}

async fn run_job(
    describer: &dyn MediaDescriber,
    permits: &Semaphore,
    timeout: Duration,
    req: &DescribeRequest,
) -> Result<String> {
    let _permit = permits
        .acquire()
        .await
        .map_err(|_| Error::External("enrichment pool closed".to_string()))?;

    let description = tokio::time::timeout(timeout, describer.describe(req))
        .await
        .map_err(|_| Error::External(format!("enrichment timed out after {timeout:?}")))??;

    if description.trim().is_empty() {
        return Err(Error::External("describer returned an empty description".to_string()));
    }
    Ok(description)
}

fn lock_set(m: &Mutex<HashSet<JobKey>>) -> std::sync::MutexGuard<'_, HashSet<JobKey>> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::mpsc;

    use super::*;
    use crate::testing::ScriptedDescriber;

    fn req(id: &str, hash: &str) -> DescribeRequest {
        DescribeRequest {
            message_id: MessageId::new(id),
            chat_id: ChatId::new("c1"),
            media: MediaMeta {
                hash: hash.to_string(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn completed_job_reports_description() {
        let describer = Arc::new(ScriptedDescriber::answering("a dog"));
        let pool = EnrichmentPool::new(describer, 2, Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(pool.submit(req("m1", "h1"), move |d| async move {
            let _ = tx.send(d);
        }));

        assert_eq!(rx.recv().await.flatten().as_deref(), Some("a dog"));
        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_job_reports_no_description() {
        let describer = Arc::new(ScriptedDescriber::answering("late").with_delay(Duration::from_secs(30)));
        let pool = EnrichmentPool::new(describer, 1, Duration::from_secs(1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        pool.submit(req("m1", "h1"), move |d| async move {
            let _ = tx.send(d);
        });

        pool.shutdown(Duration::from_secs(60)).await;
        assert_eq!(rx.recv().await, Some(None));
    }

    #[tokio::test]
    async fn failed_job_reports_no_description() {
        let describer = Arc::new(ScriptedDescriber::answering("x").failing_first(1));
        let pool = EnrichmentPool::new(describer, 1, Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();

        pool.submit(req("m1", "h1"), move |d| async move {
            let _ = tx.send(d);
        });

        pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(rx.recv().await, Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_jobs_past_grace() {
        let describer = Arc::new(ScriptedDescriber::answering("slow").with_delay(Duration::from_secs(600)));
        let pool = EnrichmentPool::new(describer, 1, Duration::from_secs(3600));
        let described = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let (d, f) = (described.clone(), finished.clone());
        pool.submit(req("m1", "h1"), move |desc| async move {
            if desc.is_some() {
                d.fetch_add(1, Ordering::SeqCst);
            }
            f.fetch_add(1, Ordering::SeqCst);
        });

        pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(pool.pending(), 0);
        assert_eq!(described.load(Ordering::SeqCst), 0);
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        // Intake is closed after shutdown.
        assert!(!pool.submit(req("m2", "h2"), |_| async {}));
    }

    #[tokio::test]
    async fn duplicate_key_in_flight_is_rejected() {
        let describer = Arc::new(ScriptedDescriber::answering("x").with_delay(Duration::from_millis(200)));
        let pool = EnrichmentPool::new(describer, 4, Duration::from_secs(5));

        assert!(pool.submit(req("m1", "h1"), |_| async {}));
        assert!(!pool.submit(req("m1", "h1"), |_| async {}));
        assert!(pool.submit(req("m2", "h1"), |_| async {}));

        pool.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let describer = Arc::new(ScriptedDescriber::answering("x").with_delay(Duration::from_millis(50)));
        let pool = EnrichmentPool::new(describer.clone(), 2, Duration::from_secs(5));

        for i in 0..6 {
            pool.submit(req(&format!("m{i}"), &format!("h{i}")), |_| async {});
        }
        pool.shutdown(Duration::from_secs(5)).await;

        assert_eq!(describer.calls(), 6);
        assert!(describer.max_concurrent() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn static_describer_waits_then_answers() {
        let d = StaticDescriber::new(Duration::from_secs(10), "fixed");
        let started = tokio::time::Instant::now();
        assert_eq!(d.describe(&req("m1", "h1")).await.unwrap(), "fixed");
        assert!(started.elapsed() >= Duration::from_secs(10));

        let d = StaticDescriber::new(Duration::ZERO, "");
        let mut r = req("m1", "h1");
        r.media.mime_type = "image/png".to_string();
        r.media.size_bytes = 10;
        assert_eq!(d.describe(&r).await.unwrap(), "image/png (10 bytes)");
    }
}
