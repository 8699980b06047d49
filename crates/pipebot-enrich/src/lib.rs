//! HTTP media describer.
//!
//! POSTs the media metadata as JSON to a configured endpoint and expects
//! `{"description": "..."}` back.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use pipebot_core::{
    enrich::{DescribeRequest, MediaDescriber},
    errors::Error,
    Result,
};

#[derive(Clone, Debug)]
pub struct HttpDescriber {
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpDescriber {
    /// `timeout` bounds the HTTP exchange itself; the enrichment pool applies
    /// its own per-job limit on top.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("describer client build error: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            http,
        })
    }
}

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    message_id: &'a str,
    chat_id: &'a str,
    hash: &'a str,
    mime_type: &'a str,
    size_bytes: u64,
    width: u32,
    height: u32,
    duration_secs: f64,
}

impl<'a> From<&'a DescribeRequest> for RequestBody<'a> {
    fn from(req: &'a DescribeRequest) -> Self {
        Self {
            message_id: req.message_id.as_str(),
            chat_id: req.chat_id.as_str(),
            hash: &req.media.hash,
            mime_type: &req.media.mime_type,
            size_bytes: req.media.size_bytes,
            width: req.media.width,
            height: req.media.height,
            duration_secs: req.media.duration_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    description: String,
}

fn parse_description(body: &str) -> Result<String> {
    let parsed: ResponseBody = serde_json::from_str(body)?;
    let description = parsed.description.trim();
    if description.is_empty() {
        return Err(Error::External(
            "describer returned an empty description".to_string(),
        ));
    }
    Ok(description.to_string())
}

#[async_trait]
impl MediaDescriber for HttpDescriber {
    async fn describe(&self, req: &DescribeRequest) -> Result<String> {
        let mut builder = self.http.post(&self.endpoint).json(&RequestBody::from(req));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| Error::External(format!("describer request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("describer read error: {e}")))?;

        if !status.is_success() {
            return Err(Error::External(format!(
                "describer failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        parse_description(&body)
    }
}
