use crate::app::ports::{HttpClientPort, HttpGetResult};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use std::time::Duration;
use tracing::debug;

/// reqwest-backed transport for the EIA client
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("oil-regime/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers.get(name)?.to_str().ok().map(str::to_owned)
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str) -> Result<HttpGetResult> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?.to_vec();

        // EIA does not always send a length; fall back to the body we read
        let content_length = header_str(&headers, CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
            .unwrap_or(bytes.len() as u64);
        debug!(status, content_length, "GET complete");

        Ok(HttpGetResult {
            status,
            content_type: header_str(&headers, CONTENT_TYPE)
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            content_length,
            etag: header_str(&headers, ETAG),
            last_modified: header_str(&headers, LAST_MODIFIED),
            bytes,
        })
    }
}
