//! Liveness probe against the server's websocket status endpoint

use async_trait::async_trait;
use tracing::debug;

use crate::api::ApiResponse;
use crate::types::error::Result;

#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Ask the server whether our realtime session is known, using `token`
    async fn probe(&self, token: &str) -> Result<()>;
}

/// `GET <status_url>` with the bearer token
pub struct HttpStatusProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpStatusProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn probe(&self, token: &str) -> Result<()> {
        let response = self.client.get(&self.url).bearer_auth(token).send().await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiResponse { status, body }.into_error());
        }

        debug!("Realtime status check ok");
        Ok(())
    }
}
