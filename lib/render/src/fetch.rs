use bytes::Bytes;
use std::future::Future;
use std::time::Duration;

use crate::error::RenderError;

/// Resolves an auxiliary value (URL or path) into raw resource bytes
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, reference: &str) -> impl Future<Output = Result<Bytes, RenderError>> + Send;
}

/// Fetches `http(s)://` references over the network and everything else
/// (`file://` or bare paths) from disk.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("artmatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RenderError::Fetch {
                reference: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    async fn fetch_http(&self, reference: &str) -> Result<Bytes, RenderError> {
        let fetch_err = |e: reqwest::Error| RenderError::Fetch {
            reference: reference.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(reference).send().await.map_err(fetch_err)?;
        if !response.status().is_success() {
            return Err(RenderError::Status {
                reference: reference.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.bytes().await.map_err(fetch_err)
    }
}

impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, reference: &str) -> Result<Bytes, RenderError> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return self.fetch_http(reference).await;
        }

        let path = reference.strip_prefix("file://").unwrap_or(reference);
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| RenderError::Fetch {
                reference: reference.to_string(),
                message: e.to_string(),
            })
    }
}
