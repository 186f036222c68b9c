use std::future::Future;
use std::path::PathBuf;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use crate::error::FetchError;

/// Source of manifest, tile, search and legacy documents.
pub trait TileFetcher: Send + Sync + 'static {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

pub async fn fetch_json<T, F>(fetcher: &F, path: &str) -> Result<T, FetchError>
where
    T: DeserializeOwned,
    F: TileFetcher,
{
    let bytes = fetcher.fetch(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Fetches paths relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base: Url,
}

impl HttpFetcher {
    pub fn new(base: &str) -> Result<Self, FetchError> {
        let mut base = Url::parse(base).map_err(|err| FetchError::InvalidUrl(format!("{base}: {err}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client: Client::new(), base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

impl TileFetcher for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let url = self
            .base
            .join(path)
            .map_err(|err| FetchError::InvalidUrl(format!("{path}: {err}")))?;
        tracing::debug!("GET {url}");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Reads paths below a local directory.
#[derive(Debug, Clone)]
pub struct DirFetcher {
    root: PathBuf,
}

impl DirFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TileFetcher for DirFetcher {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let full = self.root.join(path.trim_start_matches('/'));
        tokio::fs::read(&full)
            .await
            .map_err(|source| FetchError::Io { path: full, source })
    }
}
