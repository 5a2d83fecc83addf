use std::future::Future;

use colored::*;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::config::SiteConfig;
use crate::error::{Error, Result};

/// The network boundary: one GET per call, no retries.
pub trait Fetcher {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

impl<F: Fetcher + Sync> Fetcher for &F {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<Vec<u8>>> + Send {
        (**self).fetch(url)
    }
}

/// Fetches over HTTP(S) with `reqwest`.
pub struct HttpFetcher {
    client: Client,
    credentials: Option<(String, String)>,
}

impl HttpFetcher {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(site.user_agent.as_str());
        if let Some(timeout) = site.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        let credentials = site
            .credentials()
            .map(|(user, password)| (user.to_string(), password.to_string()));
        if credentials.is_some() {
            debug!("Using basic auth for {}", site.base_url);
        }

        Ok(Self {
            client,
            credentials,
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        info!("Fetching \"{}\"", url.as_str().green());

        let mut request = self.client.get(url.clone());
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await.map_err(|e| Error::fetch(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::fetch(url, e))?;
        debug!("Received {} bytes from {}", body.len(), url);
        Ok(body.to_vec())
    }
}

/// Refuses every request, leaving the cache as the only source.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFetcher;

impl Fetcher for OfflineFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        Err(Error::Offline {
            url: url.to_string(),
        })
    }
}
