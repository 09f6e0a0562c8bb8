//! HTTP(S) transport backed by `ureq`
//!
//! `ureq` is blocking, so every call runs on tokio's blocking pool.

use crate::config::schema::RemoteRepoConfig;
use crate::error::{DepotError, DepotResult};
use crate::remote::{RemoteContent, RemoteError, RemoteMeta, RemoteTransport, TransportFactory};
use async_trait::async_trait;
use chrono::DateTime;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;

/// Connect timeout used for every origin
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport for an HTTP(S) origin
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    agent: Agent,
}

impl HttpTransport {
    pub fn new(base_url: &str, socket_timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_recv_response(Some(socket_timeout))
            .timeout_recv_body(Some(socket_timeout))
            .http_status_as_error(false)
            .build();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: Agent::new_with_config(config),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn blocking<T, F>(&self, url: String, call: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(Agent, String) -> Result<T, RemoteError> + Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || call(agent, url))
            .await
            .map_err(|e| RemoteError::Transport(format!("transport task failed: {}", e)))?
    }
}

fn classify(url: &str, err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Timeout(t) => RemoteError::Timeout(format!("{} ({:?})", url, t)),
        ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            RemoteError::Timeout(format!("{} ({})", url, e))
        }
        ureq::Error::Io(e) => RemoteError::Connection(format!("{} ({})", url, e)),
        other => RemoteError::Transport(format!("{} ({})", url, other)),
    }
}

fn header<'a>(headers: &'a ureq::http::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn meta_from_headers(headers: &ureq::http::HeaderMap) -> RemoteMeta {
    let size = header(headers, "content-length")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(-1);
    let last_modified = header(headers, "last-modified")
        .and_then(|v| DateTime::parse_from_rfc2822(v.trim()).ok())
        .map(|dt| dt.timestamp_millis());

    RemoteMeta {
        size,
        last_modified,
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn probe(&self, path: &str) -> Result<Option<RemoteMeta>, RemoteError> {
        let url = self.url(path);
        debug!("HEAD {}", url);

        self.blocking(url, |agent, url| {
            let response = agent.head(&url).call().map_err(|e| classify(&url, e))?;
            match response.status().as_u16() {
                200..=299 => Ok(Some(meta_from_headers(response.headers()))),
                404 | 410 => Ok(None),
                status => Err(RemoteError::Status { status, url }),
            }
        })
        .await
    }

    async fn fetch(&self, path: &str) -> Result<RemoteContent, RemoteError> {
        let url = self.url(path);
        debug!("GET {}", url);

        self.blocking(url, |agent, url| {
            let mut response = agent.get(&url).call().map_err(|e| classify(&url, e))?;
            match response.status().as_u16() {
                200..=299 => {}
                404 | 410 => return Err(RemoteError::NotFound(url)),
                status => return Err(RemoteError::Status { status, url }),
            }

            let mut meta = meta_from_headers(response.headers());
            let content = response
                .body_mut()
                .with_config()
                .limit(u64::MAX)
                .read_to_vec()
                .map_err(|e| classify(&url, e))?;
            meta.size = content.len() as i64;

            Ok(RemoteContent { meta, content })
        })
        .await
    }
}

/// Creates `HttpTransport`s from remote repository configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn create(&self, config: &RemoteRepoConfig) -> DepotResult<Arc<dyn RemoteTransport>> {
        let url = config.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DepotError::RepositoryConfig(format!(
                "remote repository {} has unsupported url {:?}",
                config.common.key, config.url
            )));
        }
        Ok(Arc::new(HttpTransport::new(
            url,
            Duration::from_millis(config.socket_timeout_ms),
        )))
    }
}
