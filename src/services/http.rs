//! [`FileApi`] over the server's HTTP endpoints.
//!
//! `ureq` is blocking, so every call runs on tokio's blocking pool.

use crate::model::file_node::decode_nodes;
use crate::model::{FileNode, NodeKind};
use crate::primitives::path_utils;
use crate::services::api::{ApiError, FileApi};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Timeout applied to every request/response round-trip.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpFileApi {
    base: Url,
    agent: ureq::Agent,
}

impl HttpFileApi {
    /// `endpoint` is the server origin, e.g. `http://localhost:8080`.
    pub fn new(endpoint: &str) -> Result<Self, ApiError> {
        let base = parse_base(endpoint)?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(REQUEST_TIMEOUT)
            .build();
        Ok(Self { base, agent })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `{base}/api/files[/path]?root=R`
    fn files_url(&self, root: &str, path: Option<&str>) -> Result<Url, ApiError> {
        let mut segments = vec!["api".to_string(), "files".to_string()];
        if let Some(path) = path {
            segments.extend(
                path_utils::normalize(path)
                    .split(path_utils::SEPARATOR)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        api_url(&self.base, &segments, root)
    }

    async fn call(
        &self,
        method: &'static str,
        url: Url,
        body: Option<String>,
    ) -> Result<String, ApiError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || {
            tracing::debug!("{} {}", method, url);
            let request = agent.request_url(method, &url);
            let result = match body {
                Some(body) => request
                    .set("Content-Type", "application/json")
                    .send_string(&body),
                None => request.call(),
            };
            match result {
                Ok(response) => response
                    .into_string()
                    .map_err(|e| ApiError::Decode(e.to_string())),
                Err(e) => Err(map_ureq_error(e)),
            }
        })
        .await
        .map_err(|e| ApiError::Transport(format!("request task failed: {e}")))?
    }
}

/// Parse a server origin, accepting a missing trailing slash.
pub fn parse_base(endpoint: &str) -> Result<Url, ApiError> {
    let url = Url::parse(endpoint.trim())
        .map_err(|e| ApiError::Transport(format!("invalid endpoint '{}': {}", endpoint, e)))?;
    if url.cannot_be_a_base() {
        return Err(ApiError::Transport(format!(
            "invalid endpoint '{}': not a base URL",
            endpoint
        )));
    }
    Ok(url)
}

/// Append `segments` to `base`'s path and add the `root` query parameter.
pub fn api_url(base: &Url, segments: &[String], root: &str) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::Transport(format!("invalid endpoint '{}'", base)))?
        .pop_if_empty()
        .extend(segments);
    url.set_query(None);
    url.query_pairs_mut().append_pair("root", root);
    Ok(url)
}

pub fn map_ureq_error(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Status(code, response) => ApiError::Status {
            code,
            message: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(t) => ApiError::Transport(t.to_string()),
    }
}

#[async_trait]
impl FileApi for HttpFileApi {
    async fn list_dir(
        &self,
        root: &str,
        path: Option<&str>,
    ) -> Result<Option<Vec<FileNode>>, ApiError> {
        let mut url = self.files_url(root, None)?;
        if let Some(path) = path.map(path_utils::normalize).filter(|p| !p.is_empty()) {
            url.query_pairs_mut()
                .append_pair("path", &path_utils::to_wire(&path));
        }
        let body = self.call("GET", url, None).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let nodes = decode_nodes(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(Some(nodes))
    }

    async fn extend_watch(&self, root: &str, path: &str) -> Result<(), ApiError> {
        let url = api_url(&self.base, &["api".into(), "expand".into()], root)?;
        let body = serde_json::json!({ "path": path_utils::to_wire(path) }).to_string();
        self.call("POST", url, Some(body)).await.map(|_| ())
    }

    async fn create(&self, root: &str, path: &str, kind: NodeKind) -> Result<(), ApiError> {
        let url = self.files_url(root, None)?;
        let body = serde_json::json!({
            "path": path_utils::to_wire(path),
            "type": kind.as_str(),
        })
        .to_string();
        self.call("POST", url, Some(body)).await.map(|_| ())
    }

    async fn rename(&self, root: &str, from: &str, to: &str) -> Result<(), ApiError> {
        let url = self.files_url(root, Some(from))?;
        let body = serde_json::json!({ "newPath": path_utils::to_wire(to) }).to_string();
        self.call("PATCH", url, Some(body)).await.map(|_| ())
    }

    async fn delete(&self, root: &str, path: &str) -> Result<(), ApiError> {
        let url = self.files_url(root, Some(path))?;
        self.call("DELETE", url, None).await.map(|_| ())
    }

    async fn read_file(&self, root: &str, path: &str) -> Result<String, ApiError> {
        let url = self.files_url(root, Some(path))?;
        self.call("GET", url, None).await
    }

    async fn write_file(&self, root: &str, path: &str, content: &str) -> Result<(), ApiError> {
        let url = self.files_url(root, Some(path))?;
        let agent = self.agent.clone();
        let content = content.to_string();
        tokio::task::spawn_blocking(move || {
            tracing::debug!("PUT {}", url);
            agent
                .request_url("PUT", &url)
                .set("Content-Type", "text/plain; charset=utf-8")
                .send_string(&content)
                .map(|_| ())
                .map_err(map_ureq_error)
        })
        .await
        .map_err(|e| ApiError::Transport(format!("request task failed: {e}")))?
    }
}
