use crate::model::{FileNode, NodeKind};
use async_trait::async_trait;
use std::fmt;

/// Failure of a call against the workspace file API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The server answered with a non-success status. `message` is the
    /// human-readable response body.
    Status { code: u16, message: String },
    /// The request never produced a response.
    Transport(String),
    /// The response body could not be decoded.
    Decode(String),
}

impl ApiError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { code, message } if message.trim().is_empty() => {
                format!("HTTP {code}")
            }
            ApiError::Status { message, .. } => message.trim().to_string(),
            ApiError::Transport(msg) | ApiError::Decode(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Status { code, message } => write!(f, "HTTP {}: {}", code, message.trim()),
            ApiError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ApiError::Decode(msg) => write!(f, "Decode error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Async access to the workspace file API of the server.
///
/// Every call is scoped by `root`. Paths are canonical (see
/// [`crate::primitives::path_utils`]); implementations convert them to the
/// wire form.
#[async_trait]
pub trait FileApi: Send + Sync {
    /// List one level of `path`, or the whole watched tree when `path` is
    /// `None`.
    ///
    /// `Ok(None)` means the server returned no listing, which callers treat
    /// as an empty folder.
    async fn list_dir(
        &self,
        root: &str,
        path: Option<&str>,
    ) -> Result<Option<Vec<FileNode>>, ApiError>;

    /// Ask the server to include `path` in future pushed snapshots.
    async fn extend_watch(&self, root: &str, path: &str) -> Result<(), ApiError>;

    async fn create(&self, root: &str, path: &str, kind: NodeKind) -> Result<(), ApiError>;

    async fn rename(&self, root: &str, from: &str, to: &str) -> Result<(), ApiError>;

    async fn delete(&self, root: &str, path: &str) -> Result<(), ApiError>;

    async fn read_file(&self, root: &str, path: &str) -> Result<String, ApiError>;

    /// Save hook used to flush dirty editor content.
    async fn write_file(&self, root: &str, path: &str, content: &str) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefers_body() {
        let err = ApiError::Status {
            code: 409,
            message: "file already exists\n".into(),
        };
        assert_eq!(err.user_message(), "file already exists");
        assert_eq!(err.to_string(), "HTTP 409: file already exists");
    }

    #[test]
    fn test_user_message_falls_back_to_status() {
        let err = ApiError::Status {
            code: 500,
            message: "  ".into(),
        };
        assert_eq!(err.user_message(), "HTTP 500");
    }
}
