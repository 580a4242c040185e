mod config;
mod container;
mod graph_store;
mod resource_mapper;
pub mod vocab;

#[cfg(test)]
mod container_tests;

pub use config::LdpConfig;
pub use container::ContainerBuilder;
pub use graph_store::{
    parse_graph, serialize_graph, FetchTlsConfig, GraphFetcher, LocalGraphFetcher,
    RemoteGraphFetcher,
};
pub use resource_mapper::{MappedFile, MappedUrl, ResourceMapper};

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LdpError {
    #[error("internal error: {0}")]
    Internal(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("content type mismatch: {0}")]
    ContentTypeMismatch(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("remote error: {0}")]
    RemoteError(String),
    #[error("invalid param: {0}")]
    InvalidParam(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl LdpError {
    pub fn from_http_status(code: StatusCode, info: String) -> Self {
        match code {
            StatusCode::NOT_FOUND => LdpError::NotFound(info),
            StatusCode::INTERNAL_SERVER_ERROR => LdpError::Internal(info),
            _ => LdpError::RemoteError(format!("HTTP error: {} for {}", code, info)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LdpError::NotFound(_))
    }
}

pub type LdpResult<T> = std::result::Result<T, LdpError>;

// ErrorKind::NotFound must stay observable: the policy walk and the mapper
// both branch on "absent" vs. any other I/O failure.
impl From<std::io::Error> for LdpError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            LdpError::NotFound(err.to_string())
        } else {
            LdpError::IoError(err.to_string())
        }
    }
}
