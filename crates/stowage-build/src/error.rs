use crate::engine::EngineKind;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// エラーが発生したエンジン操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Build,
    Tag,
    Push,
}

impl Operation {
    fn verb(&self) -> &'static str {
        match self {
            Operation::Build => "building",
            Operation::Tag => "tagging",
            Operation::Push => "pushing",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Build => f.write_str("build"),
            Operation::Tag => f.write_str("tag"),
            Operation::Push => f.write_str("push"),
        }
    }
}

/// バックエンドが1回のAPI呼び出しに対して返した失敗
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),

    #[error("{0}")]
    Rejected(String),
}

/// レスポンスストリーム読み取り中の失敗
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("error unmarshalling container engine stream line {line} ({source})")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// 最終行でエンジンが送ったエラーオブジェクト
    #[error("{message}")]
    Engine {
        message: String,
        detail: Option<String>,
    },

    #[error("error reading container engine stream ({0})")]
    Read(#[source] std::io::Error),

    #[error("error writing container engine stream to output ({0})")]
    Sink(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{0} is not supported yet")]
    UnsupportedEngine(EngineKind),

    #[error("unknown container engine '{0}' (expected one of: docker, podman, docker-cli)")]
    UnknownEngine(String),

    #[error("error while creating Docker client ({0})")]
    Connect(#[source] bollard::errors::Error),

    #[error("at least one tag is required to build {name}")]
    EmptyTags { name: String },

    #[error("invalid image tag: {tag}")]
    InvalidTag { tag: String },

    #[error("no registry configured to {operation} {name}")]
    NoRegistry { operation: Operation, name: String },

    #[error("error archiving {} ({source})", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error {} {target} ({source})", .operation.verb())]
    Request {
        operation: Operation,
        target: String,
        #[source]
        source: EngineError,
    },

    #[error("error for {target} found by container engine during {operation} ({source})")]
    Stream {
        operation: Operation,
        target: String,
        #[source]
        source: StreamError,
    },

    #[error("error closing image {operation} response ({source})")]
    Close {
        operation: Operation,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} of {target} timed out after {}s", .limit.as_secs())]
    Timeout {
        operation: Operation,
        target: String,
        limit: std::time::Duration,
    },

    #[error("error encoding credentials for {registry} ({source})")]
    Credentials {
        registry: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BuildError {
    /// 操作中に発生したエラーならその操作
    pub fn operation(&self) -> Option<Operation> {
        match self {
            BuildError::Request { operation, .. }
            | BuildError::Stream { operation, .. }
            | BuildError::Close { operation, .. }
            | BuildError::Timeout { operation, .. }
            | BuildError::NoRegistry { operation, .. } => Some(*operation),
            BuildError::Archive { .. } | BuildError::EmptyTags { .. } => Some(Operation::Build),
            BuildError::Credentials { .. } => Some(Operation::Push),
            _ => None,
        }
    }

    /// 終端のエラー行に由来する場合、エンジン自身のメッセージ
    pub fn engine_message(&self) -> Option<&str> {
        match self {
            BuildError::Stream {
                source: StreamError::Engine { message, .. },
                ..
            } => Some(message),
            _ => None,
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_names_operation_and_target() {
        let err = BuildError::Stream {
            operation: Operation::Push,
            target: "reg1.io/ns/app:v1".to_string(),
            source: StreamError::Engine {
                message: "denied: requested access to the resource is denied".to_string(),
                detail: None,
            },
        };
        assert_eq!(
            err.to_string(),
            "error for reg1.io/ns/app:v1 found by container engine during push \
             (denied: requested access to the resource is denied)"
        );
        assert_eq!(err.operation(), Some(Operation::Push));
        assert_eq!(
            err.engine_message(),
            Some("denied: requested access to the resource is denied")
        );
    }

    #[test]
    fn test_unsupported_engine_message() {
        let err = BuildError::UnsupportedEngine(EngineKind::Podman);
        assert_eq!(err.to_string(), "podman is not supported yet");
        assert_eq!(err.operation(), None);
    }

    #[test]
    fn test_request_error_uses_operation_verb() {
        let err = BuildError::Request {
            operation: Operation::Tag,
            target: "reg1.io/ns/app:v1".to_string(),
            source: EngineError::Rejected("No such image: app:v1".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "error tagging reg1.io/ns/app:v1 (No such image: app:v1)"
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = BuildError::Timeout {
            operation: Operation::Build,
            target: "app".to_string(),
            limit: std::time::Duration::from_secs(300),
        };
        assert_eq!(err.to_string(), "build of app timed out after 300s");
    }
}
