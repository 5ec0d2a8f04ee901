//! Stowage イメージビルドパイプライン
//!
//! ローカルのコンテキストディレクトリからコンテナイメージをビルドし、
//! 1つ以上のレジストリ向けにタグを付けてプッシュする。エンジンの進捗出力は
//! そのまま流す。接続済みのバックエンドは Docker デーモンのみ。

pub mod auth;
pub mod client;
pub mod context;
pub mod docker;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod reference;
pub mod request;
pub mod session;
pub mod stream;

pub use auth::{CredentialPolicy, RegistryAuth};
pub use client::{EngineClient, ImageClient};
pub use context::ContextArchive;
pub use docker::DockerEngine;
pub use engine::{BuildOptions, ContainerEngine, EngineKind, ResponseStream};
pub use error::{BuildError, BuildResult, EngineError, Operation, StreamError};
pub use pipeline::{Pipeline, ensure_registries};
pub use reference::{destination_reference, working_reference};
pub use request::{BuildRequest, RETENTION_LABEL, Registry, Stages};
pub use session::Deadlines;
pub use stream::{CaptureSink, ProgressSink, StdoutSink, decode};
