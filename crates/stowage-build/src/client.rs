//! エンジン操作
//!
//! [`EngineClient`] は [`ContainerEngine`] に対して Build / Tag / Push を実行する。
//! 呼び出しごとに期限付きのセッションを開き、レスポンスストリームを
//! 進捗シンクへ流し込む。ストリームは戻る前に必ず閉じる。

use crate::auth::{CredentialPolicy, RegistryAuth};
use crate::context::ContextArchive;
use crate::engine::{self, BuildOptions, ContainerEngine, EngineKind, Response};
use crate::error::{BuildError, BuildResult, EngineError, Operation};
use crate::reference::working_reference;
use crate::request::RETENTION_LABEL;
use crate::session::{Deadlines, Session};
use crate::stream::{self, ProgressSink, StdoutSink};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// パイプラインが組み合わせるイメージ操作
#[async_trait]
pub trait ImageClient: Send + Sync {
    /// `source` のコンテキストを `name:tags[0]` としてビルドし、保持期間ラベルを付ける
    async fn build(
        &self,
        source: &Path,
        name: &str,
        tags: &[String],
        retention: &str,
    ) -> BuildResult<()>;

    async fn tag(&self, source: &str, destination: &str) -> BuildResult<()>;

    async fn push(
        &self,
        destination: &str,
        username: &str,
        password: &str,
        registry: &str,
    ) -> BuildResult<()>;
}

pub struct EngineClient {
    engine: Box<dyn ContainerEngine>,
    sink: Arc<dyn ProgressSink>,
    deadlines: Deadlines,
    credential_policy: CredentialPolicy,
}

impl EngineClient {
    pub fn new(engine: Box<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            sink: Arc::new(StdoutSink),
            deadlines: Deadlines::default(),
            credential_policy: CredentialPolicy::default(),
        }
    }

    /// `choice` のバックエンドに接続（[`engine::connect`] を参照）
    pub fn connect(choice: &str) -> BuildResult<Self> {
        Ok(Self::new(engine::connect(choice)?))
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_deadlines(mut self, deadlines: Deadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn with_credential_policy(mut self, policy: CredentialPolicy) -> Self {
        self.credential_policy = policy;
        self
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.engine.kind()
    }

    /// レスポンスをデコードして閉じる。クローズの失敗はデコード成功時のみ報告
    async fn drain(
        &self,
        operation: Operation,
        target: &str,
        response: Response<'_>,
    ) -> BuildResult<()> {
        let Some(mut body) = response else {
            return Ok(());
        };

        let decoded = stream::decode(&mut body, self.sink.as_ref()).await;
        let closed = body.close().await;

        decoded.map_err(|source| BuildError::Stream {
            operation,
            target: target.to_string(),
            source,
        })?;
        closed.map_err(|source| BuildError::Close { operation, source })
    }

    fn request_error(
        operation: Operation,
        target: &str,
    ) -> impl FnOnce(EngineError) -> BuildError {
        let target = target.to_string();
        move |source| BuildError::Request {
            operation,
            target,
            source,
        }
    }
}

#[async_trait]
impl ImageClient for EngineClient {
    async fn build(
        &self,
        source: &Path,
        name: &str,
        tags: &[String],
        retention: &str,
    ) -> BuildResult<()> {
        let tag = tags.first().ok_or_else(|| BuildError::EmptyTags {
            name: name.to_string(),
        })?;
        let image_tag = working_reference(name, tag);

        let archive = ContextArchive::from_dir(source).map_err(|e| BuildError::Archive {
            path: source.to_path_buf(),
            source: e,
        })?;

        let options = BuildOptions {
            dockerfile: "Dockerfile".to_string(),
            tag: image_tag.clone(),
            labels: HashMap::from([(RETENTION_LABEL.to_string(), retention.to_string())]),
        };

        Session::open(Operation::Build, name, &self.deadlines)
            .run(async move {
                let response = self
                    .engine
                    .build_image(archive, options)
                    .await
                    .map_err(Self::request_error(Operation::Build, name))?;
                self.drain(Operation::Build, name, response).await
            })
            .await?;

        tracing::info!("Successfully built: {}", image_tag);
        Ok(())
    }

    async fn tag(&self, source: &str, destination: &str) -> BuildResult<()> {
        Session::open(Operation::Tag, destination, &self.deadlines)
            .run(async move {
                self.engine
                    .tag_image(source, destination)
                    .await
                    .map_err(Self::request_error(Operation::Tag, destination))
            })
            .await?;

        tracing::info!("Tagged {} as {}", source, destination);
        Ok(())
    }

    async fn push(
        &self,
        destination: &str,
        username: &str,
        password: &str,
        registry: &str,
    ) -> BuildResult<()> {
        let auth = RegistryAuth::encode(username, password, registry, self.credential_policy)?;

        Session::open(Operation::Push, destination, &self.deadlines)
            .run(async move {
                let response = self
                    .engine
                    .push_image(destination, &auth)
                    .await
                    .map_err(Self::request_error(Operation::Push, destination))?;
                self.drain(Operation::Push, destination, response).await
            })
            .await?;

        tracing::info!("Successfully pushed: {}", destination);
        Ok(())
    }
}
