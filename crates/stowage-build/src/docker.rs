//! Docker デーモンのバックエンド
//!
//! bollard はビルドとプッシュの進捗をデコード済みで返す。各項目を1行のJSONに
//! 書き戻し、デーモンのワイヤ形式のまま呼び出し側に渡す。

use crate::auth::RegistryAuth;
use crate::engine::{BuildOptions, ContainerEngine, EngineKind, Response, ResponseStream};
use crate::error::{BuildError, BuildResult, EngineError};
use crate::reference::split_image_tag;
use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as DockerError;
use bollard::models::{BuildInfo, PushImageInfo};
use bytes::Bytes;
use futures_util::io::{AsyncBufRead, AsyncRead};
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use http_body_util::{Either, Full};
use serde_json::{Map, Value};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// `DOCKER_HOST` またはプラットフォーム既定のソケットに接続
    pub fn connect() -> BuildResult<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(BuildError::Connect)?;
        Ok(Self::new(docker))
    }

    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Docker
    }

    async fn build_image<'a>(
        &'a self,
        archive: Vec<u8>,
        options: BuildOptions,
    ) -> Result<Response<'a>, EngineError> {
        tracing::info!("Building image: {}", options.tag);

        #[allow(deprecated)]
        let build_options = bollard::image::BuildImageOptions::<String> {
            dockerfile: options.dockerfile,
            t: options.tag,
            labels: options.labels,
            ..Default::default()
        };
        tracing::debug!("Build options: {:?}", build_options);

        let body = Full::new(Bytes::from(archive));
        let stream = self
            .docker
            .build_image(build_options, None, Some(Either::Left(body)));

        into_response(stream, build_line).await
    }

    async fn tag_image(&self, source: &str, destination: &str) -> Result<(), EngineError> {
        let (repo, tag) = split_image_tag(destination);
        tracing::debug!("Tagging {} as {}:{}", source, repo, tag);

        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions::<String> { repo, tag };
        self.docker.tag_image(source, Some(options)).await?;
        Ok(())
    }

    async fn push_image<'a>(
        &'a self,
        destination: &str,
        auth: &RegistryAuth,
    ) -> Result<Response<'a>, EngineError> {
        let (image, tag) = split_image_tag(destination);
        tracing::info!("Pushing image: {}", destination);

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> { tag };

        #[allow(deprecated)]
        let stream = self
            .docker
            .push_image(&image, Some(options), auth.docker_credentials());

        into_response(stream, push_line).await
    }
}

/// bollard の進捗ストリームを行区切りのレスポンスに変換
///
/// リクエストは最初のポーリングで送信されるため、先頭項目の通信エラーや
/// HTTPエラーはデーモンが呼び出し自体を拒否したことを意味する。
async fn into_response<'a, T, S>(
    stream: S,
    to_line: fn(T) -> Value,
) -> Result<Response<'a>, EngineError>
where
    T: Send + Unpin + 'a,
    S: Stream<Item = Result<T, DockerError>> + Send + 'a,
{
    let mut stream = Box::pin(stream);
    let first = match stream.next().await {
        None => return Ok(None),
        Some(Err(e)) if is_rejection(&e) => return Err(EngineError::Docker(e)),
        Some(item) => item,
    };

    let lines = stream::iter(Some(first))
        .chain(stream)
        .map(move |item| encode_item(item, to_line));

    Ok(Some(Box::new(DaemonStream::new(lines.into_async_read()))))
}

/// ストリーム内容に由来するエラーは拒否ではない
fn is_rejection(e: &DockerError) -> bool {
    !matches!(
        e,
        DockerError::DockerStreamError { .. }
            | DockerError::JsonDataError { .. }
            | DockerError::JsonSerdeError { .. }
    )
}

fn encode_item<T>(
    item: Result<T, DockerError>,
    to_line: fn(T) -> Value,
) -> io::Result<Bytes> {
    match item {
        Ok(info) => encode_line(&to_line(info)),
        // bollard はメッセージしか残さない
        Err(DockerError::DockerStreamError { error }) => {
            encode_line(&serde_json::json!({ "error": error }))
        }
        // デコードできなかった行はそのまま戻す
        Err(DockerError::JsonDataError { contents, .. }) => {
            let mut line = contents.trim_end_matches(['\r', '\n']).as_bytes().to_vec();
            line.push(b'\n');
            Ok(Bytes::from(line))
        }
        Err(DockerError::JsonSerdeError { err }) => {
            Err(io::Error::new(io::ErrorKind::InvalidData, err))
        }
        Err(e) => Err(io::Error::other(e)),
    }
}

fn encode_line(line: &Value) -> io::Result<Bytes> {
    let mut bytes = serde_json::to_vec(line).map_err(io::Error::other)?;
    bytes.push(b'\n');
    Ok(Bytes::from(bytes))
}

/// ビルド進捗をデーモンのフィールド名で1行に戻す
#[allow(deprecated)]
fn build_line(info: BuildInfo) -> Value {
    let mut line = Map::new();
    if let Some(stream) = info.stream {
        line.insert("stream".to_string(), Value::String(stream));
    }
    if let Some(status) = info.status {
        line.insert("status".to_string(), Value::String(status));
    }
    if let Some(error) = info.error {
        line.insert("error".to_string(), Value::String(error));
    }
    if let Some(message) = info.error_detail.and_then(|d| d.message) {
        line.insert(
            "errorDetail".to_string(),
            serde_json::json!({ "message": message }),
        );
    }
    Value::Object(line)
}

#[allow(deprecated)]
fn push_line(info: PushImageInfo) -> Value {
    let mut line = Map::new();
    if let Some(status) = info.status {
        line.insert("status".to_string(), Value::String(status));
    }
    if let Some(progress) = info.progress {
        line.insert("progress".to_string(), Value::String(progress));
    }
    if let Some(error) = info.error {
        line.insert("error".to_string(), Value::String(error));
    }
    Value::Object(line)
}

/// Docker デーモンから読むレスポンスボディ
pub struct DaemonStream<'a> {
    reader: Pin<Box<dyn AsyncBufRead + Send + 'a>>,
}

impl<'a> DaemonStream<'a> {
    fn new(reader: impl AsyncBufRead + Send + 'a) -> Self {
        Self {
            reader: Box::pin(reader),
        }
    }
}

impl AsyncRead for DaemonStream<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().reader.as_mut().poll_read(cx, buf)
    }
}

impl AsyncBufRead for DaemonStream<'_> {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        self.get_mut().reader.as_mut().poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        self.get_mut().reader.as_mut().consume(amt)
    }
}

#[async_trait]
impl<'a> ResponseStream for DaemonStream<'a> {
    /// HTTPボディを破棄してデーモンとの接続を閉じる
    async fn close(&mut self) -> io::Result<()> {
        self.reader = Box::pin(futures_util::io::empty());
        Ok(())
    }
}
