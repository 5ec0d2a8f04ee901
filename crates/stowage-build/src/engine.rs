//! コンテナエンジンの抽象化
//!
//! 各バックエンドは [`ContainerEngine`] を実装する。構築時に [`connect`] で
//! 大文字小文字を区別しない識別子からバックエンドを1つだけ選ぶ。

use crate::auth::RegistryAuth;
use crate::docker::DockerEngine;
use crate::error::{BuildError, BuildResult, EngineError};
use async_trait::async_trait;
use futures_util::io::AsyncBufRead;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 既知のエンジンバックエンド
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Docker デーモン API
    #[default]
    Docker,
    Podman,
    /// `docker` コマンドラインクライアント
    DockerCli,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Docker, EngineKind::Podman, EngineKind::DockerCli];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Docker => "docker",
            EngineKind::Podman => "podman",
            EngineKind::DockerCli => "docker-cli",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, EngineKind::Docker)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let choice = s.trim().to_ascii_lowercase();
        match choice.as_str() {
            "" | "docker" => Ok(EngineKind::Docker),
            "podman" => Ok(EngineKind::Podman),
            "docker-cli" => Ok(EngineKind::DockerCli),
            _ => Err(BuildError::UnknownEngine(s.to_string())),
        }
    }
}

/// ビルド時にエンジンへ渡すオプション
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOptions {
    pub dockerfile: String,
    /// ビルド結果に付けるイメージ参照
    pub tag: String,
    pub labels: HashMap<String, String>,
}

/// エンジンが返す1行1JSONのレスポンスボディ
///
/// [`AsyncBufRead`] で読み、使い終わったら [`ResponseStream::close`] で解放する。
#[async_trait]
pub trait ResponseStream: AsyncBufRead + Send + Unpin {
    async fn close(&mut self) -> std::io::Result<()>;
}

/// レスポンスはエンジン接続を借用できるので、エンジンより長くは生きない
pub type Response<'a> = Option<Box<dyn ResponseStream + 'a>>;

/// ビルドパイプラインが必要とするエンジンの機能
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// ビルドコンテキストのアーカイブを送信
    async fn build_image<'a>(
        &'a self,
        archive: Vec<u8>,
        options: BuildOptions,
    ) -> Result<Response<'a>, EngineError>;

    /// ローカルイメージ `source` に参照 `destination` を追加
    async fn tag_image(&self, source: &str, destination: &str) -> Result<(), EngineError>;

    async fn push_image<'a>(
        &'a self,
        destination: &str,
        auth: &RegistryAuth,
    ) -> Result<Response<'a>, EngineError>;
}

/// `choice` で指定されたバックエンドを構築
///
/// 空文字はデフォルトのバックエンドを選ぶ。既知だが未実装のバックエンドは
/// [`BuildError::UnsupportedEngine`] になる。
pub fn connect(choice: &str) -> BuildResult<Box<dyn ContainerEngine>> {
    let kind: EngineKind = choice.parse()?;
    tracing::debug!("Selected container engine: {}", kind);

    match kind {
        EngineKind::Docker => Ok(Box::new(DockerEngine::connect()?)),
        EngineKind::Podman | EngineKind::DockerCli => Err(BuildError::UnsupportedEngine(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_engine_case_insensitive() {
        assert_eq!("docker".parse::<EngineKind>().unwrap(), EngineKind::Docker);
        assert_eq!("Docker".parse::<EngineKind>().unwrap(), EngineKind::Docker);
        assert_eq!("PODMAN".parse::<EngineKind>().unwrap(), EngineKind::Podman);
        assert_eq!(
            "Docker-CLI".parse::<EngineKind>().unwrap(),
            EngineKind::DockerCli
        );
    }

    #[test]
    fn test_parse_engine_empty_is_default() {
        assert_eq!("".parse::<EngineKind>().unwrap(), EngineKind::default());
    }

    #[test]
    fn test_parse_engine_unknown() {
        let err = "containerd".parse::<EngineKind>().unwrap_err();
        assert!(matches!(err, BuildError::UnknownEngine(ref name) if name == "containerd"));
    }

    #[test]
    fn test_connect_rejects_unsupported_backends() {
        for choice in ["podman", "docker-cli", "Podman"] {
            match connect(choice) {
                Err(BuildError::UnsupportedEngine(kind)) => assert!(!kind.is_supported()),
                Err(e) => panic!("unexpected error for {}: {}", choice, e),
                Ok(_) => panic!("{} should not be supported", choice),
            }
        }
    }

    #[test]
    fn test_connect_rejects_unknown_backend() {
        assert!(matches!(
            connect("rkt"),
            Err(BuildError::UnknownEngine(_))
        ));
    }

    #[test]
    fn test_only_docker_is_supported() {
        let supported: Vec<_> = EngineKind::ALL
            .iter()
            .filter(|k| k.is_supported())
            .collect();
        assert_eq!(supported, vec![&EngineKind::Docker]);
    }
}
