//! レジストリへのプッシュ認証情報
//!
//! 認証情報は1つのトークンとして扱う。JSONオブジェクト
//! `{"username", "password", "serveraddress"}` を URL-safe base64 で
//! エンコードしたもの。ローカルでは検証しない。
//!
//! Docker バックエンドは bollard 経由でプッシュするため、このトークンを
//! そのままヘッダに載せることはできない。bollard は [`DockerCredentials`] を
//! 標準の base64 で再エンコードし、未設定のフィールドは `null` として送る。
//! ヘッダのバイト列はトークンと一致しないが、各フィールドの値は一致させる。

use crate::error::{BuildError, BuildResult};
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Serialize;
use std::fmt;

/// 認証情報をシリアライズできなかったときの扱い
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// 警告を出し、空のトークンでプッシュ
    #[default]
    Lenient,
    /// プッシュを失敗させる
    Strict,
}

/// フィールド名と省略規則はエンジンの認証設定に合わせる
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
struct Credentials {
    #[serde(skip_serializing_if = "String::is_empty")]
    username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    password: String,
    #[serde(rename = "serveraddress", skip_serializing_if = "String::is_empty")]
    server_address: String,
}

/// 1つのレジストリ向けにエンコードした認証情報
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    credentials: Credentials,
    token: String,
}

impl RegistryAuth {
    /// `server_address` 向けに認証情報をエンコード
    pub fn encode(
        username: &str,
        password: &str,
        server_address: &str,
        policy: CredentialPolicy,
    ) -> BuildResult<Self> {
        let credentials = Credentials {
            username: username.to_string(),
            password: password.to_string(),
            server_address: server_address.to_string(),
        };

        let token = match encode_token(&credentials) {
            Ok(token) => token,
            Err(source) => match policy {
                CredentialPolicy::Lenient => {
                    tracing::warn!(
                        "Failed to encode credentials for {}, pushing without them: {}",
                        server_address,
                        source
                    );
                    String::new()
                }
                CredentialPolicy::Strict => {
                    return Err(BuildError::Credentials {
                        registry: server_address.to_string(),
                        source,
                    });
                }
            },
        };

        Ok(Self { credentials, token })
    }

    /// レジストリ認証ヘッダ用の base64 トークン
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn server_address(&self) -> &str {
        &self.credentials.server_address
    }

    /// bollard に渡す形の認証情報。トークンが空なら `None`
    pub fn docker_credentials(&self) -> Option<DockerCredentials> {
        if self.token.is_empty() {
            return None;
        }

        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Some(DockerCredentials {
            username: non_empty(&self.credentials.username),
            password: non_empty(&self.credentials.password),
            serveraddress: non_empty(&self.credentials.server_address),
            ..Default::default()
        })
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.credentials.username)
            .field("server_address", &self.credentials.server_address)
            .finish_non_exhaustive()
    }
}

fn encode_token(credentials: &Credentials) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(credentials)?;
    Ok(base64::engine::general_purpose::URL_SAFE.encode(json))
}
