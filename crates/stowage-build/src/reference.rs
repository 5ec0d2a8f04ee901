//! イメージ参照の組み立て
//!
//! 作業参照（`name:tag`）はローカルでビルドしたイメージ、宛先参照
//! （`registry/namespace/name:tag`）はプッシュ先を指す。どちらも都度生成する。

use crate::error::{BuildError, BuildResult};
use crate::request::Registry;

/// `name:tag`
pub fn working_reference(name: &str, tag: &str) -> String {
    format!("{}:{}", name, tag)
}

/// `registryURL/namespace/name:tag`
///
/// 区切りの `/` が1つになるよう、URL末尾と namespace 前後の `/` を落とす。
pub fn destination_reference(registry: &Registry, name: &str, tag: &str) -> String {
    format!(
        "{}/{}/{}:{}",
        registry.url.trim_end_matches('/'),
        registry.namespace.trim_matches('/'),
        name,
        tag
    )
}

/// Docker のタグ文法 `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}` で検証
pub fn validate_tag(tag: &str) -> BuildResult<()> {
    let mut chars = tag.chars();
    let valid = tag.len() <= 128
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));

    if valid {
        Ok(())
    } else {
        Err(BuildError::InvalidTag {
            tag: tag.to_string(),
        })
    }
}

/// 宛先参照をリポジトリとタグに分ける
///
/// `reg1.io/ns/app:v1` -> `("reg1.io/ns/app", "v1")`。
/// 最後の `:` の後ろに `/` があればポート番号なのでタグは `latest`。
pub fn split_image_tag(image: &str) -> (String, String) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), tag.to_string()),
        _ => (image.to_string(), "latest".to_string()),
    }
}
