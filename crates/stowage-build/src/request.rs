use crate::error::{BuildError, BuildResult};
use crate::reference::{validate_tag, working_reference};
use std::fmt;
use std::path::{Path, PathBuf};

/// ビルドしたイメージに保持期間を付けるラベルのキー
pub const RETENTION_LABEL: &str = "quay.expires-after";

/// ビルド対象とラベル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    source: PathBuf,
    name: String,
    tags: Vec<String>,
    retention: String,
}

impl BuildRequest {
    /// `tags` は空でなく、すべて有効な Docker タグであること
    pub fn new(
        source: impl Into<PathBuf>,
        name: impl Into<String>,
        tags: Vec<String>,
        retention: impl Into<String>,
    ) -> BuildResult<Self> {
        let name = name.into();
        if tags.is_empty() {
            return Err(BuildError::EmptyTags { name });
        }
        for tag in &tags {
            validate_tag(tag)?;
        }

        Ok(Self {
            source: source.into(),
            name,
            tags,
            retention: retention.into(),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn retention(&self) -> &str {
        &self.retention
    }

    /// 先頭のタグ。ローカルのビルドに使う
    pub fn primary_tag(&self) -> &str {
        &self.tags[0]
    }

    /// `name:tags[0]`
    pub fn working_reference(&self) -> String {
        working_reference(&self.name, self.primary_tag())
    }
}

/// プッシュ先。認証情報が空なら匿名でプッシュ
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Registry {
    pub url: String,
    pub namespace: String,
    pub username: String,
    pub password: String,
}

impl Registry {
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// 実行するステージ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stages {
    pub build: bool,
    pub tag: bool,
    pub push: bool,
}

impl Stages {
    pub const ALL: Stages = Stages {
        build: true,
        tag: true,
        push: true,
    };

    /// レジストリが必要なステージがあるか
    pub fn publishes(&self) -> bool {
        self.tag || self.push
    }
}

impl Default for Stages {
    fn default() -> Self {
        Self::ALL
    }
}
