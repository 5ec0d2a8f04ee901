pub mod error;

pub use error::*;

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 設定ファイルを直接指定する環境変数
pub const CONFIG_ENV: &str = "STOWAGE_CONFIG";

const CANDIDATES: [&str; 2] = ["stowage.yaml", ".stowage.yaml"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// コンテナエンジンの識別子
    pub engine: String,
    /// ビルドしたイメージに付ける保持期間ラベルの値
    pub retention: String,
    pub timeouts: Timeouts,
    /// 認証情報をエンコードできないとき、匿名でプッシュせず失敗させる
    pub strict_credentials: bool,
    pub registries: Vec<RegistryConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: "docker".to_string(),
            retention: "90d".to_string(),
            timeouts: Timeouts::default(),
            strict_credentials: false,
            registries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    pub build_secs: u64,
    pub tag_secs: u64,
    pub push_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            build_secs: 300,
            tag_secs: 120,
            push_secs: 120,
        }
    }
}

impl Timeouts {
    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    pub fn tag(&self) -> Duration {
        Duration::from_secs(self.tag_secs)
    }

    pub fn push(&self) -> Duration {
        Duration::from_secs(self.push_secs)
    }
}

/// 設定ファイルに書かれたプッシュ先
///
/// 認証情報は直接書くか、`username_env` / `password_env` で指定した
/// 環境変数から読む。直接書いた値が優先。
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    pub url: String,
    pub namespace: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub username_env: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("username_env", &self.username_env)
            .field("password_env", &self.password_env)
            .finish()
    }
}

/// 1つのレジストリ向けに解決したユーザー名とパスワード。両方空なら匿名
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl RegistryConfig {
    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            username: self.resolve(&self.username, &self.username_env)?,
            password: self.resolve(&self.password, &self.password_env)?,
        })
    }

    fn resolve(&self, value: &Option<String>, env: &Option<String>) -> Result<String> {
        if let Some(value) = value {
            return Ok(value.clone());
        }
        match env {
            Some(var) => std::env::var(var).map_err(|_| ConfigError::MissingEnv {
                var: var.clone(),
                registry: self.url.clone(),
            }),
            None => Ok(String::new()),
        }
    }
}

impl Config {
    /// [`find_config_file`] で見つけた設定を読み込む。見つからなければデフォルト
    pub fn discover() -> Result<Self> {
        match find_config_file()? {
            Some(path) => Self::from_file(&path),
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// 設定ファイルを読み込んで検証（ファイルは必須）
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        tracing::debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // 空ファイルは空のマップではなく null になる
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn validate(&self) -> Result<()> {
        for (index, registry) in self.registries.iter().enumerate() {
            if registry.url.trim().is_empty() {
                return Err(ConfigError::InvalidRegistry {
                    index,
                    reason: "url is empty".to_string(),
                });
            }
            if registry.namespace.trim_matches('/').is_empty() {
                return Err(ConfigError::InvalidRegistry {
                    index,
                    reason: format!("namespace for {} is empty", registry.url),
                });
            }
        }
        Ok(())
    }
}

/// 設定ファイルを探す
///
/// 検索順序:
/// 1. `STOWAGE_CONFIG`（ファイルが存在すること）
/// 2. カレントディレクトリ: `stowage.yaml`, `.stowage.yaml`
/// 3. `<設定ディレクトリ>/stowage/config.yaml`
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }
        return Ok(Some(path));
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.is_file() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stowage").join("config.yaml");
        if global_config.is_file() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    /// 設定関連の環境変数を外した状態で `dir` の中で `f` を実行
    fn in_dir<R>(dir: &Path, config_home: &Path, f: impl FnOnce() -> R) -> R {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = temp_env::with_vars(
            [
                (CONFIG_ENV, None),
                ("XDG_CONFIG_HOME", Some(config_home.as_os_str())),
            ],
            f,
        );
        std::env::set_current_dir(original_dir).unwrap();
        result
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine, "docker");
        assert_eq!(config.retention, "90d");
        assert_eq!(config.timeouts.build(), Duration::from_secs(300));
        assert_eq!(config.timeouts.tag(), Duration::from_secs(120));
        assert_eq!(config.timeouts.push(), Duration::from_secs(120));
        assert!(!config.strict_credentials);
        assert!(config.registries.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
engine: Docker
retention: 2w
strict_credentials: true
timeouts:
  build_secs: 600
registries:
  - url: reg1.io
    namespace: allyourbases
    username: user1
    password_env: REG1_PASSWORD
"#,
        )
        .unwrap();

        assert_eq!(config.engine, "Docker");
        assert_eq!(config.retention, "2w");
        assert!(config.strict_credentials);
        assert_eq!(config.timeouts.build_secs, 600);
        assert_eq!(config.timeouts.push_secs, 120);
        assert_eq!(config.registries.len(), 1);
        assert_eq!(config.registries[0].username.as_deref(), Some("user1"));
        assert_eq!(
            config.registries[0].password_env.as_deref(),
            Some("REG1_PASSWORD")
        );
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::parse("  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(Config::parse("engnie: docker\n").is_err());
    }

    #[test]
    fn test_parse_error_names_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stowage.yaml");
        fs::write(&path, "registries: [unclosed\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("stowage.yaml"));
    }

    #[test]
    fn test_from_file_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&temp_dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_validate_rejects_empty_registry_fields() {
        let mut config = Config::default();
        config.registries.push(RegistryConfig {
            url: "reg1.io".to_string(),
            namespace: "/".to_string(),
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegistry { index: 0, .. }));

        config.registries[0] = RegistryConfig {
            namespace: "ns".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_credentials_inline_win_over_env() {
        let registry = RegistryConfig {
            url: "reg1.io".to_string(),
            namespace: "ns".to_string(),
            username: Some("user1".to_string()),
            username_env: Some("STOWAGE_TEST_USER".to_string()),
            password_env: Some("STOWAGE_TEST_PASSWORD".to_string()),
            ..Default::default()
        };

        temp_env::with_vars(
            [
                ("STOWAGE_TEST_USER", Some("someone-else")),
                ("STOWAGE_TEST_PASSWORD", Some("secret1")),
            ],
            || {
                let creds = registry.credentials().unwrap();
                assert_eq!(creds.username, "user1");
                assert_eq!(creds.password, "secret1");
            },
        );
    }

    #[test]
    #[serial]
    fn test_credentials_missing_env() {
        let registry = RegistryConfig {
            url: "reg1.io".to_string(),
            namespace: "ns".to_string(),
            password_env: Some("STOWAGE_TEST_UNSET".to_string()),
            ..Default::default()
        };

        temp_env::with_var_unset("STOWAGE_TEST_UNSET", || {
            let err = registry.credentials().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnv { ref var, .. } if var == "STOWAGE_TEST_UNSET"));
        });
    }

    #[test]
    fn test_anonymous_credentials() {
        let registry = RegistryConfig {
            url: "reg1.io".to_string(),
            namespace: "ns".to_string(),
            ..Default::default()
        };
        assert_eq!(registry.credentials().unwrap(), Credentials::default());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let registry = RegistryConfig {
            url: "reg1.io".to_string(),
            namespace: "ns".to_string(),
            password: Some("secret1".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", registry).contains("secret1"));
        assert!(!format!("{:?}", registry.credentials().unwrap()).contains("secret1"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_home = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stowage.yaml"), "retention: 1d\n").unwrap();

        let found = in_dir(temp_dir.path(), config_home.path(), find_config_file).unwrap();
        assert!(found.unwrap().ends_with("stowage.yaml"));
    }

    #[test]
    #[serial]
    fn test_visible_file_before_hidden() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_home = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(".stowage.yaml"), "retention: 1d\n").unwrap();
        fs::write(temp_dir.path().join("stowage.yaml"), "retention: 2d\n").unwrap();

        let config = in_dir(temp_dir.path(), config_home.path(), Config::discover).unwrap();
        assert_eq!(config.retention, "2d");
    }

    #[test]
    #[serial]
    fn test_global_config_fallback() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_home = tempfile::tempdir().unwrap();
        let global_dir = config_home.path().join("stowage");
        fs::create_dir(&global_dir).unwrap();
        fs::write(global_dir.join("config.yaml"), "engine: docker\nretention: 30d\n").unwrap();

        let config = in_dir(temp_dir.path(), config_home.path(), Config::discover).unwrap();
        assert_eq!(config.retention, "30d");
    }

    #[test]
    #[serial]
    fn test_no_config_file_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_home = tempfile::tempdir().unwrap();

        let config = in_dir(temp_dir.path(), config_home.path(), Config::discover).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn test_env_var_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.yaml");
        fs::write(&custom, "retention: 5d\n").unwrap();
        fs::write(temp_dir.path().join("stowage.yaml"), "retention: 1d\n").unwrap();

        temp_env::with_var(CONFIG_ENV, Some(custom.as_os_str()), || {
            assert_eq!(find_config_file().unwrap(), Some(custom.clone()));
        });
    }

    #[test]
    #[serial]
    fn test_env_var_pointing_nowhere_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("missing.yaml");

        temp_env::with_var(CONFIG_ENV, Some(missing.as_os_str()), || {
            assert!(matches!(
                find_config_file(),
                Err(ConfigError::NotFound(ref path)) if *path == missing
            ));
        });
    }
}
