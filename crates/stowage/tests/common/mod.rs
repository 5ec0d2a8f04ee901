#![allow(deprecated)] // Command::cargo_bin

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 設定環境から切り離した一時プロジェクトディレクトリ
pub struct TestProject {
    pub root: TempDir,
    config_home: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            config_home: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write_dockerfile(&self, content: &str) {
        fs::write(self.root.path().join("Dockerfile"), content).unwrap();
    }

    pub fn write_config(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// 周囲の設定なしでプロジェクト内で動く `stow`
    pub fn stow(&self) -> Command {
        let mut cmd = Command::cargo_bin("stow").unwrap();
        cmd.current_dir(self.root.path())
            .env("XDG_CONFIG_HOME", self.config_home.path())
            .env("NO_COLOR", "1");
        for var in [
            "STOWAGE_CONFIG",
            "STOWAGE_RETENTION",
            "STOWAGE_ENGINE",
            "STOWAGE_REGISTRY",
            "STOWAGE_NAMESPACE",
            "STOWAGE_USERNAME",
            "STOWAGE_PASSWORD",
            "RUST_LOG",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }
}
