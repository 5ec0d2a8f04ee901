//! ビルドコンテキストのアーカイブ

use std::io;
use std::path::Path;
use tar::Builder;

pub struct ContextArchive;

impl ContextArchive {
    /// `context_path` の中身を無圧縮の tar にまとめる
    ///
    /// エントリはディレクトリ直下からの相対パス。直下の `Dockerfile` は
    /// アーカイブ内でも `Dockerfile` になる。
    pub fn from_dir(context_path: &Path) -> io::Result<Vec<u8>> {
        tracing::debug!("Creating build context from: {}", context_path.display());

        if !context_path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", context_path.display()),
            ));
        }

        if !context_path.join("Dockerfile").is_file() {
            tracing::warn!(
                "No Dockerfile at the root of {}, the engine will reject the build",
                context_path.display()
            );
        }

        let mut tar = Builder::new(Vec::new());
        tar.follow_symlinks(false);
        tar.append_dir_all(".", context_path)?;
        let archive_data = tar.into_inner()?;

        tracing::debug!("Build context created: {} bytes", archive_data.len());
        Ok(archive_data)
    }
}
