//! ビルド → タグ → プッシュの実行
//!
//! ステージは順番に実行し、最初のエラーで残りを中断する。
//! リトライやロールバックはしない。

use crate::client::ImageClient;
use crate::error::{BuildError, BuildResult, Operation};
use crate::reference::destination_reference;
use crate::request::{BuildRequest, Registry, Stages};

/// 公開ステージが有効なのに公開先がなければ [`BuildError::NoRegistry`]
pub fn ensure_registries(
    request: &BuildRequest,
    registries: &[Registry],
    stages: Stages,
) -> BuildResult<()> {
    if !stages.publishes() || !registries.is_empty() {
        return Ok(());
    }

    let operation = if stages.tag {
        Operation::Tag
    } else {
        Operation::Push
    };
    Err(BuildError::NoRegistry {
        operation,
        name: request.name().to_string(),
    })
}

pub struct Pipeline<'a, C: ImageClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ImageClient + ?Sized> Pipeline<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// 1つのレジストリに対して有効なステージを実行
    pub async fn run(
        &self,
        request: &BuildRequest,
        registry: &Registry,
        stages: Stages,
    ) -> BuildResult<()> {
        self.run_all(request, std::slice::from_ref(registry), stages)
            .await
    }

    /// 1回だけビルドし、各レジストリへ順にすべてのタグをタグ付けしてプッシュ
    pub async fn run_all(
        &self,
        request: &BuildRequest,
        registries: &[Registry],
        stages: Stages,
    ) -> BuildResult<()> {
        ensure_registries(request, registries, stages)?;

        if stages.build {
            tracing::info!("Building {}", request.working_reference());
            self.client
                .build(
                    request.source(),
                    request.name(),
                    request.tags(),
                    request.retention(),
                )
                .await?;
        } else {
            tracing::debug!("Skipping build of {}", request.working_reference());
        }

        if !stages.publishes() {
            return Ok(());
        }

        let source = request.working_reference();
        for registry in registries {
            for tag in request.tags() {
                let destination = destination_reference(registry, request.name(), tag);
                self.publish(&source, &destination, registry, stages).await?;
            }
        }

        Ok(())
    }

    async fn publish(
        &self,
        source: &str,
        destination: &str,
        registry: &Registry,
        stages: Stages,
    ) -> BuildResult<()> {
        if stages.tag {
            self.client.tag(source, destination).await?;
        }

        if stages.push {
            if registry.is_anonymous() {
                tracing::debug!("No credentials for {}, pushing anonymously", registry.url);
            }
            self.client
                .push(
                    destination,
                    &registry.username,
                    &registry.password,
                    &registry.url,
                )
                .await?;
        }

        Ok(())
    }
}
