//! stow run

use anyhow::Context;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use stowage_build::{
    BuildRequest, CredentialPolicy, Deadlines, EngineClient, Pipeline, Registry, Stages,
    ensure_registries,
};
use stowage_config::Config;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// ビルドコンテキストのディレクトリ（Dockerfile が必要）
    #[arg(long, default_value = ".")]
    pub context: PathBuf,

    /// イメージ名
    #[arg(short, long)]
    pub name: String,

    /// イメージタグ（複数指定可）。先頭のタグがローカルのビルド名になる
    #[arg(short, long = "tag", default_value = "latest")]
    pub tags: Vec<String>,

    /// 保持期間ラベルの値 [デフォルト: 設定ファイル、なければ 90d]
    #[arg(long, env = "STOWAGE_RETENTION")]
    pub retention: Option<String>,

    /// コンテナエンジン (docker, podman, docker-cli)
    #[arg(long, env = "STOWAGE_ENGINE")]
    pub engine: Option<String>,

    #[arg(long)]
    pub skip_build: bool,

    #[arg(long)]
    pub skip_tag: bool,

    #[arg(long)]
    pub skip_push: bool,

    /// レジストリURL。設定ファイルのレジストリを置き換える
    #[arg(long, env = "STOWAGE_REGISTRY")]
    pub registry: Option<String>,

    /// レジストリ内の名前空間
    #[arg(long, env = "STOWAGE_NAMESPACE")]
    pub namespace: Option<String>,

    #[arg(long, env = "STOWAGE_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "STOWAGE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl RunArgs {
    fn stages(&self) -> Stages {
        Stages {
            build: !self.skip_build,
            tag: !self.skip_tag,
            push: !self.skip_push,
        }
    }
}

pub async fn handle(args: RunArgs, config: &Config) -> anyhow::Result<()> {
    let stages = args.stages();
    let retention = args
        .retention
        .clone()
        .unwrap_or_else(|| config.retention.clone());
    let request = BuildRequest::new(&args.context, &args.name, args.tags.clone(), retention)?;

    let registries = if stages.publishes() {
        resolve_registries(&args, config)?
    } else {
        Vec::new()
    };
    ensure_registries(&request, &registries, stages)?;

    let engine = args.engine.as_deref().unwrap_or(&config.engine);
    let client = EngineClient::connect(engine)?
        .with_deadlines(Deadlines {
            build: config.timeouts.build(),
            tag: config.timeouts.tag(),
            push: config.timeouts.push(),
        })
        .with_credential_policy(if config.strict_credentials {
            CredentialPolicy::Strict
        } else {
            CredentialPolicy::Lenient
        });

    eprintln!(
        "{} {} ({})",
        "→".blue(),
        request.working_reference().cyan().bold(),
        client.engine_kind()
    );

    Pipeline::new(&client)
        .run_all(&request, &registries, stages)
        .await?;

    eprintln!("{} {}", "✓".green().bold(), summary(&request, &registries, stages));
    Ok(())
}

/// コマンドラインのレジストリ。`--registry` がなければ設定ファイルから
fn resolve_registries(args: &RunArgs, config: &Config) -> anyhow::Result<Vec<Registry>> {
    if let Some(url) = &args.registry {
        let namespace = args
            .namespace
            .clone()
            .context("--namespace is required with --registry")?;
        return Ok(vec![Registry {
            url: url.clone(),
            namespace,
            username: args.username.clone().unwrap_or_default(),
            password: args.password.clone().unwrap_or_default(),
        }]);
    }

    config
        .registries
        .iter()
        .map(|entry| {
            let credentials = entry.credentials()?;
            Ok(Registry {
                url: entry.url.clone(),
                namespace: entry.namespace.clone(),
                username: credentials.username,
                password: credentials.password,
            })
        })
        .collect()
}

fn summary(request: &BuildRequest, registries: &[Registry], stages: Stages) -> String {
    if stages.push {
        format!(
            "Pushed {} to {} registr{}",
            request.working_reference(),
            registries.len(),
            if registries.len() == 1 { "y" } else { "ies" }
        )
    } else if stages.tag {
        format!("Tagged {}", request.working_reference())
    } else if stages.build {
        format!("Built {}", request.working_reference())
    } else {
        "Nothing to do".to_string()
    }
}
