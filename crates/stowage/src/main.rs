mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use stowage_config::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stow")]
#[command(about = "Build, tag and push container images", long_about = None)]
struct Cli {
    /// 検索せずに使う設定ファイル
    #[arg(short, long, global = true, env = "STOWAGE_CONFIG")]
    config: Option<PathBuf>,

    /// デバッグログを有効化
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// イメージをビルドし、設定されたレジストリへタグ付けしてプッシュ
    Run(commands::run::RunArgs),
    /// コンテナエンジンのバックエンド一覧
    Engines,
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = dispatch(cli).await {
        eprintln!("{} {}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Version => {
            println!("stowage {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Engines => {
            commands::engines::handle();
            Ok(())
        }
        Commands::Run(args) => {
            let config = load_config(cli.config.as_deref())?;
            commands::run::handle(args, &config).await
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::discover()?,
    };
    tracing::debug!("Config: {:?}", config);
    Ok(config)
}

/// ログは stderr へ。stdout はエンジンの進捗出力用
fn init_logging(verbose: bool) {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if verbose {
        filter = filter.add_directive(tracing::Level::DEBUG.into());
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}
