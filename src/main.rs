//! kv-export：Workers KV 命名空间批量导出工具
//!
//! 安全原则：API 令牌只从环境变量读取（默认 `CLOUDFLARE_API_TOKEN`），
//! 避免出现在命令行参数和 shell history 里。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;

use kv_export::{
    AppConfig, BulkExporter, CloudflareClient, ExportError, ExportEvent, ExportRequest,
    ExportSettings, KvApi, KvError, spawn_export,
};

const DEFAULT_TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";

#[derive(Parser)]
#[command(name = "kv-export")]
#[command(about = "批量导出 Cloudflare Workers KV 命名空间", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（不存在时使用默认值）
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// 存放 API 令牌的环境变量名
    #[arg(long, global = true, default_value = DEFAULT_TOKEN_ENV)]
    token_env: String,

    /// 覆盖配置中的 API 基地址
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 校验 API 令牌是否有效
    Verify,

    /// 列出账户下的 KV 命名空间
    Namespaces {
        #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
        account_id: String,

        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },

    /// 枚举命名空间中的全部键
    Keys {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        tuning: Tuning,

        /// 以 JSON 输出（包含元数据）
        #[arg(long)]
        json: bool,
    },

    /// 导出命名空间中的全部键值对
    Export {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        tuning: Tuning,

        /// 输出文件；缺省时写到 stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Target {
    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
    account_id: String,

    #[arg(long, env = "CLOUDFLARE_KV_NAMESPACE_ID")]
    namespace_id: String,
}

#[derive(Args)]
struct Tuning {
    /// 每页键数量（1..=1000）
    #[arg(long)]
    page_limit: Option<u32>,

    /// 每批并发读取的键数量
    #[arg(long)]
    batch_size: Option<usize>,

    /// 冷却前允许的请求数
    #[arg(long)]
    request_budget: Option<u32>,

    /// 冷却时长（秒）
    #[arg(long)]
    cooldown_secs: Option<u64>,
}

impl Tuning {
    fn apply(&self, mut settings: ExportSettings) -> ExportSettings {
        if let Some(v) = self.page_limit {
            settings.page_limit = v;
        }
        if let Some(v) = self.batch_size {
            settings.batch_size = v;
        }
        if let Some(v) = self.request_budget {
            settings.request_budget = v;
        }
        if let Some(v) = self.cooldown_secs {
            settings.cooldown = std::time::Duration::from_secs(v);
        }
        settings
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("配置错误: {0}")]
    Config(String),
    #[error("未找到环境变量 `{0}`，请先设置 API 令牌")]
    MissingToken(String),
    #[error("API 令牌无效或未激活")]
    InvalidToken,
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("写出结果失败: {0}")]
    Output(String),
    #[error("导出任务异常退出: {0}")]
    Task(String),
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Output(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Output(err.to_string())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load_from(cli.config.clone()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config init failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    kv_export::logging::init(&config.logging);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, mut config: AppConfig) -> Result<(), CliError> {
    if let Some(base_url) = cli.base_url {
        config.cloudflare.base_url = base_url;
    }
    let token = resolve_token(&cli.token_env)?;
    let client = CloudflareClient::new(&config.cloudflare)?;

    match cli.command {
        Commands::Verify => {
            if client.verify_token(&token).await {
                println!("active");
                Ok(())
            } else {
                Err(CliError::InvalidToken)
            }
        }
        Commands::Namespaces { account_id, json } => {
            let namespaces = client.list_namespaces(&token, &account_id).await?;
            if json {
                print_json(&namespaces)?;
            } else {
                for ns in &namespaces {
                    println!("{}\t{}", ns.id, ns.title);
                }
            }
            Ok(())
        }
        Commands::Keys {
            target,
            tuning,
            json,
        } => {
            let settings = tuning.apply(config.export.to_settings());
            let request = ExportRequest::new(token, target.account_id, target.namespace_id);
            let mut exporter = BulkExporter::new(client, request, settings);
            let keys = exporter.list_all_keys().await?;
            if json {
                print_json(&keys)?;
            } else {
                for key in keys {
                    println!("{}", key.name);
                }
            }
            Ok(())
        }
        Commands::Export {
            target,
            tuning,
            out,
        } => {
            let settings = tuning.apply(config.export.to_settings());
            let request = ExportRequest::new(token, target.account_id, target.namespace_id);
            run_export(client, request, settings, out.as_deref()).await
        }
    }
}

async fn run_export(
    client: CloudflareClient,
    request: ExportRequest,
    settings: ExportSettings,
    out: Option<&Path>,
) -> Result<(), CliError> {
    tracing::info!(
        "导出参数: page_limit={} batch_size={} request_budget={} cooldown={}s",
        settings.page_limit,
        settings.batch_size,
        settings.request_budget,
        settings.cooldown.as_secs()
    );

    let task = spawn_export(client, request, settings);
    let mut events = task.events;
    while let Some(event) = events.recv().await {
        match &event {
            ExportEvent::Waiting { .. } => tracing::warn!("{}", event),
            ExportEvent::Error { .. } => tracing::error!("{}", event),
            _ => tracing::info!("{}", event),
        }
    }

    let outcome = task
        .handle
        .await
        .map_err(|e| CliError::Task(e.to_string()))?;

    match outcome.result {
        Ok(pairs) => {
            match out {
                Some(path) => {
                    write_json_file(path, &*pairs)?;
                    tracing::info!("已写入 {}", path.display());
                }
                None => print_json(&*pairs)?,
            }
            Ok(())
        }
        Err(e) => {
            if let Some(path) = out
                && !outcome.state.pairs.is_empty()
            {
                let partial = partial_path(path);
                write_json_file(&partial, &*outcome.state.pairs)?;
                tracing::warn!(
                    "已将 {} 条部分结果写入 {}",
                    outcome.state.pairs.len(),
                    partial.display()
                );
            }
            Err(e.into())
        }
    }
}

fn resolve_token(env_name: &str) -> Result<String, CliError> {
    match std::env::var(env_name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(CliError::MissingToken(env_name.to_string())),
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(".partial.json");
    path.with_file_name(name)
}

fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CliError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    serde_json::to_writer_pretty(&mut lock, value)?;
    writeln!(lock)?;
    Ok(())
}
