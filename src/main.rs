//! Scout 命令行入口
//!
//! `scout run <domain> --country ES --provider Iberdrola` 按领域描述执行一次调研并打印结果；
//! `scout domains` 列出可用的领域描述。结果不是 success 时以非零状态码退出。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use scout::config::load_config;
use scout::core::{AgentBuilder, RateLimiter};
use scout::domain::discover_descriptors;
use scout::react::spawn_log_sink;
use scout::schemas::response_schema_for;

#[derive(Parser)]
#[command(name = "scout", version, about = "Resilient tool-using web research agent")]
struct Cli {
    /// 额外的 TOML 配置文件
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 按领域描述执行一次调研
    Run {
        /// 领域名（描述目录下的子目录名）
        domain: String,
        #[arg(long, default_value = "ES")]
        country: String,
        #[arg(long, default_value = "")]
        provider: String,
        /// 覆盖由 query_template 生成的查询
        #[arg(long)]
        query: Option<String>,
        /// 恢复已有会话
        #[arg(long)]
        thread_id: Option<String>,
        #[arg(long)]
        max_retries: Option<usize>,
        /// 要求执行器直接按产品 schema 输出
        #[arg(long)]
        structured: bool,
        /// 以 JSON 打印完整结果
        #[arg(long)]
        json: bool,
    },
    /// 列出可用的领域描述
    Domains,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    scout::observability::init();
    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;

    match cli.command {
        Command::Domains => {
            let domains = discover_descriptors(&cfg.domains.dir);
            if domains.is_empty() {
                println!("no domains found in {}", cfg.domains.dir.display());
            }
            for (name, d) in domains {
                println!("{:<20} product={} countries={}", name, d.product, d.country_codes().join(","));
            }
        }
        Command::Run {
            domain,
            country,
            provider,
            query,
            thread_id,
            max_retries,
            structured,
            json,
        } => {
            let domains = discover_descriptors(&cfg.domains.dir);
            let Some(descriptor) = domains.get(&domain) else {
                bail!("unknown domain '{}' in {}", domain, cfg.domains.dir.display());
            };
            let run_config =
                descriptor.build_run_config(&provider, &country, query.as_deref(), thread_id.as_deref());
            let max_retries = max_retries.unwrap_or(cfg.agent.max_retries);

            let (tx, rx) = mpsc::unbounded_channel();
            let sink = spawn_log_sink(rx);
            let limiter = Arc::new(RateLimiter::from_config(&cfg.rate_limit));
            let mut builder = AgentBuilder::new(cfg)
                .with_rate_limiter(limiter)
                .with_events(tx);
            if structured {
                builder = builder.with_response_schema(response_schema_for(&descriptor.product));
            }
            let mut agent = builder.build();

            let result = agent.run(&run_config, max_retries).await;
            agent.cleanup().await;
            drop(agent);
            let _ = sink.await;
            let result = result.context("Agent initialization failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("status: {:?} | attempts: {} | thread: {}", result.status, result.attempts, result.thread_id);
                println!("{}", result.output);
            }
            if !result.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
