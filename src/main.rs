//! Cartpilot 命令行入口
//!
//! - `run`：在一个执行上下文上运行一次任务，实时打印进度事件，Ctrl-C 中止
//! - `intent`：解析购物请求并输出 JSON
//! - `history`：查看成功记录与聊天记录
//! - `credentials`：按站点保存与查看登录凭据

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use cartpilot::config::{load_config_or_default, AppConfig};
use cartpilot::core::AgentBuilder;
use cartpilot::intent::IntentExtractor;
use cartpilot::memory::{Role, StateStore, SuccessRecord};
use cartpilot::observability;
use cartpilot::react::ProgressEvent;
use cartpilot::transport::{ContextHost, ContextId};
use cartpilot::TaskOutcome;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 配置文件路径（默认 config/default.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 运行一次购物任务
    Run {
        /// 自然语言目标
        goal: String,

        /// 起始页面；缺省时使用上次保存的目标站点
        #[arg(long)]
        url: Option<String>,

        /// 覆盖配置中的最大步数
        #[arg(long)]
        max_steps: Option<usize>,

        /// 显示浏览器窗口（需 feature "browser"）
        #[arg(long)]
        headed: bool,
    },
    /// 解析购物请求
    Intent {
        text: String,
    },
    /// 查看成功记录与聊天记录
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// 站点登录凭据
    Credentials {
        #[command(subcommand)]
        action: CredentialAction,
    },
}

#[derive(Subcommand)]
enum CredentialAction {
    /// 保存（覆盖）某站点的凭据
    Set {
        host: String,
        username: String,
        password: String,
    },
    /// 查看某站点的用户名与最近使用时间（不输出密码）
    Show {
        host: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = Cli::parse();
    let config = load_config_or_default(cli.config);

    match cli.command {
        Command::Run {
            goal,
            url,
            max_steps,
            headed,
        } => run(config, goal, url, max_steps, headed).await,
        Command::Intent { text } => intent(&text),
        Command::History { limit } => history(&config, limit),
        Command::Credentials { action } => credentials(&config, action),
    }
}

fn open_store(config: &AppConfig) -> StateStore {
    StateStore::new(config.store_path()).with_limits(config.store.limits())
}

async fn run(
    mut config: AppConfig,
    goal: String,
    url: Option<String>,
    max_steps: Option<usize>,
    headed: bool,
) -> anyhow::Result<()> {
    if let Some(max_steps) = max_steps {
        config.agent.max_steps = max_steps;
    }
    let store = open_store(&config);
    let saved = store.load().context("Failed to load state store")?;
    let start_url = url.clone().or(saved.target_site);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[{}] {}", event.kind.as_str(), event.message);
        }
    });

    let (host, context) = open_context(&config, start_url.as_deref(), headed).await?;
    let controller = AgentBuilder::new(config)
        .with_sink(Arc::new(event_tx))
        .build(host)
        .context("Failed to build agent")?;

    if let Some(url) = &url {
        store.set_target_site(url.as_str()).context("Failed to save target site")?;
    }
    store
        .append_chat(Role::User, goal.as_str())
        .context("Failed to append chat")?;

    let handle = controller
        .start_task(&goal, context)
        .context("Failed to start task")?;
    tracing::info!(task_id = %handle.id, "task accepted");

    let wait = handle.wait();
    tokio::pin!(wait);
    let finished = tokio::select! {
        report = &mut wait => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    let report = match finished {
        Some(report) => report,
        None => {
            tracing::info!(ack = ?controller.stop_task(), "stop requested");
            wait.await
        }
    }
    .context("Task did not finish cleanly")?;

    let message = report.outcome.message();
    store
        .append_chat(Role::Assistant, message.as_str())
        .context("Failed to append chat")?;
    if let TaskOutcome::Completed { summary } = &report.outcome {
        store
            .record_success(SuccessRecord {
                name: summary.clone(),
                price: None,
                url: start_url,
                recorded_at: chrono::Utc::now(),
            })
            .context("Failed to record success")?;
    }

    let (prompt, completion, total) = controller.token_usage();
    tracing::info!(steps = report.steps, prompt, completion, total, "task finished");

    // 控制器持有的发送端随之释放，打印任务读完剩余事件后退出
    drop(controller);
    let _ = printer.await;

    if !report.outcome.is_success() {
        bail!("{}", message);
    }
    Ok(())
}

#[cfg(feature = "browser")]
async fn open_context(
    config: &AppConfig,
    url: Option<&str>,
    headed: bool,
) -> anyhow::Result<(Arc<dyn ContextHost>, ContextId)> {
    use cartpilot::transport::ChromeHost;

    let url = url.context("No start page: pass --url or set a target site first")?;
    let host = ChromeHost::launch(!headed).context("Failed to launch Chrome")?;
    let context = host
        .open_tab(url, config.executor.settings())
        .await
        .context("Failed to open start page")?;
    Ok((Arc::new(host), context))
}

#[cfg(not(feature = "browser"))]
async fn open_context(
    config: &AppConfig,
    url: Option<&str>,
    headed: bool,
) -> anyhow::Result<(Arc<dyn ContextHost>, ContextId)> {
    use cartpilot::tools::{El, InMemoryPage};
    use cartpilot::transport::LocalContextHost;

    if headed {
        tracing::warn!("--headed needs the \"browser\" feature, using the built-in demo page");
    }
    let url = url.unwrap_or("https://shop.example/");
    let page = InMemoryPage::new(
        url,
        "Demo Shop",
        vec![
            El::new("h1").text("Demo Shop"),
            El::new("form")
                .id("search")
                .child(El::new("input").attr("name", "q"))
                .child(El::new("button").attr("type", "submit").text("Search")),
            El::new("div")
                .class("product")
                .child(El::new("h2").text("Red running shoes"))
                .child(El::new("span").class("price").text("$79.99"))
                .child(El::new("button").class("add-to-cart").text("Add to cart")),
        ],
    );
    let host = LocalContextHost::new();
    let context = ContextId::new("demo");
    host.register(context.clone(), Arc::new(page), config.executor.settings());
    Ok((Arc::new(host), context))
}

fn intent(text: &str) -> anyhow::Result<()> {
    let intent = IntentExtractor::parse(text);
    println!(
        "{}",
        serde_json::to_string_pretty(&intent).context("Failed to serialize intent")?
    );
    if !intent.is_actionable() {
        bail!(
            "Request is too vague (confidence {} < {}), please add a product type",
            intent.confidence,
            cartpilot::intent::MIN_CONFIDENCE
        );
    }
    println!("search: {}", intent.search_query());
    Ok(())
}

fn history(config: &AppConfig, limit: usize) -> anyhow::Result<()> {
    let state = open_store(config)
        .load()
        .context("Failed to load state store")?;
    if let Some(site) = &state.target_site {
        println!("target site: {}", site);
    }
    println!("successes ({}):", state.successes.len());
    for record in state.successes.iter().take(limit) {
        println!(
            "  {}  {}  {}",
            record.recorded_at.format("%Y-%m-%d %H:%M"),
            record.name,
            record.price.as_deref().unwrap_or("-")
        );
    }
    let skip = state.chat.len().saturating_sub(limit);
    println!("chat ({}):", state.chat.len());
    for entry in state.chat.iter().skip(skip) {
        println!("  [{}] {}", entry.role.as_str(), entry.content);
    }
    Ok(())
}

fn credentials(config: &AppConfig, action: CredentialAction) -> anyhow::Result<()> {
    let store = open_store(config);
    match action {
        CredentialAction::Set {
            host,
            username,
            password,
        } => {
            store
                .save_credential(&host, username.as_str(), password)
                .context("Failed to save credential")?;
            tracing::info!(host = %host, username = %username, "credential saved");
            println!("saved credential for {}", host.to_lowercase());
        }
        CredentialAction::Show { host } => {
            let Some(cred) = store
                .use_credential(&host)
                .context("Failed to read credential")?
            else {
                bail!("No credential saved for {}", host);
            };
            println!(
                "{}  {}  last used {}",
                host.to_lowercase(),
                cred.username,
                cred.last_used.format("%Y-%m-%d %H:%M")
            );
        }
    }
    Ok(())
}
