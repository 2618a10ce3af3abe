//! 运维通知命令行工具
//!
//! 提供外部服务操作，包括：
//! - Slack 消息、文件上传与历史记录下载
//! - Ntfy 推送与拉取
//! - Jira 问题查询与创建
//! - Vault 密钥读写
//! - 带缓存的地理编码与最近地点查询

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::config::{load_env_files, require_env, AppConfig, ServiceUrls};
use common::kv_store::{JsonFileStore, KvStore, RedisStore};
use common::utils::display::flatten_paths;
use common::utils::geo::km_to_miles;
use common::utils::run_id;
use common::utils::url_encoding::transform_slack_url;
use integrations::vault::DEFAULT_PROFILE;
use integrations::{
    http_client, CachedGeocoder, JiraClient, JiraConfig, NtfyClient, NtfyConfig, SlackBots,
    SlackClient, VaultClient,
};
use serde_json::{Map, Value};
use tracing::{info, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "ops-notify";

#[derive(Debug, Parser)]
#[command(name = "ops-notify", version, about = "运维通知与外部服务工具")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 通过 webhook 发送 Slack 消息
    SlackSend { bot: String, text: String },
    /// 通过 bot token 发送 Slack 消息并上传文件
    SlackPost {
        bot: String,
        channel: String,
        text: String,
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },
    /// 下载会话全部消息（使用 SLACK_USER_AUTH_TOKEN）
    SlackHistory { channel: String },
    /// 将 Slack webhook 地址转换为中继格式
    SlackRelayUrl { url: String },
    /// 发送 Ntfy 通知
    NtfySend { topic: String, message: String },
    /// 拉取 Ntfy 主题中的消息
    NtfyPoll { topic: String },
    /// 列出项目中的问题
    JiraIssues {
        #[arg(long, default_value_t = 20)]
        max_results: u32,
    },
    /// 以路径形式展示单个问题
    JiraShow { key: String },
    /// 创建问题并尝试移至 In Progress
    JiraCreate {
        summary: String,
        description: String,
        #[arg(long, default_value = "Task")]
        issue_type: String,
    },
    /// 列出 Vault 挂载点
    VaultMounts {
        #[arg(long, default_value = DEFAULT_PROFILE)]
        profile: String,
    },
    /// 读取密钥（可指定单个键）
    VaultRead {
        mount: String,
        path: String,
        #[arg(long)]
        key: Option<String>,
        #[arg(long, default_value = DEFAULT_PROFILE)]
        profile: String,
    },
    /// 新增或更新密钥，参数格式 key=value
    VaultPut {
        mount: String,
        path: String,
        #[arg(required = true)]
        pairs: Vec<String>,
        #[arg(long, default_value = DEFAULT_PROFILE)]
        profile: String,
    },
    /// 地理编码；给出 --near 时输出距离最近的候选地点
    Geocode {
        names: Vec<String>,
        #[arg(long)]
        near: Option<String>,
        /// JSON 缓存文件
        #[arg(long, default_value = "data/location_cache.json")]
        cache: PathBuf,
        /// 使用 Redis 作为缓存（覆盖 --cache）
        #[arg(long)]
        redis_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载 .env 与 user.env
    let loaded = load_env_files();

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME).context("加载配置失败")?;
    let urls = ServiceUrls::load();
    let http = http_client(config.http_timeout())?;
    info!(service = SERVICE_NAME, env_files = ?loaded, "启动");

    let span = tracing::info_span!("command", run_id = %run_id());
    run(cli.command, http, urls).instrument(span).await
}

async fn run(command: Command, http: reqwest::Client, urls: ServiceUrls) -> anyhow::Result<()> {
    match command {
        Command::SlackSend { bot, text } => {
            let bots = SlackBots::from_env()?;
            SlackClient::new(http, urls.slack_api)
                .send_bot_webhook(&bots, &bot, &text)
                .await?;
        }
        Command::SlackPost {
            bot,
            channel,
            text,
            files,
        } => {
            let bots = SlackBots::from_env()?;
            SlackClient::new(http, urls.slack_api)
                .send_with_files(&bots, &bot, &channel, &text, &files)
                .await?;
        }
        Command::SlackHistory { channel } => {
            let token = require_env("SLACK_USER_AUTH_TOKEN")?;
            let messages = SlackClient::new(http, urls.slack_api)
                .conversation_history(&token, &channel)
                .await?;
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
        Command::SlackRelayUrl { url } => {
            let relay = transform_slack_url(&url);
            anyhow::ensure!(!relay.is_empty(), "not a Slack webhook URL: {}", url);
            println!("{}", relay);
        }
        Command::NtfySend { topic, message } => {
            NtfyClient::new(http, NtfyConfig::from_env(&urls)?)
                .send(&topic, &message)
                .await?;
        }
        Command::NtfyPoll { topic } => {
            let messages = NtfyClient::new(http, NtfyConfig::from_env(&urls)?)
                .poll(&topic)
                .await?;
            for message in messages {
                println!("{}", serde_json::to_string(&message)?);
            }
        }
        Command::JiraIssues { max_results } => {
            let jira = JiraClient::new(http, JiraConfig::from_env(&urls)?);
            let project = jira.project().to_string();
            for issue in jira.search_issues(&project, max_results).await? {
                println!("{}: {}", issue.key, issue.title);
            }
        }
        Command::JiraShow { key } => {
            let jira = JiraClient::new(http, JiraConfig::from_env(&urls)?);
            print_paths(&jira.get_issue(&key).await?);
        }
        Command::JiraCreate {
            summary,
            description,
            issue_type,
        } => {
            let jira = JiraClient::new(http, JiraConfig::from_env(&urls)?);
            let created = jira.create_issue(&summary, &description, &issue_type).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        Command::VaultMounts { profile } => {
            let vault = VaultClient::for_profile(http, &urls, &profile)?;
            for (mount, config) in vault.list_mounts().await? {
                let kind = config.get("type").and_then(Value::as_str).unwrap_or("?");
                println!("{}: {}", mount, kind);
            }
        }
        Command::VaultRead {
            mount,
            path,
            key,
            profile,
        } => {
            let vault = VaultClient::for_profile(http, &urls, &profile)?;
            match key {
                Some(key) => println!("{}", vault.read_key(&mount, &path, &key).await?),
                None => {
                    // Keys only; values stay out of the terminal.
                    for key in vault.read_secret(&mount, &path).await?.keys() {
                        println!("key: {}", key);
                    }
                }
            }
        }
        Command::VaultPut {
            mount,
            path,
            pairs,
            profile,
        } => {
            let updates = parse_pairs(&pairs)?;
            let vault = VaultClient::for_profile(http, &urls, &profile)?;
            let written = vault.upsert_secret(&mount, &path, updates).await?;
            println!("Secret successfully added or updated ({} keys)", written.len());
        }
        Command::Geocode {
            names,
            near,
            cache,
            redis_url,
        } => match redis_url {
            Some(url) => {
                let store = RedisStore::connect(&url, "location_cache").await?;
                geocode(CachedGeocoder::new(store, http, urls.nominatim), &names, near).await?
            }
            None => {
                let store = JsonFileStore::open(&cache).await?;
                geocode(CachedGeocoder::new(store, http, urls.nominatim), &names, near).await?
            }
        },
    }
    Ok(())
}

async fn geocode<K: KvStore>(
    geocoder: CachedGeocoder<K>,
    names: &[String],
    near: Option<String>,
) -> anyhow::Result<()> {
    match near {
        Some(origin) => match geocoder.nearest(&origin, names).await? {
            Some(found) => println!(
                "{} ({:.2} km / {:.2} mi) at ({}, {})",
                found.name,
                found.distance_km,
                km_to_miles(found.distance_km),
                found.coordinates.latitude,
                found.coordinates.longitude
            ),
            None => println!("No located candidate near {}", origin),
        },
        None => {
            for location in geocoder.locate_all(names).await? {
                match location.coordinates {
                    Some(c) => println!("{}: ({}, {})", location.name, c.latitude, c.longitude),
                    None => println!("{}: not found", location.name),
                }
            }
        }
    }
    Ok(())
}

fn print_paths(value: &Value) {
    for (path, leaf) in flatten_paths(value) {
        if !leaf.is_empty() && leaf != "null" {
            println!("{}: {}", path, leaf);
        }
    }
}

fn parse_pairs(pairs: &[String]) -> anyhow::Result<Map<String, Value>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("expected key=value, got '{}'", pair))?;
            Ok((key.to_string(), Value::String(value.to_string())))
        })
        .collect()
}
