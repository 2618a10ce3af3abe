//! 查询命令行工具
//!
//! 提供带重试的查询执行功能，包括：
//! - 通过 HTTP 在 DuckDB 服务上执行查询
//! - 通过 sqlx 在 PostgreSQL / MySQL / SQLite 上执行查询
//! - 执行 SQL 脚本文件

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::config::{load_env_files, AppConfig};
use common::errors::AppResult;
use common::models::connection::DbType;
use common::models::query::QueryResult;
use common::utils::display::render_table;
use common::utils::SqlValidator;
use query_client::{run_script_file, AppState, QuerySource, RetryingQueryClient};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "query-cli";

#[derive(Debug, Parser)]
#[command(name = "query-cli", version, about = "带指数退避重试的查询工具")]
struct Cli {
    /// 覆盖重试次数（默认读取 QUERY_MAX_RETRIES）
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// 拒绝 DROP / TRUNCATE / DELETE / ALTER 语句
    #[arg(long, global = true)]
    read_only: bool,

    /// 以 JSON 输出结果
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 在 DuckDB HTTP 服务上执行查询
    Duckdb { query: String },
    /// 在 SQL 引擎上执行查询
    Sql {
        /// 环境变量前缀，例如 POSTGRES 读取 POSTGRES_URL / POSTGRES_USER ...
        #[arg(long, default_value = "POSTGRES")]
        prefix: String,
        /// postgres / mysql / sqlite
        #[arg(long, default_value = "postgres")]
        db_type: DbType,
        query: String,
    },
    /// 执行 SQL 脚本文件
    Script {
        file: PathBuf,
        #[arg(long, default_value = "POSTGRES")]
        prefix: String,
        #[arg(long, default_value = "postgres")]
        db_type: DbType,
        /// 按 `;` 拆分为多条语句
        #[arg(long)]
        multi_part: bool,
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
    let mut config = AppConfig::load_with_service(SERVICE_NAME).context("加载配置失败")?;
    if let Some(max_retries) = cli.max_retries {
        config.retry.max_retries = max_retries;
    }
    info!(service = SERVICE_NAME, env_files = ?loaded, "启动");

    let state = AppState::new(config);

    let result = match &cli.command {
        Command::Duckdb { query } => {
            guard(cli.read_only, query)?;
            run(&state.duckdb_client()?, query).await?
        }
        Command::Sql {
            prefix,
            db_type,
            query,
        } => {
            guard(cli.read_only, query)?;
            run(&state.sql_client(prefix, *db_type)?, query).await?
        }
        Command::Script {
            file,
            prefix,
            db_type,
            multi_part,
        } => {
            if cli.read_only {
                let script = tokio::fs::read_to_string(file)
                    .await
                    .with_context(|| format!("无法读取 {}", file.display()))?;
                guard(true, &script)?;
            }
            let client = state.sql_client(prefix, *db_type)?;
            run_script_file(&client, file, *multi_part).await?
        }
    };

    print_result(&result, cli.json)?;
    Ok(())
}

fn guard(read_only: bool, sql: &str) -> AppResult<()> {
    if read_only {
        SqlValidator::validate(sql)?;
    }
    Ok(())
}

async fn run<S: QuerySource>(client: &RetryingQueryClient<S>, query: &str) -> AppResult<QueryResult> {
    client.query(query, &[]).await
}

fn print_result(result: &QueryResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else if let Some(affected) = result.affected_rows {
        println!("{} rows affected", affected);
    } else {
        println!("{}", render_table(result));
    }
    Ok(())
}
