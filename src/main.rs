// ==========================================
// 应收账款催收系统 - CLI 主入口
// ==========================================
// 依据: Collections_Master_Spec.md - PART E 工程结构
// 技术栈: Rust + SQLite + Tokio
// 系统定位: 定时任务(每日)与人工触发共用的催收入口
// ==========================================

use ar_dunning_engine::app::{get_default_db_path, AppState};
use ar_dunning_engine::domain::types::{AgingBucket, OwnerScope};
use ar_dunning_engine::engine::BatchOutcome;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "ar-dunning-engine",
    version,
    about = "应收账款催收引擎 - 账龄分桶/模板生成/审批发送"
)]
struct Cli {
    /// 数据库文件路径(缺省: 平台数据目录,可用 AR_DUNNING_DB_PATH 覆盖)
    #[arg(long, global = true)]
    db: Option<String>,

    /// 业务日期 YYYY-MM-DD(缺省: 本地今天)
    #[arg(long, global = true)]
    today: Option<String>,

    /// 债权人 ID(缺省: 全量作用域)
    #[arg(long, global = true)]
    owner: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 桶位重算: 按当前逾期天数重算作用域内账款的账龄桶
    Reassign,

    /// 模板生成: 为单债权人在指定桶位生成待审批模板(需要 --owner)
    Generate {
        /// 账龄桶,如 DAYS31_TO60
        #[arg(long)]
        bucket: String,
        /// 语气微调提示,原样注入模板正文
        #[arg(long)]
        tone_modifier: Option<String>,
        /// 沟通风格提示
        #[arg(long)]
        approach_style: Option<String>,
    },

    /// 模板发送: 发送作用域内全部已审批模板(幂等)
    Dispatch,

    /// 步骤窗口报表: 各桶各步骤的在窗账款数
    Report,

    /// 每日流程: 桶位重算 → 模板发送
    Daily,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    ar_dunning_engine::logging::init();

    let cli = Cli::parse();

    tracing::info!("==================================================");
    tracing::info!("{}", ar_dunning_engine::APP_NAME);
    tracing::info!("系统版本: {}", ar_dunning_engine::VERSION);
    tracing::info!("==================================================");

    let db_path = cli.db.clone().unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(anyhow::Error::msg)?;

    let today = parse_today(cli.today.as_deref())?;
    let scope = cli
        .owner
        .clone()
        .map(OwnerScope::Owner)
        .unwrap_or(OwnerScope::All);

    match cli.command {
        Command::Reassign => {
            let outcome = state.dunning_api.reassign_buckets(&scope, today).await?;
            print_json(&json!({
                "status": outcome_status(&outcome),
                "outcome": outcome,
            }))?;
        }
        Command::Generate {
            bucket,
            tone_modifier,
            approach_style,
        } => {
            let owner = cli
                .owner
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("generate 需要 --owner <债权人ID>"))?;
            let bucket = parse_bucket(&bucket)?;
            let summary = state.dunning_api.generate_templates(
                owner,
                bucket,
                tone_modifier,
                approach_style,
                today,
            )?;
            let status = if summary.success { "COMPLETED" } else { "PARTIAL" };
            print_json(&json!({
                "status": status,
                "summary": summary,
            }))?;
        }
        Command::Dispatch => {
            let outcome = state
                .dunning_api
                .dispatch_approved_templates(&scope, today)
                .await?;
            print_json(&json!({
                "status": outcome_status(&outcome),
                "outcome": outcome,
            }))?;
        }
        Command::Report => {
            let report = state.dunning_api.step_window_report(&scope, today)?;
            print_json(&report)?;
        }
        Command::Daily => {
            let reassign = state.dunning_api.reassign_buckets(&scope, today).await?;
            let dispatch = state
                .dunning_api
                .dispatch_approved_templates(&scope, today)
                .await?;
            let status = if outcome_status(&reassign) == "COMPLETED"
                && outcome_status(&dispatch) == "COMPLETED"
            {
                "COMPLETED"
            } else {
                "PARTIAL"
            };
            print_json(&json!({
                "status": status,
                "reassign": reassign,
                "dispatch": dispatch,
            }))?;
        }
    }

    Ok(())
}

/// 业务日期解析: 缺省取本地今天
fn parse_today(arg: Option<&str>) -> anyhow::Result<NaiveDate> {
    match arg {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("--today 需要 YYYY-MM-DD 格式: {}", e)),
        None => Ok(Local::now().date_naive()),
    }
}

fn parse_bucket(s: &str) -> anyhow::Result<AgingBucket> {
    AgingBucket::from_str(s).ok_or_else(|| {
        anyhow::anyhow!(
            "无法识别的账龄桶: {} (可选: CURRENT, DAYS1_TO30, DAYS31_TO60, \
             DAYS61_TO90, DAYS91_TO120, DAYS121_TO150, DAYS151_PLUS)",
            s
        )
    })
}

/// 分片批量结果的整体状态: 有失败分片或被取消即为部分完成
fn outcome_status<R>(outcome: &BatchOutcome<R>) -> &'static str {
    if outcome.canceled || !outcome.failed_chunks.is_empty() {
        "PARTIAL"
    } else {
        "COMPLETED"
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
