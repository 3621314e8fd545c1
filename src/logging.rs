// ==========================================
// 日志系统初始化
// ==========================================
// 依据: Collections_Master_Spec.md - PART E 工程结构
// 输出: 人读文本(默认)或 JSON 行(定时任务日志采集用)
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 级别过滤器(默认: info;慢 SQL 走 slow_sql target,
///   运行耗时走 perf target,可单独调级)
///   例如: RUST_LOG=debug 或 RUST_LOG=ar_dunning_engine=trace
/// - AR_DUNNING_LOG_FORMAT: 取值 `json` 时输出 JSON 行,
///   定时任务环境下交给采集器;其余取值为人读文本
///
/// # 示例
/// ```no_run
/// use ar_dunning_engine::logging;
/// logging::init();
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_mode = std::env::var("AR_DUNNING_LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_mode {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(false)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_line_number(true)
            .init();
    }
}
