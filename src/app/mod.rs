// ==========================================
// 应收账款催收系统 - 应用层
// ==========================================
// 职责: 装配共享状态,连接 CLI 与后端
// ==========================================

pub mod state;

// 重导出
pub use state::{AppState, get_default_db_path};
