// ==========================================
// 应收账款催收系统 - 配置层
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 9. 配置项全集
// ==========================================
// 职责: 系统配置管理
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod dunning_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use dunning_config_trait::DunningConfigReader;
