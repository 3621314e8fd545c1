// ==========================================
// 应收账款催收系统 - 引擎配置读取 Trait
// ==========================================
// 依据: Collections_Master_Spec.md - PART E 工程结构
// 依据: Dunning_Engine_Specs_v1.0.md - 9. 配置项全集
// 职责: 定义批量引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

// ==========================================
// DunningConfigReader Trait
// ==========================================
// 用途: 批量引擎(重算/发送)所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait DunningConfigReader: Send + Sync {
    // ===== 分片与并发 =====

    /// 获取发送引擎分片大小
    ///
    /// # 返回
    /// - usize: 每个分片的账款数
    ///
    /// # 默认值
    /// - 100
    async fn get_dispatch_chunk_size(&self) -> Result<usize, Box<dyn Error>>;

    /// 获取发送引擎最大并发分片数
    ///
    /// # 返回
    /// - usize: 同时在途的分片数(钳制在 1..=8)
    ///
    /// # 默认值
    /// - 4
    async fn get_dispatch_max_concurrency(&self) -> Result<usize, Box<dyn Error>>;

    /// 获取桶位重算分片大小
    ///
    /// # 默认值
    /// - 200
    async fn get_reassign_chunk_size(&self) -> Result<usize, Box<dyn Error>>;

    // ===== 外部投递 =====

    /// 获取单次投递调用超时（秒）
    ///
    /// # 默认值
    /// - 10
    ///
    /// # 用途
    /// - 投递服务可能缓慢;超时视为该条投递失败,本次运行不重试
    async fn get_delivery_timeout_secs(&self) -> Result<u64, Box<dyn Error>>;

    // ===== 展示 =====

    /// 获取默认币种标签（文案渲染用,不做汇率换算）
    ///
    /// # 默认值
    /// - CNY
    async fn get_default_currency(&self) -> Result<String, Box<dyn Error>>;
}
