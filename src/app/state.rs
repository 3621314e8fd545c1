// ==========================================
// 应收账款催收系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 依据: Collections_Master_Spec.md - PART E 工程结构
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{DunningApi, TemplateApi, WorkflowApi};
use crate::config::config_manager::ConfigManager;
use crate::delivery::{LogOnlyDeliveryService, MessageDeliveryService};
use crate::repository::{
    obligation_repo::ObligationRepository, run_log_repo::RunLogRepository,
    template_repo::TemplateRepository, workflow_repo::WorkflowRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
/// CLI 与定时任务通过它访问业务能力
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 催收引擎API(分桶/生成/发送/报表)
    pub dunning_api: Arc<DunningApi<ConfigManager>>,

    /// 工作流管理API
    pub workflow_api: Arc<WorkflowApi>,

    /// 模板审批API
    pub template_api: Arc<TemplateApi>,

    /// 账款仓储(用于数据核对与演示数据写入)
    pub obligation_repo: Arc<ObligationRepository>,

    /// 运行日志仓储(用于运行留痕查询)
    pub run_log_repo: Arc<RunLogRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    ///
    /// # 说明
    /// 默认投递实现为 LogOnlyDeliveryService(打印并视为送达),
    /// 接入真实供应商时通过 with_delivery 注入
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_delivery(db_path, Arc::new(LogOnlyDeliveryService))
    }

    /// 以指定投递实现创建AppState
    ///
    /// # 说明
    /// 该方法会:
    /// 1. 打开数据库(PRAGMA + 幂等建表 + 版本戳)
    /// 2. 初始化所有Repository
    /// 3. 创建所有API实例
    pub fn with_delivery(
        db_path: String,
        delivery: Arc<dyn MessageDeliveryService>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState, 数据库路径: {}", db_path);

        // 创建数据库连接(共享连接)
        let conn = crate::db::open_dunning_database(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================

        let obligation_repo = Arc::new(ObligationRepository::new(conn.clone()));
        let workflow_repo = Arc::new(WorkflowRepository::new(conn.clone()));
        let template_repo = Arc::new(TemplateRepository::new(conn.clone()));
        let run_log_repo = Arc::new(RunLogRepository::new(conn.clone()));

        // ==========================================
        // 初始化配置层
        // ==========================================

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化API层
        // ==========================================

        let dunning_api = Arc::new(DunningApi::new(
            obligation_repo.clone(),
            workflow_repo.clone(),
            template_repo.clone(),
            run_log_repo.clone(),
            delivery,
            config_manager.clone(),
        ));

        let workflow_api = Arc::new(WorkflowApi::new(workflow_repo.clone()));

        let template_api = Arc::new(TemplateApi::new(
            template_repo.clone(),
            workflow_repo.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            dunning_api,
            workflow_api,
            template_api,
            obligation_repo,
            run_log_repo,
        })
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 开发环境: 用户数据目录/ar-dunning-engine-dev/ar_dunning.db
/// - 生产环境: 用户数据目录/ar-dunning-engine/ar_dunning.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径(便于调试/测试/CI)
    if let Ok(path) = std::env::var("AR_DUNNING_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    // 先给一个默认回退值,后续如果能拿到 data_dir 再覆盖
    let mut path = PathBuf::from("./ar_dunning.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录,避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("ar-dunning-engine-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("ar-dunning-engine");
        }

        // 确保目录存在
        std::fs::create_dir_all(&path).ok();
        path = path.join("ar_dunning.db");
    }

    path.to_string_lossy().to_string()
}
