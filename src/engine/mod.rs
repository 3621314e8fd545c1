// ==========================================
// 应收账款催收系统 - 引擎层
// ==========================================
// 依据: Collections_Master_Spec.md - PART D 引擎体系
// 依据: Dunning_Engine_Specs_v1.0.md - 1~8 各引擎
// ==========================================
// 职责: 实现催收业务规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 配置错误必须点名原因,绝不静默兜底
// ==========================================

pub mod batch;
pub mod bucket_classifier;
pub mod dispatch_engine;
pub mod error;
pub mod reassign;
pub mod step_window_counter;
pub mod template_generator;
pub mod workflow_resolver;

// 重导出核心引擎
pub use batch::{
    BatchOutcome, BatchProgressObserver, BatchRunner, ChunkFailure, ChunkMerge,
    NoOpProgressObserver, TracingProgressObserver,
};
pub use bucket_classifier::{BucketAssessment, BucketClassifier};
pub use dispatch_engine::{DispatchEngine, DispatchErrorDetail, DispatchSummary};
pub use error::{EngineError, EngineResult};
pub use reassign::{ReassignErrorDetail, ReassignSummary, ReassignmentEngine};
pub use step_window_counter::{
    BucketWindowReport, StepWindowCount, StepWindowCounter, StepWindowReport,
};
pub use template_generator::{
    GenerationHints, TemplateGenerationEngine, TemplateGenerationSummary,
};
pub use workflow_resolver::{StepResolution, StepSchedule, WorkflowResolver};
