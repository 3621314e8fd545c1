// ==========================================
// 应收账款催收系统 - 工作流裁决引擎
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 2. 工作流与步骤窗口
// 红线: 自定义工作流优先于系统默认,同作用域内按固定次序裁决
// 红线: 步骤窗口只由有序 day_offset 推导,不存在落库的窗口边界
// 红线: day_offset 非严格递增属于配置错误,引擎拒绝猜测
// ==========================================
// 职责: 生效工作流裁决 + 经校验步骤视图构建 + 入桶天数计算
// 输入: 预加载的候选工作流 + obligation 桶位缓存
// 输出: 生效工作流引用 / StepSchedule / StepResolution
// ==========================================

use crate::domain::obligation::Obligation;
use crate::domain::types::AgingBucket;
use crate::domain::workflow::{DunningWorkflow, WorkflowStep};
use crate::engine::error::{EngineError, EngineResult};
use chrono::NaiveDate;

// ==========================================
// StepResolution - 步骤窗口定位结果
// ==========================================
// "未进入任何步骤"是正常结果,不是错误
#[derive(Debug, Clone, PartialEq)]
pub enum StepResolution {
    /// 入桶天数小于首个 day_offset,或工作流没有步骤
    NoActiveStep,
    /// 命中某个步骤窗口 [offset_i, offset_{i+1})
    Active { step: WorkflowStep },
}

// ==========================================
// StepSchedule - 经校验的步骤窗口有序视图
// ==========================================
// 每个 (债权人, 账龄桶) 裁决后构建一次,逐笔定位只剩二分查找;
// 排序与偏移校验不在逐笔路径上重复
#[derive(Debug, Clone)]
pub struct StepSchedule {
    /// seq_no 升序,偏移已校验严格递增
    steps: Vec<WorkflowStep>,
}

impl StepSchedule {
    /// 按入桶天数定位当前步骤窗口
    ///
    /// # 说明
    /// - 有序偏移上二分(partition_point),O(log k)
    /// - 末步窗口开放到无穷: days >= offset_last 一律命中末步
    /// - 零步骤视图恒为 NoActiveStep
    pub fn resolve(&self, days_since_entry: i64) -> StepResolution {
        let idx = self
            .steps
            .partition_point(|s| s.day_offset <= days_since_entry);
        if idx == 0 {
            return StepResolution::NoActiveStep;
        }
        StepResolution::Active {
            step: self.steps[idx - 1].clone(),
        }
    }

    /// 步骤有序视图(seq_no 升序)
    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }
}

// ==========================================
// WorkflowResolver - 工作流裁决引擎
// ==========================================
pub struct WorkflowResolver;

impl WorkflowResolver {
    /// 创建新的工作流裁决引擎
    pub fn new() -> Self {
        Self
    }

    // ==========================================
    // 生效工作流裁决
    // ==========================================

    /// 从候选集中裁决生效工作流
    ///
    /// 规则（顺序执行）:
    /// 1) 候选中存在自定义(owner_id 非空)工作流 → 只在自定义中裁决
    /// 2) 同作用域内: active 优先 → created_at 新者优先 → workflow_id 大者优先
    ///
    /// # 说明
    /// - 候选集须已按 (bucket, 作用域) 预过滤
    /// - workflow_id 比较兜底保证全序,时间戳相同也不产生歧义
    /// - 空候选集 → None("没有工作流"是正常结果)
    pub fn pick_effective<'a>(
        &self,
        candidates: &'a [DunningWorkflow],
    ) -> Option<&'a DunningWorkflow> {
        let custom: Vec<&DunningWorkflow> =
            candidates.iter().filter(|w| w.owner_id.is_some()).collect();

        if !custom.is_empty() {
            return Self::pick_within_scope(custom);
        }
        Self::pick_within_scope(candidates.iter().collect())
    }

    fn pick_within_scope(candidates: Vec<&DunningWorkflow>) -> Option<&DunningWorkflow> {
        candidates.into_iter().max_by(|a, b| {
            a.active
                .cmp(&b.active)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.workflow_id.cmp(&b.workflow_id))
        })
    }

    // ==========================================
    // 步骤视图构建与配置校验
    // ==========================================

    /// 构建经校验的步骤窗口视图
    ///
    /// 规则: 按 seq_no 顺序 day_offset 严格递增,且不得为负
    ///
    /// # 说明
    /// - 排序与校验只发生在这里,逐笔定位复用返回的视图
    /// - 零步骤工作流合法(永远不命中步骤)
    /// - 违规时报错点名工作流与具体偏移,绝不静默修复
    pub fn step_schedule(&self, workflow: &DunningWorkflow) -> EngineResult<StepSchedule> {
        let mut steps = workflow.steps.clone();
        steps.sort_by_key(|s| s.seq_no);

        for step in &steps {
            if step.day_offset < 0 {
                return Err(EngineError::InvalidStepConfiguration {
                    workflow_id: workflow.workflow_id.clone(),
                    message: format!(
                        "步骤 seq_no={} 的 day_offset={} 为负",
                        step.seq_no, step.day_offset
                    ),
                });
            }
        }

        for pair in steps.windows(2) {
            if pair[1].day_offset <= pair[0].day_offset {
                return Err(EngineError::InvalidStepConfiguration {
                    workflow_id: workflow.workflow_id.clone(),
                    message: format!(
                        "day_offset 未严格递增: seq_no={} 偏移 {} → seq_no={} 偏移 {}",
                        pair[0].seq_no, pair[0].day_offset, pair[1].seq_no, pair[1].day_offset
                    ),
                });
            }
        }

        Ok(StepSchedule { steps })
    }

    /// 校验步骤窗口定义
    ///
    /// 等价于构建视图后弃用,供只要结论的调用方(建流校验等)
    pub fn validate_offsets(&self, workflow: &DunningWorkflow) -> EngineResult<()> {
        self.step_schedule(workflow).map(|_| ())
    }

    // ==========================================
    // 入桶天数
    // ==========================================

    /// 计算入桶天数
    ///
    /// 规则:
    /// - 缓存桶与本次判定桶一致 → today - bucket_entered_on,钳为 0
    /// - 缓存缺失或已过期(桶位漂移未落库) → 记 0,视同今日入桶
    pub fn days_since_entry(
        &self,
        obligation: &Obligation,
        resolved_bucket: AgingBucket,
        today: NaiveDate,
    ) -> i64 {
        match (obligation.current_bucket, obligation.bucket_entered_on) {
            (Some(cached), Some(entered)) if cached == resolved_bucket => {
                (today - entered).num_days().max(0)
            }
            _ => 0,
        }
    }
}

impl Default for WorkflowResolver {
    fn default() -> Self {
        Self::new()
    }
}
