// ==========================================
// 应收账款催收系统 - 催收工作流仓储
// ==========================================
// 依据: Collections_Master_Spec.md - PART B 仓储层
// 依据: Dunning_Engine_Specs_v1.0.md - 2. 工作流与步骤窗口
// 红线: 锁定(系统)工作流不可删除,只能克隆后修改
// 红线: 工作流与步骤在同一事务内写入,步骤随工作流级联删除
// ==========================================

use crate::domain::types::{AgingBucket, MessageTone, OutreachChannel};
use crate::domain::workflow::{DunningWorkflow, WorkflowStep};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, Result as SqliteResult, Row, ToSql};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite IN 子句参数上限以内的分片大小
const CHUNK_SIZE: usize = 900;

pub struct WorkflowRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WorkflowRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 新建工作流（含步骤,单事务）
    ///
    /// # 说明
    /// - 步骤 seq_no 重复由 UNIQUE(workflow_id, seq_no) 拦截
    /// - day_offset 严格递增校验在引擎层完成,仓储只负责落库
    pub fn insert_workflow(&self, workflow: &DunningWorkflow) -> RepositoryResult<()> {
        if workflow.workflow_id.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "workflow_id 不能为空".to_string(),
            ));
        }
        if workflow.name.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "工作流名称不能为空".to_string(),
            ));
        }

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO dunning_workflow (
                workflow_id, owner_id, bucket, name,
                active, locked, cloned_from, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                workflow.workflow_id,
                workflow.owner_id,
                workflow.bucket.to_db_str(),
                workflow.name,
                workflow.active as i32,
                workflow.locked as i32,
                workflow.cloned_from,
                workflow.created_at.format(DATETIME_FMT).to_string(),
                workflow.updated_at.format(DATETIME_FMT).to_string(),
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO workflow_step (
                    step_id, workflow_id, seq_no, day_offset, channel, tone
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for step in &workflow.steps {
                stmt.execute(params![
                    step.step_id,
                    workflow.workflow_id,
                    step.seq_no,
                    step.day_offset,
                    step.channel.to_db_str(),
                    step.tone.to_db_str(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// 克隆工作流为某债权人的自定义副本
    ///
    /// # 参数
    /// - source_id: 被克隆的工作流(通常为锁定的系统工作流)
    /// - new_owner_id: 副本归属的债权人
    /// - name: 副本名称
    ///
    /// # 说明
    /// - 步骤逐条复制(新 step_id),locked = false,cloned_from 记录来源
    /// - active 沿用来源工作流,克隆后行为保持连续
    pub fn clone_workflow(
        &self,
        source_id: &str,
        new_owner_id: &str,
        name: &str,
    ) -> RepositoryResult<DunningWorkflow> {
        if new_owner_id.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "owner_id 不能为空".to_string(),
            ));
        }

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let source = {
            let mut stmt = tx.prepare(&format!(
                "{} WHERE workflow_id = ?1",
                SELECT_WORKFLOW
            ))?;
            match stmt.query_row(params![source_id], map_row_to_workflow) {
                Ok(w) => w,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return Err(RepositoryError::NotFound {
                        entity: "DunningWorkflow".to_string(),
                        id: source_id.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        let source_steps = {
            let mut stmt = tx.prepare(&format!(
                "{} WHERE workflow_id = ?1 ORDER BY seq_no",
                SELECT_STEP
            ))?;
            let rows = stmt.query_map(params![source_id], map_row_to_step)?;
            rows.collect::<SqliteResult<Vec<_>>>()?
        };

        let now = Local::now().naive_local();
        let new_id = Uuid::new_v4().to_string();

        tx.execute(
            r#"
            INSERT INTO dunning_workflow (
                workflow_id, owner_id, bucket, name,
                active, locked, cloned_from, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?7)
            "#,
            params![
                new_id,
                new_owner_id,
                source.bucket.to_db_str(),
                name,
                source.active as i32,
                source_id,
                now.format(DATETIME_FMT).to_string(),
            ],
        )?;

        let mut new_steps = Vec::with_capacity(source_steps.len());
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO workflow_step (
                    step_id, workflow_id, seq_no, day_offset, channel, tone
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for step in &source_steps {
                let new_step_id = Uuid::new_v4().to_string();
                stmt.execute(params![
                    new_step_id,
                    new_id,
                    step.seq_no,
                    step.day_offset,
                    step.channel.to_db_str(),
                    step.tone.to_db_str(),
                ])?;
                new_steps.push(WorkflowStep {
                    step_id: new_step_id,
                    workflow_id: new_id.clone(),
                    seq_no: step.seq_no,
                    day_offset: step.day_offset,
                    channel: step.channel,
                    tone: step.tone,
                });
            }
        }

        tx.commit()?;

        Ok(DunningWorkflow {
            workflow_id: new_id,
            owner_id: Some(new_owner_id.to_string()),
            bucket: source.bucket,
            name: name.to_string(),
            active: source.active,
            locked: false,
            cloned_from: Some(source_id.to_string()),
            steps: new_steps,
            created_at: now,
            updated_at: now,
        })
    }

    /// 启停工作流
    pub fn set_active(&self, workflow_id: &str, active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE dunning_workflow
            SET active = ?1, updated_at = datetime('now', 'localtime')
            WHERE workflow_id = ?2
            "#,
            params![active as i32, workflow_id],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "DunningWorkflow".to_string(),
                id: workflow_id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除工作流（步骤级联删除）
    ///
    /// # 说明
    /// - 锁定工作流拒绝删除
    pub fn delete_workflow(&self, workflow_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let locked: Option<i32> = {
            let mut stmt =
                conn.prepare("SELECT locked FROM dunning_workflow WHERE workflow_id = ?1")?;
            match stmt.query_row(params![workflow_id], |row| row.get(0)) {
                Ok(v) => Some(v),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            }
        };

        match locked {
            None => Err(RepositoryError::NotFound {
                entity: "DunningWorkflow".to_string(),
                id: workflow_id.to_string(),
            }),
            Some(l) if l != 0 => Err(RepositoryError::BusinessRuleViolation(format!(
                "锁定工作流不可删除: {}",
                workflow_id
            ))),
            Some(_) => {
                conn.execute(
                    "DELETE FROM dunning_workflow WHERE workflow_id = ?1",
                    params![workflow_id],
                )?;
                Ok(())
            }
        }
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 workflow_id 查询（含步骤,按 seq_no 排序）
    pub fn find_by_id(&self, workflow_id: &str) -> RepositoryResult<Option<DunningWorkflow>> {
        let conn = self.get_conn()?;

        let mut workflow = {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE workflow_id = ?1",
                SELECT_WORKFLOW
            ))?;
            match stmt.query_row(params![workflow_id], map_row_to_workflow) {
                Ok(w) => w,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };

        let mut stmt = conn.prepare(&format!(
            "{} WHERE workflow_id = ?1 ORDER BY seq_no",
            SELECT_STEP
        ))?;
        let rows = stmt.query_map(params![workflow_id], map_row_to_step)?;
        workflow.steps = rows.collect::<SqliteResult<Vec<_>>>()?;

        Ok(Some(workflow))
    }

    /// 列出作用域内的候选工作流（含步骤）
    ///
    /// # 参数
    /// - bucket: Some 时限定单一账龄桶
    /// - owner_id: Some 时返回该债权人自定义 + 系统默认两类候选,
    ///   None 时只返回系统默认
    ///
    /// # 说明
    /// - 排序 created_at DESC, workflow_id DESC,与生效裁决的
    ///   次级排序保持一致
    pub fn list_for_scope(
        &self,
        bucket: Option<AgingBucket>,
        owner_id: Option<&str>,
    ) -> RepositoryResult<Vec<DunningWorkflow>> {
        let conn = self.get_conn()?;

        let mut sql = String::from(SELECT_WORKFLOW);
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

        match owner_id {
            Some(owner) => {
                sql.push_str(" WHERE (owner_id IS NULL OR owner_id = ?1)");
                params_vec.push(Box::new(owner.to_string()));
            }
            None => {
                sql.push_str(" WHERE owner_id IS NULL");
            }
        }
        if let Some(b) = bucket {
            sql.push_str(&format!(" AND bucket = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(b.to_db_str().to_string()));
        }
        sql.push_str(" ORDER BY bucket, created_at DESC, workflow_id DESC");

        let mut workflows = {
            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(&refs[..], map_row_to_workflow)?;
            rows.collect::<SqliteResult<Vec<_>>>()?
        };

        let ids: Vec<String> = workflows.iter().map(|w| w.workflow_id.clone()).collect();
        let mut steps_by_workflow = load_steps_for(&conn, &ids)?;
        for w in &mut workflows {
            if let Some(mut steps) = steps_by_workflow.remove(&w.workflow_id) {
                steps.sort_by_key(|s| s.seq_no);
                w.steps = steps;
            }
        }

        Ok(workflows)
    }
}

/// 批量加载步骤,按 workflow_id 分组(IN 子句分片查询)
fn load_steps_for(
    conn: &Connection,
    workflow_ids: &[String],
) -> RepositoryResult<HashMap<String, Vec<WorkflowStep>>> {
    let mut grouped: HashMap<String, Vec<WorkflowStep>> = HashMap::new();

    for chunk in workflow_ids.chunks(CHUNK_SIZE) {
        let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "{} WHERE workflow_id IN ({})",
            SELECT_STEP,
            placeholders.join(",")
        );
        let mut stmt = conn.prepare(&sql)?;
        let chunk_params: Vec<&dyn ToSql> = chunk.iter().map(|id| id as &dyn ToSql).collect();
        let rows = stmt.query_map(&chunk_params[..], map_row_to_step)?;
        for step in rows {
            let step = step?;
            grouped.entry(step.workflow_id.clone()).or_default().push(step);
        }
    }

    Ok(grouped)
}

const SELECT_WORKFLOW: &str = r#"
SELECT
    workflow_id, owner_id, bucket, name,
    active, locked, cloned_from, created_at, updated_at
FROM dunning_workflow
"#;

const SELECT_STEP: &str = r#"
SELECT step_id, workflow_id, seq_no, day_offset, channel, tone
FROM workflow_step
"#;

fn map_row_to_workflow(row: &Row) -> SqliteResult<DunningWorkflow> {
    let bucket_str: String = row.get(2)?;
    let bucket = AgingBucket::from_str(&bucket_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("未知账龄桶: {}", bucket_str).into(),
        )
    })?;

    let created_at_str: String = row.get(7)?;
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, DATETIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let updated_at_str: String = row.get(8)?;
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, DATETIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(DunningWorkflow {
        workflow_id: row.get(0)?,
        owner_id: row.get(1)?,
        bucket,
        name: row.get(3)?,
        active: row.get::<_, i32>(4)? != 0,
        locked: row.get::<_, i32>(5)? != 0,
        cloned_from: row.get(6)?,
        steps: Vec::new(),
        created_at,
        updated_at,
    })
}

fn map_row_to_step(row: &Row) -> SqliteResult<WorkflowStep> {
    let channel_str: String = row.get(4)?;
    let channel = OutreachChannel::from_str(&channel_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("未知触达渠道: {}", channel_str).into(),
        )
    })?;
    let tone_str: String = row.get(5)?;
    let tone = MessageTone::from_str(&tone_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("未知语气: {}", tone_str).into(),
        )
    })?;

    Ok(WorkflowStep {
        step_id: row.get(0)?,
        workflow_id: row.get(1)?,
        seq_no: row.get(2)?,
        day_offset: row.get(3)?,
        channel,
        tone,
    })
}
