// ==========================================
// 应收账款催收系统 - 草稿模板与发送记录仓储
// ==========================================
// 依据: Collections_Master_Spec.md - PART B 仓储层
// 依据: Dunning_Engine_Specs_v1.0.md - 4. 模板生成与审批 / 8. 发送记录幂等
// 红线: 状态机只允许 PENDING_APPROVAL 出发的迁移
// 红线: 发送记录不建模板外键,模板重新生成后审计记录仍然保留
// ==========================================

use crate::domain::template::{DispatchRecord, DraftTemplate};
use crate::domain::types::{
    AgingBucket, DispatchOutcome, MessageTone, OutreachChannel, TemplateState,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row, ToSql};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
const CHUNK_SIZE: usize = 900;

pub struct TemplateRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TemplateRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 模板写入
    // ==========================================

    /// 写入草稿模板
    pub fn insert_template(&self, template: &DraftTemplate) -> RepositoryResult<()> {
        if template.template_id.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "template_id 不能为空".to_string(),
            ));
        }
        if template.body.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "模板正文不能为空".to_string(),
            ));
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO draft_template (
                template_id, owner_id, bucket, workflow_id, step_id, step_seq_no,
                channel, tone, subject, body, state, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                template.template_id,
                template.owner_id,
                template.bucket.to_db_str(),
                template.workflow_id,
                template.step_id,
                template.step_seq_no,
                template.channel.to_db_str(),
                template.tone.to_db_str(),
                template.subject,
                template.body,
                template.state.to_db_str(),
                template.created_at.format(DATETIME_FMT).to_string(),
                template.updated_at.format(DATETIME_FMT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// 状态迁移（审批/废弃）
    ///
    /// # 说明
    /// - 只允许从 PENDING_APPROVAL 出发,其余一律 InvalidStateTransition
    /// - 读改写在同一事务内,避免并发审批交错
    pub fn update_state(
        &self,
        template_id: &str,
        new_state: TemplateState,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let current = {
            let mut stmt =
                tx.prepare("SELECT state FROM draft_template WHERE template_id = ?1")?;
            match stmt.query_row(params![template_id], |row| row.get::<_, String>(0)) {
                Ok(s) => s,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return Err(RepositoryError::NotFound {
                        entity: "DraftTemplate".to_string(),
                        id: template_id.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        if TemplateState::from_str(&current) != Some(TemplateState::PendingApproval) {
            return Err(RepositoryError::InvalidStateTransition {
                from: current,
                to: new_state.to_db_str().to_string(),
            });
        }

        tx.execute(
            r#"
            UPDATE draft_template
            SET state = ?1, updated_at = datetime('now', 'localtime')
            WHERE template_id = ?2
            "#,
            params![new_state.to_db_str(), template_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// 更新模板内容（标题/正文）
    ///
    /// # 说明
    /// - PENDING_APPROVAL 与 APPROVED 均可编辑,DISCARDED 拒绝
    pub fn update_content(
        &self,
        template_id: &str,
        subject: Option<&str>,
        body: &str,
    ) -> RepositoryResult<()> {
        if body.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "模板正文不能为空".to_string(),
            ));
        }

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let current = {
            let mut stmt =
                tx.prepare("SELECT state FROM draft_template WHERE template_id = ?1")?;
            match stmt.query_row(params![template_id], |row| row.get::<_, String>(0)) {
                Ok(s) => s,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return Err(RepositoryError::NotFound {
                        entity: "DraftTemplate".to_string(),
                        id: template_id.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        if TemplateState::from_str(&current) == Some(TemplateState::Discarded) {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "已废弃模板不可编辑: {}",
                template_id
            )));
        }

        tx.execute(
            r#"
            UPDATE draft_template
            SET subject = ?1, body = ?2, updated_at = datetime('now', 'localtime')
            WHERE template_id = ?3
            "#,
            params![subject, body, template_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// 删除模板（重新生成 = 删除旧行 + 写入新行）
    pub fn delete_template(&self, template_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM draft_template WHERE template_id = ?1",
            params![template_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "DraftTemplate".to_string(),
                id: template_id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // 模板查询
    // ==========================================

    pub fn find_by_id(&self, template_id: &str) -> RepositoryResult<Option<DraftTemplate>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE template_id = ?1",
            SELECT_TEMPLATE
        ))?;
        match stmt.query_row(params![template_id], map_row_to_template) {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按作用域/账龄桶/状态列出模板
    ///
    /// # 参数
    /// - owner_id: Some 时限定债权人
    /// - bucket: Some 时限定账龄桶
    /// - state: Some 时限定状态
    pub fn list_templates(
        &self,
        owner_id: Option<&str>,
        bucket: Option<AgingBucket>,
        state: Option<TemplateState>,
    ) -> RepositoryResult<Vec<DraftTemplate>> {
        let conn = self.get_conn()?;

        let mut sql = format!("{} WHERE 1=1", SELECT_TEMPLATE);
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(owner) = owner_id {
            params_vec.push(Box::new(owner.to_string()));
            sql.push_str(&format!(" AND owner_id = ?{}", params_vec.len()));
        }
        if let Some(b) = bucket {
            params_vec.push(Box::new(b.to_db_str().to_string()));
            sql.push_str(&format!(" AND bucket = ?{}", params_vec.len()));
        }
        if let Some(s) = state {
            params_vec.push(Box::new(s.to_db_str().to_string()));
            sql.push_str(&format!(" AND state = ?{}", params_vec.len()));
        }
        sql.push_str(" ORDER BY bucket, step_seq_no, created_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(&refs[..], map_row_to_template)?;
        Ok(rows.collect::<SqliteResult<Vec<_>>>()?)
    }

    /// 已审批模板（发送引擎快照读）
    pub fn list_approved(&self, owner_id: Option<&str>) -> RepositoryResult<Vec<DraftTemplate>> {
        self.list_templates(owner_id, None, Some(TemplateState::Approved))
    }

    /// 指定步骤集合下的在用模板(待审批+已审批),按 step_id 分组
    ///
    /// # 说明
    /// - 模板生成引擎靠它判断"该步骤是否已有在用模板"
    /// - step_ids 分片查询,规避 SQLite 参数上限
    pub fn list_live_by_step(
        &self,
        owner_id: &str,
        step_ids: &[String],
    ) -> RepositoryResult<HashMap<String, Vec<DraftTemplate>>> {
        let conn = self.get_conn()?;
        let mut grouped: HashMap<String, Vec<DraftTemplate>> = HashMap::new();

        for chunk in step_ids.chunks(CHUNK_SIZE) {
            let placeholders: Vec<String> =
                (2..=chunk.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "{} WHERE owner_id = ?1 AND state IN ('PENDING_APPROVAL', 'APPROVED') AND step_id IN ({})",
                SELECT_TEMPLATE,
                placeholders.join(",")
            );
            let mut stmt = conn.prepare(&sql)?;

            let owner_param = owner_id.to_string();
            let mut chunk_params: Vec<&dyn ToSql> = vec![&owner_param];
            chunk_params.extend(chunk.iter().map(|id| id as &dyn ToSql));

            let rows = stmt.query_map(&chunk_params[..], map_row_to_template)?;
            for template in rows {
                let template = template?;
                grouped
                    .entry(template.step_id.clone())
                    .or_default()
                    .push(template);
            }
        }

        Ok(grouped)
    }

    // ==========================================
    // 发送记录
    // ==========================================

    /// 写入发送记录
    ///
    /// # 说明
    /// - (obligation_id, template_id) 的非 FAILED 记录受部分唯一索引保护,
    ///   并发重复写入映射为 UniqueConstraintViolation,调用方按跳过计数
    pub fn insert_dispatch_record(&self, record: &DispatchRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO dispatch_record (
                dispatch_id, obligation_id, template_id,
                channel, outcome, failure_reason, dispatched_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.dispatch_id,
                record.obligation_id,
                record.template_id,
                record.channel.to_db_str(),
                record.outcome.to_db_str(),
                record.failure_reason,
                record.dispatched_at.format(DATETIME_FMT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// (obligation, template) 是否已有在用(非 FAILED)发送记录
    pub fn has_live_dispatch(
        &self,
        obligation_id: &str,
        template_id: &str,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT 1 FROM dispatch_record
            WHERE obligation_id = ?1 AND template_id = ?2 AND outcome != 'FAILED'
            LIMIT 1
            "#,
        )?;
        match stmt.query_row(params![obligation_id, template_id], |_| Ok(())) {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// 某账款的发送历史(审计视图,新记录在前)
    pub fn list_dispatch_records_for_obligation(
        &self,
        obligation_id: &str,
    ) -> RepositoryResult<Vec<DispatchRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE obligation_id = ?1 ORDER BY dispatched_at DESC, dispatch_id DESC",
            SELECT_DISPATCH
        ))?;
        let rows = stmt.query_map(params![obligation_id], map_row_to_dispatch)?;
        Ok(rows.collect::<SqliteResult<Vec<_>>>()?)
    }

    /// 各结果发送记录数(运行报表用)
    pub fn count_dispatches(&self) -> RepositoryResult<Vec<(String, i64)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT outcome, COUNT(*) FROM dispatch_record GROUP BY outcome ORDER BY outcome",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}

const SELECT_TEMPLATE: &str = r#"
SELECT
    template_id, owner_id, bucket, workflow_id, step_id, step_seq_no,
    channel, tone, subject, body, state, created_at, updated_at
FROM draft_template
"#;

const SELECT_DISPATCH: &str = r#"
SELECT
    dispatch_id, obligation_id, template_id,
    channel, outcome, failure_reason, dispatched_at
FROM dispatch_record
"#;

fn map_row_to_template(row: &Row) -> SqliteResult<DraftTemplate> {
    let bucket_str: String = row.get(2)?;
    let bucket = AgingBucket::from_str(&bucket_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("未知账龄桶: {}", bucket_str).into(),
        )
    })?;
    let channel_str: String = row.get(6)?;
    let channel = OutreachChannel::from_str(&channel_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("未知触达渠道: {}", channel_str).into(),
        )
    })?;
    let tone_str: String = row.get(7)?;
    let tone = MessageTone::from_str(&tone_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("未知语气: {}", tone_str).into(),
        )
    })?;
    let state_str: String = row.get(10)?;
    let state = TemplateState::from_str(&state_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("未知模板状态: {}", state_str).into(),
        )
    })?;

    let created_at_str: String = row.get(11)?;
    let created_at = chrono::NaiveDateTime::parse_from_str(&created_at_str, DATETIME_FMT)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                11,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
    let updated_at_str: String = row.get(12)?;
    let updated_at = chrono::NaiveDateTime::parse_from_str(&updated_at_str, DATETIME_FMT)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                12,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

    Ok(DraftTemplate {
        template_id: row.get(0)?,
        owner_id: row.get(1)?,
        bucket,
        workflow_id: row.get(3)?,
        step_id: row.get(4)?,
        step_seq_no: row.get(5)?,
        channel,
        tone,
        subject: row.get(8)?,
        body: row.get(9)?,
        state,
        created_at,
        updated_at,
    })
}

fn map_row_to_dispatch(row: &Row) -> SqliteResult<DispatchRecord> {
    let channel_str: String = row.get(3)?;
    let channel = OutreachChannel::from_str(&channel_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("未知触达渠道: {}", channel_str).into(),
        )
    })?;
    let outcome_str: String = row.get(4)?;
    let outcome = DispatchOutcome::from_str(&outcome_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("未知发送结果: {}", outcome_str).into(),
        )
    })?;

    let dispatched_at_str: String = row.get(6)?;
    let dispatched_at = chrono::NaiveDateTime::parse_from_str(&dispatched_at_str, DATETIME_FMT)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(DispatchRecord {
        dispatch_id: row.get(0)?,
        obligation_id: row.get(1)?,
        template_id: row.get(2)?,
        channel,
        outcome,
        failure_reason: row.get(5)?,
        dispatched_at,
    })
}
