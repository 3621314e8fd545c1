// ==========================================
// 应收账款催收系统 - 账款数据仓储
// ==========================================
// 依据: Collections_Master_Spec.md - PART B 仓储层
// 依据: Dunning_Engine_Specs_v1.0.md - obligation/owner_profile 表
// 红线: Repository 不做业务逻辑,只做数据映射
// 红线: (current_bucket, bucket_entered_on) 只经 update_bucket 写入
// ==========================================

use crate::domain::obligation::{Obligation, OwnerProfile};
use crate::domain::types::{AgingBucket, ObligationStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ObligationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ObligationRepository {
    /// 创建新的账款仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 批量写入账款（upsert 语义）
    ///
    /// # 参数
    /// - obligations: 账款列表
    ///
    /// # 返回
    /// - Ok(usize): 成功写入的记录数
    ///
    /// # 说明
    /// - obligation_id 已存在时更新全部业务字段,保留 created_at
    /// - 使用事务确保原子性
    pub fn batch_upsert(&self, obligations: &[Obligation]) -> RepositoryResult<usize> {
        for o in obligations {
            if o.obligation_id.trim().is_empty() {
                return Err(RepositoryError::ValidationError(
                    "obligation_id 不能为空".to_string(),
                ));
            }
            if o.owner_id.trim().is_empty() {
                return Err(RepositoryError::ValidationError(
                    "owner_id 不能为空".to_string(),
                ));
            }
        }

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO obligation (
                    obligation_id, owner_id, customer_name,
                    contact_email, contact_phone, contact_outreach_enabled,
                    amount_cents, currency, due_date, status,
                    current_bucket, bucket_entered_on,
                    created_at, updated_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14
                )
                ON CONFLICT(obligation_id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    customer_name = excluded.customer_name,
                    contact_email = excluded.contact_email,
                    contact_phone = excluded.contact_phone,
                    contact_outreach_enabled = excluded.contact_outreach_enabled,
                    amount_cents = excluded.amount_cents,
                    currency = excluded.currency,
                    due_date = excluded.due_date,
                    status = excluded.status,
                    current_bucket = excluded.current_bucket,
                    bucket_entered_on = excluded.bucket_entered_on,
                    updated_at = excluded.updated_at
                "#,
            )?;

            for o in obligations {
                stmt.execute(params![
                    o.obligation_id,
                    o.owner_id,
                    o.customer_name,
                    o.contact_email,
                    o.contact_phone,
                    o.contact_outreach_enabled as i32,
                    o.amount_cents,
                    o.currency,
                    o.due_date.format("%Y-%m-%d").to_string(),
                    o.status.to_db_str(),
                    o.current_bucket.map(|b| b.to_db_str()),
                    o.bucket_entered_on.map(|d| d.format("%Y-%m-%d").to_string()),
                    o.created_at.format(DATETIME_FMT).to_string(),
                    o.updated_at.format(DATETIME_FMT).to_string(),
                ])?;
                count += 1;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    /// 更新桶位缓存对
    ///
    /// # 参数
    /// - obligation_id: 账款 ID
    /// - bucket: 新账龄桶
    /// - entered_on: 入桶日期(注入的 today)
    ///
    /// # 说明
    /// - (current_bucket, bucket_entered_on) 单条 UPDATE 原子写入
    /// - 账款不存在时返回 NotFound
    pub fn update_bucket(
        &self,
        obligation_id: &str,
        bucket: AgingBucket,
        entered_on: NaiveDate,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE obligation
            SET current_bucket = ?1,
                bucket_entered_on = ?2,
                updated_at = datetime('now', 'localtime')
            WHERE obligation_id = ?3
            "#,
            params![
                bucket.to_db_str(),
                entered_on.format("%Y-%m-%d").to_string(),
                obligation_id,
            ],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Obligation".to_string(),
                id: obligation_id.to_string(),
            });
        }
        Ok(())
    }

    /// 更新账款状态（外部回款/争议等状态流转入口）
    pub fn update_status(
        &self,
        obligation_id: &str,
        status: ObligationStatus,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE obligation
            SET status = ?1, updated_at = datetime('now', 'localtime')
            WHERE obligation_id = ?2
            "#,
            params![status.to_db_str(), obligation_id],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Obligation".to_string(),
                id: obligation_id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 obligation_id 查询账款
    ///
    /// # 返回
    /// - Ok(Some(..)): 找到记录
    /// - Ok(None): 未找到记录
    pub fn find_by_id(&self, obligation_id: &str) -> RepositoryResult<Option<Obligation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE obligation_id = ?1",
            SELECT_OBLIGATION
        ))?;

        match stmt.query_row(params![obligation_id], map_row_to_obligation) {
            Ok(o) => Ok(Some(o)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 列出可催收账款（状态过滤下沉到 SQL）
    ///
    /// # 参数
    /// - owner_id: Some 时限定单一债权人,None 表示全量作用域
    ///
    /// # 说明
    /// - 仅 OPEN / IN_PAYMENT_PLAN 参与催收
    /// - 排序固定(owner_id, obligation_id),保证分片切分确定
    pub fn list_outreach_eligible(
        &self,
        owner_id: Option<&str>,
    ) -> RepositoryResult<Vec<Obligation>> {
        let conn = self.get_conn()?;

        let base = format!(
            "{} WHERE status IN ('OPEN', 'IN_PAYMENT_PLAN')",
            SELECT_OBLIGATION
        );

        let rows = match owner_id {
            Some(owner) => {
                let mut stmt = conn.prepare(&format!(
                    "{} AND owner_id = ?1 ORDER BY owner_id, obligation_id",
                    base
                ))?;
                let mapped = stmt.query_map(params![owner], map_row_to_obligation)?;
                mapped.collect::<SqliteResult<Vec<_>>>()?
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("{} ORDER BY owner_id, obligation_id", base))?;
                let mapped = stmt.query_map([], map_row_to_obligation)?;
                mapped.collect::<SqliteResult<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    /// 各状态账款数(运行报表用)
    pub fn count_by_status(&self) -> RepositoryResult<Vec<(String, i64)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM obligation GROUP BY status ORDER BY status",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    // ==========================================
    // 债权人档案
    // ==========================================

    /// 写入/更新债权人档案
    pub fn upsert_owner_profile(&self, profile: &OwnerProfile) -> RepositoryResult<()> {
        if profile.owner_id.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "owner_id 不能为空".to_string(),
            ));
        }
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO owner_profile (owner_id, outreach_paused, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(owner_id) DO UPDATE SET
                outreach_paused = excluded.outreach_paused,
                updated_at = excluded.updated_at
            "#,
            params![
                profile.owner_id,
                profile.outreach_paused as i32,
                profile.updated_at.format(DATETIME_FMT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// 设置债权人级全局催收暂停开关
    pub fn set_outreach_paused(&self, owner_id: &str, paused: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO owner_profile (owner_id, outreach_paused, updated_at)
            VALUES (?1, ?2, datetime('now', 'localtime'))
            ON CONFLICT(owner_id) DO UPDATE SET
                outreach_paused = excluded.outreach_paused,
                updated_at = excluded.updated_at
            "#,
            params![owner_id, paused as i32],
        )?;
        Ok(())
    }

    /// 已暂停催收的债权人集合(发送引擎快照读)
    pub fn list_paused_owners(&self) -> RepositoryResult<HashSet<String>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT owner_id FROM owner_profile WHERE outreach_paused = 1")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<HashSet<_>>>()?;
        Ok(rows)
    }
}

const SELECT_OBLIGATION: &str = r#"
SELECT
    obligation_id, owner_id, customer_name,
    contact_email, contact_phone, contact_outreach_enabled,
    amount_cents, currency, due_date, status,
    current_bucket, bucket_entered_on,
    created_at, updated_at
FROM obligation
"#;

fn map_row_to_obligation(row: &Row) -> SqliteResult<Obligation> {
    let due_date_str: String = row.get(8)?;
    let due_date = NaiveDate::parse_from_str(&due_date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    // 状态字段不做静默兜底: 未知状态可能把不可催收账款误判为可催收
    let status_str: String = row.get(9)?;
    let status = ObligationStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            9,
            rusqlite::types::Type::Text,
            format!("未知账款状态: {}", status_str).into(),
        )
    })?;

    let created_at_str: String = row.get(12)?;
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, DATETIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let updated_at_str: String = row.get(13)?;
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, DATETIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(13, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Obligation {
        obligation_id: row.get(0)?,
        owner_id: row.get(1)?,
        customer_name: row.get(2)?,
        contact_email: row.get(3)?,
        contact_phone: row.get(4)?,
        contact_outreach_enabled: row.get::<_, i32>(5)? != 0,
        amount_cents: row.get(6)?,
        currency: row.get(7)?,
        due_date,
        status,
        current_bucket: row
            .get::<_, Option<String>>(10)?
            .and_then(|s| AgingBucket::from_str(&s)),
        bucket_entered_on: row
            .get::<_, Option<String>>(11)?
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        created_at,
        updated_at,
    })
}
