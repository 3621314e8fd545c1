// ==========================================
// 演示数据生成器
// ==========================================
// 用途: 生成一个可直接跑通催收全流程的演示数据库
// 输出: tests/fixtures/dunning_demo.db
// ==========================================

use std::error::Error;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Local};

use ar_dunning_engine::db;
use ar_dunning_engine::domain::types::{
    AgingBucket, MessageTone, ObligationStatus, OutreachChannel,
};
use ar_dunning_engine::domain::{DunningWorkflow, Obligation, OwnerProfile, WorkflowStep};
use ar_dunning_engine::repository::{ObligationRepository, WorkflowRepository};

const DB_PATH: &str = "tests/fixtures/dunning_demo.db";

/// 演示债权人(正常催收)
const DEMO_OWNER: &str = "demo_owner";
/// 暂停催收的债权人(演示发送跳过)
const PAUSED_OWNER: &str = "paused_owner";

fn main() -> Result<(), Box<dyn Error>> {
    println!("开始生成演示数据库...");

    // 重复执行时覆盖旧库
    let _ = std::fs::remove_file(DB_PATH);

    let conn = db::open_dunning_database(DB_PATH)?;
    let conn = Arc::new(Mutex::new(conn));

    let workflow_repo = WorkflowRepository::new(conn.clone());
    let obligation_repo = ObligationRepository::new(conn.clone());

    // 1. 系统默认工作流(每桶一条,锁定)
    seed_system_workflows(&workflow_repo)?;

    // 2. 债权人档案
    seed_owner_profiles(&obligation_repo)?;

    // 3. 账款数据(覆盖各逾期区间与状态)
    seed_obligations(&obligation_repo)?;

    println!("✓ 演示数据库生成完成: {}", DB_PATH);
    println!();
    println!("建议流程:");
    println!("  ar-dunning-engine reassign --db {}", DB_PATH);
    println!(
        "  ar-dunning-engine generate --db {} --owner {} --bucket DAYS31_TO60",
        DB_PATH, DEMO_OWNER
    );
    println!("  (审批模板后)");
    println!("  ar-dunning-engine dispatch --db {}", DB_PATH);
    println!("  ar-dunning-engine report --db {}", DB_PATH);
    Ok(())
}

// ==========================================
// 系统默认工作流
// ==========================================

fn seed_system_workflows(repo: &WorkflowRepository) -> Result<(), Box<dyn Error>> {
    use AgingBucket::*;
    use MessageTone::*;
    use OutreachChannel::*;

    let definitions: Vec<(AgingBucket, &str, Vec<(i64, OutreachChannel, MessageTone)>)> = vec![
        (Current, "到期提醒流程", vec![(7, Email, Friendly)]),
        (
            Days1To30,
            "初期催收流程",
            vec![
                (3, Email, Friendly),
                (10, Email, Neutral),
                (20, Email, Neutral),
            ],
        ),
        (
            Days31To60,
            "二期催收流程",
            vec![(3, Email, Neutral), (14, Email, Firm)],
        ),
        (
            Days61To90,
            "三期催收流程",
            vec![(2, Email, Firm), (10, Sms, Firm), (20, Email, Firm)],
        ),
        (
            Days91To120,
            "严重逾期流程",
            vec![(1, Email, Firm), (10, Sms, Urgent)],
        ),
        (
            Days121To150,
            "临诉前催收流程",
            vec![(1, Sms, Urgent), (7, Email, Urgent), (14, Sms, Urgent)],
        ),
        (
            Days151Plus,
            "坏账边缘流程",
            vec![(0, Email, Urgent), (15, Sms, Urgent), (30, Email, Urgent)],
        ),
    ];

    let count = definitions.len();
    for (bucket, name, steps) in definitions {
        repo.insert_workflow(&system_workflow(bucket, name, &steps))?;
    }

    println!("✓ 生成系统默认工作流 ({}条, 每桶一条)", count);
    Ok(())
}

fn system_workflow(
    bucket: AgingBucket,
    name: &str,
    steps: &[(i64, OutreachChannel, MessageTone)],
) -> DunningWorkflow {
    let now = Local::now().naive_local();
    let workflow_id = format!("SYS_{}", bucket.to_db_str());

    let steps = steps
        .iter()
        .enumerate()
        .map(|(i, (day_offset, channel, tone))| WorkflowStep {
            step_id: format!("{}_S{}", workflow_id, i + 1),
            workflow_id: workflow_id.clone(),
            seq_no: (i + 1) as i64,
            day_offset: *day_offset,
            channel: *channel,
            tone: *tone,
        })
        .collect();

    DunningWorkflow {
        workflow_id: workflow_id.clone(),
        owner_id: None,
        bucket,
        name: name.to_string(),
        active: true,
        locked: true,
        cloned_from: None,
        steps,
        created_at: now,
        updated_at: now,
    }
}

// ==========================================
// 债权人档案
// ==========================================

fn seed_owner_profiles(repo: &ObligationRepository) -> Result<(), Box<dyn Error>> {
    let now = Local::now().naive_local();

    repo.upsert_owner_profile(&OwnerProfile {
        owner_id: DEMO_OWNER.to_string(),
        outreach_paused: false,
        updated_at: now,
    })?;
    repo.upsert_owner_profile(&OwnerProfile {
        owner_id: PAUSED_OWNER.to_string(),
        outreach_paused: true,
        updated_at: now,
    })?;

    println!("✓ 生成债权人档案 (2条, 其中1条全局暂停)");
    Ok(())
}

// ==========================================
// 账款数据
// ==========================================

fn seed_obligations(repo: &ObligationRepository) -> Result<(), Box<dyn Error>> {
    let mut obligations = Vec::new();
    let mut index = 0usize;

    // 每个逾期区间铺一批可催收账款(负数 = 尚未到期)
    let dpd_spread: &[i64] = &[
        -10, -2, 0, 5, 12, 28, 35, 47, 58, 66, 82, 95, 110, 130, 145, 160, 220, 365,
    ];
    for &days_overdue in dpd_spread {
        for _ in 0..3 {
            index += 1;
            let status = if index % 7 == 0 {
                ObligationStatus::InPaymentPlan
            } else {
                ObligationStatus::Open
            };
            obligations.push(demo_obligation(index, DEMO_OWNER, days_overdue, status));
        }
    }

    // 不可催收状态(重算/生成/发送都应跳过)
    for status in [
        ObligationStatus::Paid,
        ObligationStatus::Disputed,
        ObligationStatus::Settled,
        ObligationStatus::Canceled,
    ] {
        index += 1;
        obligations.push(demo_obligation(index, DEMO_OWNER, 40, status));
    }

    // 缺联系方式: 发送时计入跳过
    index += 1;
    let mut missing_contact = demo_obligation(index, DEMO_OWNER, 45, ObligationStatus::Open);
    missing_contact.contact_email = None;
    missing_contact.contact_phone = None;
    obligations.push(missing_contact);

    // 联系人拒收: 发送时计入跳过
    index += 1;
    let mut opted_out = demo_obligation(index, DEMO_OWNER, 45, ObligationStatus::Open);
    opted_out.contact_outreach_enabled = false;
    obligations.push(opted_out);

    // 暂停债权人名下账款
    for days_overdue in [20i64, 50, 100] {
        index += 1;
        obligations.push(demo_obligation(
            index,
            PAUSED_OWNER,
            days_overdue,
            ObligationStatus::Open,
        ));
    }

    let count = repo.batch_upsert(&obligations)?;
    println!("✓ 生成账款数据 ({}条, 覆盖全部账龄区间与状态)", count);
    Ok(())
}

fn demo_obligation(
    index: usize,
    owner_id: &str,
    days_overdue: i64,
    status: ObligationStatus,
) -> Obligation {
    let now = Local::now().naive_local();
    let today = Local::now().date_naive();

    Obligation {
        obligation_id: format!("INV{:06}", index),
        owner_id: owner_id.to_string(),
        customer_name: Some(format!("演示客户{:02}", index % 20)),
        contact_email: Some(format!("customer{:02}@example.com", index % 20)),
        contact_phone: Some(format!("+86-138-0000-{:04}", 1000 + (index * 37) % 9000)),
        contact_outreach_enabled: true,
        amount_cents: 50_000 + (index as i64 % 40) * 12_500,
        currency: "CNY".to_string(),
        due_date: today - Duration::days(days_overdue),
        status,
        // 桶位缓存留空,由 reassign 命令分桶
        current_bucket: None,
        bucket_entered_on: None,
        created_at: now,
        updated_at: now,
    }
}
