// ==========================================
// 引擎链集成测试
// ==========================================
// 目标: 直连三引擎(分桶/生成/发送),配置走注入的 Mock
// 口径: 不经 API 层,验证引擎之间通过仓储完成交接
// ==========================================


#[cfg(test)]
mod engine_integration_test {
    use crate::test_helpers::{self, MockConfigReader, ScriptedDeliveryService};
    use ar_dunning_engine::db;
    use ar_dunning_engine::domain::types::{AgingBucket, TemplateState};
    use ar_dunning_engine::engine::dispatch_engine::DispatchEngine;
    use ar_dunning_engine::engine::reassign::ReassignmentEngine;
    use ar_dunning_engine::engine::template_generator::{
        GenerationHints, TemplateGenerationEngine,
    };
    use ar_dunning_engine::repository::obligation_repo::ObligationRepository;
    use ar_dunning_engine::repository::template_repo::TemplateRepository;
    use ar_dunning_engine::repository::workflow_repo::WorkflowRepository;
    use std::sync::{Arc, Mutex};

    const OWNER: &str = "owner_engine";

    struct EngineStack {
        obligation_repo: Arc<ObligationRepository>,
        workflow_repo: Arc<WorkflowRepository>,
        template_repo: Arc<TemplateRepository>,
        reassign: ReassignmentEngine<MockConfigReader>,
        generation: TemplateGenerationEngine,
        dispatch: DispatchEngine<MockConfigReader>,
        delivery: Arc<ScriptedDeliveryService>,
    }

    fn build_stack(db_path: &str, config: MockConfigReader) -> EngineStack {
        let conn = db::open_dunning_database(db_path).expect("无法打开测试库");
        let conn = Arc::new(Mutex::new(conn));
        let config = Arc::new(config);
        let delivery = Arc::new(ScriptedDeliveryService::default());

        let obligation_repo = Arc::new(ObligationRepository::new(conn.clone()));
        let workflow_repo = Arc::new(WorkflowRepository::new(conn.clone()));
        let template_repo = Arc::new(TemplateRepository::new(conn.clone()));

        EngineStack {
            reassign: ReassignmentEngine::new(obligation_repo.clone(), config.clone()),
            generation: TemplateGenerationEngine::new(
                workflow_repo.clone(),
                template_repo.clone(),
            ),
            dispatch: DispatchEngine::new(
                obligation_repo.clone(),
                workflow_repo.clone(),
                template_repo.clone(),
                delivery.clone(),
                config,
            ),
            obligation_repo,
            workflow_repo,
            template_repo,
            delivery,
        }
    }

    fn approve_all(stack: &EngineStack) -> usize {
        let pending = stack
            .template_repo
            .list_templates(Some(OWNER), None, Some(TemplateState::PendingApproval))
            .expect("查询失败");
        for template in &pending {
            stack
                .template_repo
                .update_state(&template.template_id, TemplateState::Approved)
                .expect("审批失败");
        }
        pending.len()
    }

    // 20 笔账款、分片大小 7: 分桶与发送都应切成 3 片
    #[tokio::test]
    async fn test_chunk_sizes_follow_injected_config() {
        let (_tmp, db_path) = test_helpers::create_test_db().expect("无法创建测试库");
        let stack = build_stack(&db_path, MockConfigReader::with_chunk_sizes(7, 7));
        let today = test_helpers::fixed_today();

        let seed: Vec<_> = (0..20)
            .map(|i| test_helpers::obligation(&format!("OBL_EI_{:02}", i), OWNER, 15))
            .collect();
        stack.obligation_repo.batch_upsert(&seed).expect("播种失败");
        stack
            .workflow_repo
            .insert_workflow(&test_helpers::system_workflow(
                "wf_engine_chain",
                AgingBucket::Days1To30,
                &[0, 30],
            ))
            .expect("建流失败");

        let outcome = stack
            .reassign
            .reassign_scope(None, today)
            .await
            .expect("分桶失败");
        assert_eq!(outcome.merged.reassigned, 20);
        assert_eq!(outcome.total_chunks, 3, "20 笔按 7 切 3 片");
        assert_eq!(outcome.completed_chunks, 3);

        let summary = stack.generation.generate_for_bucket(
            OWNER,
            AgingBucket::Days1To30,
            &GenerationHints::default(),
        );
        assert!(summary.success);
        assert_eq!(summary.templates_created, 2);
        assert_eq!(approve_all(&stack), 2);

        let outcome = stack
            .dispatch
            .dispatch_scope(None, today)
            .await
            .expect("发送失败");
        assert_eq!(outcome.merged.sent, 20, "当日入桶全部落在首步窗口");
        assert_eq!(outcome.total_chunks, 3);
        assert!(outcome.failed_chunks.is_empty());
        assert_eq!(stack.delivery.call_count(), 20);
    }

    // 漂移账款被重分到新桶后,生成与发送随新桶走
    #[tokio::test]
    async fn test_drift_handoff_across_engines() {
        let (_tmp, db_path) = test_helpers::create_test_db().expect("无法创建测试库");
        let stack = build_stack(&db_path, MockConfigReader::default());
        let today = test_helpers::fixed_today();

        // 缓存还停在 1-30 桶,实际逾期天数已到 45 天
        stack
            .obligation_repo
            .batch_upsert(&[test_helpers::obligation_in_bucket(
                "OBL_EI_DRIFT",
                OWNER,
                45,
                AgingBucket::Days1To30,
                10,
            )])
            .expect("播种失败");
        stack
            .workflow_repo
            .insert_workflow(&test_helpers::system_workflow(
                "wf_engine_31_60",
                AgingBucket::Days31To60,
                &[0],
            ))
            .expect("建流失败");

        let outcome = stack
            .reassign
            .reassign_scope(Some(OWNER), today)
            .await
            .expect("分桶失败");
        assert_eq!(outcome.merged.reassigned, 1);

        let moved = stack
            .obligation_repo
            .find_by_id("OBL_EI_DRIFT")
            .expect("查询失败")
            .expect("账款应存在");
        assert_eq!(moved.current_bucket, Some(AgingBucket::Days31To60));
        assert_eq!(moved.bucket_entered_on, Some(today));

        let summary = stack.generation.generate_for_bucket(
            OWNER,
            AgingBucket::Days31To60,
            &GenerationHints::default(),
        );
        assert_eq!(summary.templates_created, 1);
        assert_eq!(approve_all(&stack), 1);

        let outcome = stack
            .dispatch
            .dispatch_scope(Some(OWNER), today)
            .await
            .expect("发送失败");
        assert_eq!(outcome.merged.sent, 1, "入桶当日即落在第 0 天首步窗口");
        assert_eq!(
            stack.delivery.recorded_recipients(),
            vec!["obl_ei_drift@example.com".to_string()]
        );
    }
}
