// ==========================================
// 生产日会话工作流测试
// ==========================================
// 职责: 验证选模、中途换模、模具冲突、容量耗尽、历史重建与生产日切换
// ==========================================


#[cfg(test)]
mod session_workflow_test {
    use chrono::NaiveDate;
    use molding_shift_tracker::engine::{
        ChangeoverKind, EngineError, MoldAssignmentRegistry, ProductionDaySession, SlotRecordStore,
        SubmitOutcome,
    };
    use molding_shift_tracker::repository::SlotSubmissionRepository;
    use molding_shift_tracker::{
        CavityWeightTrail, ProductionDay, ReportKind, Shift, SlotStatus, TimeWindow,
        ToleranceClass,
    };
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use crate::test_helpers::{
        create_test_db, open_shared_conn, production_day, session_with_store, sqlite_session,
        FlakyStore,
    };

    type Session = ProductionDaySession<CavityWeightTrail>;

    fn slot_id(session: &Session, line_id: &str, window: TimeWindow) -> String {
        session
            .slots(line_id)
            .unwrap()
            .into_iter()
            .find(|s| s.time_window == window)
            .map(|s| s.id)
            .unwrap()
    }

    async fn submit_window(session: &Session, line_id: &str, window: TimeWindow) {
        let id = slot_id(session, line_id, window);
        session.set_cavity_value(line_id, &id, 0, Some(12.1)).unwrap();
        session.set_cavity_value(line_id, &id, 1, Some(11.9)).unwrap();
        let outcome = session.submit_slot(line_id, &id, "op1").await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Submitted(_)));
    }

    // ==========================================
    // 选模与中途换模
    // ==========================================

    #[tokio::test]
    async fn test_first_selection_generates_full_day() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let session: Session =
            sqlite_session(open_shared_conn(&db_path), Arc::new(MoldAssignmentRegistry::new()));

        let outcome = session.select_tool("L1", "T1").await.unwrap();
        assert_eq!(outcome.kind, ChangeoverKind::FirstAssignment);
        assert_eq!(outcome.created_count, 12);

        let slots = session.slots("L1").unwrap();
        let windows: Vec<TimeWindow> = slots.iter().map(|s| s.time_window).collect();
        assert_eq!(windows, TimeWindow::ALL.to_vec());
        for slot in &slots {
            assert_eq!(slot.measurements.len(), 8);
            assert_eq!(slot.active_entries().count(), 4);
            assert_eq!(slot.cycle_time, 18.0);
            assert_eq!(slot.status(), SlotStatus::Pending);
        }

        let assignment = session.assignment("L1").unwrap().unwrap();
        assert!(assignment.locked);
        assert_eq!(assignment.tool.tool_id, "T1");
    }

    #[tokio::test]
    async fn test_midday_changeover_keeps_submitted_slots() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared_conn(&db_path);
        let registry = Arc::new(MoldAssignmentRegistry::new());
        let session: Session = sqlite_session(conn.clone(), registry.clone());

        session.select_tool("L1", "T1").await.unwrap();
        submit_window(&session, "L1", TimeWindow::H08).await;
        submit_window(&session, "L1", TimeWindow::H10).await;
        let locked_before: Vec<_> = session
            .slots("L1")
            .unwrap()
            .into_iter()
            .filter(|s| s.locked)
            .collect();

        // 未提交时段的草稿在换模时丢弃
        let draft = slot_id(&session, "L1", TimeWindow::H12);
        session.set_cavity_value("L1", &draft, 0, Some(99.0)).unwrap();

        session.begin_changeover("L1").unwrap();
        let outcome = session.select_tool("L1", "T2").await.unwrap();

        assert_eq!(outcome.kind, ChangeoverKind::MidDay);
        assert_eq!(outcome.retained_count, 2);
        assert_eq!(outcome.created_count, 10);
        assert_eq!(outcome.changeover_window, Some(TimeWindow::H12));
        assert_eq!(outcome.previous_tool_name.as_deref(), Some("Cap 28mm"));

        let slots = session.slots("L1").unwrap();
        assert_eq!(slots.len(), 12);
        assert_eq!(&slots[0..2], &locked_before[..]);

        let marker = &slots[2];
        assert!(marker.is_changeover_point);
        assert_eq!(marker.previous_tool_name.as_deref(), Some("Cap 28mm"));
        assert_eq!(marker.tool_id, "T2");
        assert_eq!(marker.active_entries().count(), 2);
        assert!(marker.measurements.iter().all(|e| e.value.is_none()));
        assert!(slots[3..].iter().all(|s| !s.is_changeover_point && s.tool_id == "T2"));

        // 原模具已释放
        assert_eq!(registry.holder_of("T1").unwrap(), None);
        assert_eq!(registry.holder_of("T2").unwrap(), Some("L1".to_string()));

        // 上模记录
        let repo = SlotSubmissionRepository::new(conn);
        let active = repo
            .find_active_assignment("L1", production_day().date)
            .unwrap()
            .unwrap();
        assert_eq!(active.tool_id, "T2");
        assert_eq!(active.first_window, Some(TimeWindow::H12));
        assert_eq!(active.shift, Shift::Day);
        assert_eq!(active.previous_tool_name.as_deref(), Some("Cap 28mm"));
        assert_eq!(repo.find_assignments("L1", production_day().date).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_changeover_point_record_carries_timestamp() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let session: Session =
            sqlite_session(open_shared_conn(&db_path), Arc::new(MoldAssignmentRegistry::new()));

        session.select_tool("L1", "T1").await.unwrap();
        submit_window(&session, "L1", TimeWindow::H08).await;
        session.begin_changeover("L1").unwrap();
        session.select_tool("L1", "T2").await.unwrap();

        let marker = slot_id(&session, "L1", TimeWindow::H10);
        session.set_cavity_value("L1", &marker, 0, Some(20.0)).unwrap();
        let SubmitOutcome::Submitted(record) =
            session.submit_slot("L1", &marker, "op2").await.unwrap()
        else {
            panic!("expected submission");
        };
        assert!(record.is_changeover_point);
        assert_eq!(record.previous_tool_name.as_deref(), Some("Cap 28mm"));
        assert_eq!(record.changeover_at, Some(record.submitted_at));
    }

    #[tokio::test]
    async fn test_select_while_assignment_locked() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let registry = Arc::new(MoldAssignmentRegistry::new());
        let session: Session = sqlite_session(open_shared_conn(&db_path), registry.clone());

        session.select_tool("L1", "T1").await.unwrap();
        let err = session.select_tool("L1", "T2").await.unwrap_err();
        assert!(matches!(err, EngineError::AssignmentLocked { .. }));
        assert_eq!(
            registry.tool_of(ReportKind::CavityWeight, "L1").unwrap(),
            Some("T1".to_string())
        );

        assert!(matches!(
            session.begin_changeover("L9"),
            Err(EngineError::NoAssignment { .. })
        ));
        assert!(matches!(
            session.select_tool("L1", "T404").await,
            Err(EngineError::UnknownTool(_))
        ));
    }

    // ==========================================
    // 模具冲突 / 容量耗尽
    // ==========================================

    #[tokio::test]
    async fn test_tool_conflict_leaves_both_lines_unchanged() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let registry = Arc::new(MoldAssignmentRegistry::new());
        let session: Session = sqlite_session(open_shared_conn(&db_path), registry.clone());

        session.select_tool("L1", "T1").await.unwrap();
        let l1_before = session.slots("L1").unwrap();

        match session.select_tool("L2", "T1").await.unwrap_err() {
            EngineError::ToolConflict {
                tool_id,
                held_by_line_id,
            } => {
                assert_eq!(tool_id, "T1");
                assert_eq!(held_by_line_id, "L1");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(session.slots("L2").unwrap().is_empty());
        assert!(session.assignment("L2").unwrap().is_none());
        assert_eq!(session.slots("L1").unwrap(), l1_before);
        assert_eq!(registry.holder_of("T1").unwrap(), Some("L1".to_string()));
    }

    #[tokio::test]
    async fn test_no_remaining_capacity_does_not_take_tool() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let registry = Arc::new(MoldAssignmentRegistry::new());
        let session: Session = sqlite_session(open_shared_conn(&db_path), registry.clone());

        session.select_tool("L3", "T1").await.unwrap();
        for window in TimeWindow::ALL {
            submit_window(&session, "L3", window).await;
        }
        let before = session.slots("L3").unwrap();

        session.begin_changeover("L3").unwrap();
        let err = session.select_tool("L3", "T3").await.unwrap_err();
        assert!(matches!(err, EngineError::NoRemainingCapacity { ref line_id } if line_id == "L3"));

        assert_eq!(session.slots("L3").unwrap(), before);
        assert_eq!(registry.holder_of("T3").unwrap(), None);
        assert_eq!(
            registry.tool_of(ReportKind::CavityWeight, "L3").unwrap(),
            Some("T1".to_string())
        );
    }

    #[tokio::test]
    async fn test_released_line_frees_tool() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let registry = Arc::new(MoldAssignmentRegistry::new());
        let session: Session = sqlite_session(open_shared_conn(&db_path), registry.clone());

        session.select_tool("L1", "T1").await.unwrap();
        assert_eq!(session.release_line("L1").unwrap(), Some("T1".to_string()));
        assert!(session.assignment("L1").unwrap().is_none());

        session.select_tool("L2", "T1").await.unwrap();
        assert_eq!(registry.holder_of("T1").unwrap(), Some("L2".to_string()));
    }

    // ==========================================
    // 已提交时段不可修改
    // ==========================================

    #[tokio::test]
    async fn test_submitted_slot_is_immutable() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let session: Session =
            sqlite_session(open_shared_conn(&db_path), Arc::new(MoldAssignmentRegistry::new()));

        session.select_tool("L1", "T1").await.unwrap();
        submit_window(&session, "L1", TimeWindow::H08).await;
        let id = slot_id(&session, "L1", TimeWindow::H08);
        let before = session.slot("L1", &id).unwrap();
        assert_eq!(before.status(), SlotStatus::Completed);

        assert!(matches!(
            session.set_cavity_value("L1", &id, 0, Some(1.0)),
            Err(EngineError::SlotLocked { .. })
        ));
        assert!(session.set_cycle_time("L1", &id, 5.0).is_err());
        assert!(session.set_notes("L1", &id, "edit").is_err());
        assert!(session.fill_active_cavities("L1", &id).is_err());
        assert_eq!(session.slot("L1", &id).unwrap(), before);

        // 重复提交为无操作
        assert_eq!(
            session.submit_slot("L1", &id, "op1").await.unwrap(),
            SubmitOutcome::AlreadySubmitted
        );
    }

    // ==========================================
    // 录入与聚合
    // ==========================================

    #[tokio::test]
    async fn test_aggregate_follows_entries() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let session: Session =
            sqlite_session(open_shared_conn(&db_path), Arc::new(MoldAssignmentRegistry::new()));
        session.select_tool("L1", "T1").await.unwrap();
        let id = slot_id(&session, "L1", TimeWindow::H14);

        assert_eq!(
            session.aggregate("L1", &id).unwrap().classification,
            ToleranceClass::NoData
        );

        session.set_cavity_value("L1", &id, 0, Some(12.0)).unwrap();
        let aggregate = session.set_cavity_value("L1", &id, 1, Some(12.0)).unwrap();
        assert_eq!(aggregate.classification, ToleranceClass::Exact);

        let aggregate = session.set_cavity_value("L1", &id, 2, Some(13.0)).unwrap();
        assert_eq!(aggregate.classification, ToleranceClass::WithinTolerance);

        let aggregate = session.set_cavity_value("L1", &id, 3, Some(16.0)).unwrap();
        assert_eq!(aggregate.average, 13.25);
        assert_eq!(aggregate.classification, ToleranceClass::OutOfTolerance);

        // 非激活穴位不参与
        let aggregate = session.set_cavity_value("L1", &id, 6, Some(500.0)).unwrap();
        assert_eq!(aggregate.sample_count, 4);
    }

    #[tokio::test]
    async fn test_fill_active_cavities_uses_standard() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let session: Session =
            sqlite_session(open_shared_conn(&db_path), Arc::new(MoldAssignmentRegistry::new()));
        session.select_tool("L1", "T3").await.unwrap();
        let id = slot_id(&session, "L1", TimeWindow::H08);

        session.set_cavity_value("L1", &id, 0, Some(101.0)).unwrap();
        let aggregate = session.fill_active_cavities("L1", &id).unwrap();

        // T3 未配置标准重量, 回退 100g
        let slot = session.slot("L1", &id).unwrap();
        assert_eq!(slot.measurements[0].value, Some(101.0));
        assert!(slot.measurements[1..].iter().all(|e| e.value == Some(100.0)));
        assert_eq!(aggregate.sample_count, 8);
        assert_eq!(aggregate.classification, ToleranceClass::WithinTolerance);
    }

    #[tokio::test]
    async fn test_submit_without_measurement_is_rejected() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let session: Session =
            sqlite_session(open_shared_conn(&db_path), Arc::new(MoldAssignmentRegistry::new()));
        session.select_tool("L1", "T1").await.unwrap();
        let id = slot_id(&session, "L1", TimeWindow::H08);
        session.set_notes("L1", &id, "machine idle").unwrap();

        let err = session.submit_slot("L1", &id, "op1").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(!session.slot("L1", &id).unwrap().locked);
    }

    #[tokio::test]
    async fn test_assignment_log_failure_does_not_undo_selection() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let store = Arc::new(FlakyStore::new(open_shared_conn(&db_path)));
        store.fail_assignments.store(true, Ordering::SeqCst);
        let registry = Arc::new(MoldAssignmentRegistry::new());
        let session: Session =
            session_with_store(store.clone() as Arc<dyn SlotRecordStore>, registry.clone());

        session.select_tool("L1", "T1").await.unwrap();
        assert_eq!(session.slots("L1").unwrap().len(), 12);
        assert_eq!(
            registry.tool_of(ReportKind::CavityWeight, "L1").unwrap(),
            Some("T1".to_string())
        );
        assert!(store
            .repo()
            .find_active_assignment("L1", production_day().date)
            .unwrap()
            .is_none());
    }

    // ==========================================
    // 历史重建
    // ==========================================

    #[tokio::test]
    async fn test_load_line_restores_submitted_history() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared_conn(&db_path);

        let submitted_ids = {
            let session: Session =
                sqlite_session(conn.clone(), Arc::new(MoldAssignmentRegistry::new()));
            session.select_tool("L1", "T1").await.unwrap();
            submit_window(&session, "L1", TimeWindow::H08).await;
            submit_window(&session, "L1", TimeWindow::H10).await;
            vec![
                slot_id(&session, "L1", TimeWindow::H08),
                slot_id(&session, "L1", TimeWindow::H10),
            ]
        };

        // 进程重启: 新登记表 + 新会话
        let registry = Arc::new(MoldAssignmentRegistry::new());
        let session: Session = sqlite_session(conn, registry.clone());
        let restore = session.load_line("L1").await.unwrap();

        assert_eq!(restore.restored_slots, 2);
        assert_eq!(restore.current_tool_id.as_deref(), Some("T1"));
        assert_eq!(restore.conflict_with_line_id, None);
        assert_eq!(
            registry.tool_of(ReportKind::CavityWeight, "L1").unwrap(),
            Some("T1".to_string())
        );
        assert!(session.assignment("L1").unwrap().unwrap().locked);

        let slots = session.slots("L1").unwrap();
        let ids: Vec<String> = slots.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, submitted_ids);
        assert!(slots.iter().all(|s| s.locked));
        assert_eq!(slots[0].active_values(), vec![12.1, 11.9]);
        assert_eq!(slots[0].average_value, 12.0);
        assert_eq!(slots[0].submitted_by.as_deref(), Some("op1"));

        // 重建后可继续换模
        session.begin_changeover("L1").unwrap();
        let outcome = session.select_tool("L1", "T2").await.unwrap();
        assert_eq!(outcome.changeover_window, Some(TimeWindow::H12));
        assert_eq!(outcome.previous_tool_name.as_deref(), Some("Cap 28mm"));
    }

    #[tokio::test]
    async fn test_load_line_conflict_leaves_line_unassigned() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared_conn(&db_path);
        {
            let session: Session =
                sqlite_session(conn.clone(), Arc::new(MoldAssignmentRegistry::new()));
            session.select_tool("L1", "T1").await.unwrap();
            submit_window(&session, "L1", TimeWindow::H08).await;
        }

        let registry = Arc::new(MoldAssignmentRegistry::new());
        registry.try_assign(ReportKind::CavityWeight, "L9", "T1").unwrap();
        let session: Session = sqlite_session(conn, registry.clone());

        let restore = session.load_line("L1").await.unwrap();
        assert_eq!(restore.restored_slots, 1);
        assert_eq!(restore.current_tool_id, None);
        assert_eq!(restore.conflict_with_line_id.as_deref(), Some("L9"));
        assert!(session.assignment("L1").unwrap().is_none());
        assert_eq!(registry.holder_of("T1").unwrap(), Some("L9".to_string()));
    }

    #[tokio::test]
    async fn test_load_line_without_history_is_noop() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let session: Session =
            sqlite_session(open_shared_conn(&db_path), Arc::new(MoldAssignmentRegistry::new()));
        session.select_tool("L1", "T1").await.unwrap();

        let restore = session.load_line("L1").await.unwrap();
        assert_eq!(restore.restored_slots, 0);
        assert_eq!(session.slots("L1").unwrap().len(), 12);
    }

    // ==========================================
    // 生产日切换
    // ==========================================

    #[tokio::test]
    async fn test_reset_releases_all_lines() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let registry = Arc::new(MoldAssignmentRegistry::new());
        let mut session: Session = sqlite_session(open_shared_conn(&db_path), registry.clone());

        session.select_tool("L1", "T1").await.unwrap();
        session.select_tool("L2", "T2").await.unwrap();
        submit_window(&session, "L1", TimeWindow::H08).await;

        let next_day = ProductionDay::new(NaiveDate::from_ymd_opt(2025, 5, 2).unwrap());
        session.reset(next_day).unwrap();

        assert_eq!(session.production_day(), next_day);
        assert!(session.slots("L1").unwrap().is_empty());
        assert!(session.assignment("L1").unwrap().is_none());
        assert!(registry.snapshot().unwrap().is_empty());

        // 新生产日无历史, 首次选模生成完整时段
        assert_eq!(session.load_line("L1").await.unwrap().restored_slots, 0);
        let outcome = session.select_tool("L1", "T2").await.unwrap();
        assert_eq!(outcome.kind, ChangeoverKind::FirstAssignment);
    }
}
