// ==========================================
// 首件确认流程测试
// ==========================================
// 职责: 验证首件流程的尺寸明细录入、按初始重量判定、提交与重建,
//       以及与穴重追踪共享模具分配登记表
// ==========================================


#[cfg(test)]
mod first_pieces_workflow_test {
    use molding_shift_tracker::domain::{Quadrant, WallThicknessReading};
    use molding_shift_tracker::engine::{
        EngineError, MoldAssignmentRegistry, ProductionDaySession, SubmitOutcome,
    };
    use chrono::NaiveDate;
    use molding_shift_tracker::{
        CavityWeightTrail, DimensionalDetail, FirstPiecesApproval, ProductionDay, ReportKind,
        TimeWindow, ToleranceClass,
    };
    use std::sync::Arc;

    use crate::test_helpers::{create_test_db, open_shared_conn, sqlite_session};

    fn approved_detail() -> DimensionalDetail {
        let mut wall = WallThicknessReading::empty(Quadrant::X1);
        wall.points = [0.41, 0.42, 0.40, 0.39, 0.45, 0.50, 0.38];
        DimensionalDetail {
            surface_finish: "OK".to_string(),
            volume: Some(250.0),
            length_inner_dia: Some(28.1),
            breadth_outer_dia: Some(30.2),
            height: Some(12.0),
            fitment: vec![true; 4],
            leakage_test: "PASS".to_string(),
            remarks: "首件合格".to_string(),
            wall_thickness: vec![
                wall,
                WallThicknessReading::empty(Quadrant::X2),
                WallThicknessReading::empty(Quadrant::Y1),
                WallThicknessReading::empty(Quadrant::Y2),
            ],
        }
    }

    #[tokio::test]
    async fn test_first_pieces_submit_and_reload() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared_conn(&db_path);

        let (slot_id, detail) = {
            let session: ProductionDaySession<FirstPiecesApproval> =
                sqlite_session(conn.clone(), Arc::new(MoldAssignmentRegistry::new()));
            session.select_tool("L1", "T4").await.unwrap();

            let slot = session.slots("L1").unwrap()[0].clone();
            assert_eq!(slot.measurements[0].detail.fitment.len(), 4);
            assert_eq!(slot.measurements[0].detail.wall_thickness.len(), 4);

            // 以初始重量 5.5 判定 (标准重量为 5.0)
            for position in 0..4 {
                session
                    .set_cavity_value("L1", &slot.id, position, Some(5.5))
                    .unwrap();
            }
            assert_eq!(
                session.aggregate("L1", &slot.id).unwrap().classification,
                ToleranceClass::Exact
            );

            let detail = approved_detail();
            session
                .set_cavity_detail("L1", &slot.id, 0, detail.clone())
                .unwrap();
            assert!(matches!(
                session.set_cavity_detail("L1", &slot.id, 9, detail.clone()),
                Err(EngineError::CavityOutOfRange { .. })
            ));

            let SubmitOutcome::Submitted(record) =
                session.submit_slot("L1", &slot.id, "qa1").await.unwrap()
            else {
                panic!("expected submission");
            };
            assert_eq!(record.report_kind, ReportKind::FirstPieces);
            assert_eq!(record.cavity_details.len(), 4);
            assert_eq!(record.cavity_details[0].detail["volume"], 250.0);
            assert_eq!(record.average_value, 5.5);

            (slot.id, detail)
        };

        // 重建
        let session: ProductionDaySession<FirstPiecesApproval> =
            sqlite_session(conn, Arc::new(MoldAssignmentRegistry::new()));
        let restore = session.load_line("L1").await.unwrap();
        assert_eq!(restore.restored_slots, 1);
        assert_eq!(restore.current_tool_id.as_deref(), Some("T4"));

        let restored = session.slot("L1", &slot_id).unwrap();
        assert!(restored.locked);
        assert_eq!(restored.time_window, TimeWindow::H08);
        assert_eq!(restored.measurements[0].detail, detail);
        assert!(restored.measurements[0].detail.fitment_passed());
        assert_eq!(restored.active_values(), vec![5.5; 4]);
    }

    #[tokio::test]
    async fn test_workflows_are_stored_separately() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared_conn(&db_path);
        let registry = Arc::new(MoldAssignmentRegistry::new());

        let first_pieces: ProductionDaySession<FirstPiecesApproval> =
            sqlite_session(conn.clone(), registry.clone());
        first_pieces.select_tool("L1", "T4").await.unwrap();
        let id = first_pieces.slots("L1").unwrap()[0].id.clone();
        first_pieces.set_cavity_value("L1", &id, 0, Some(5.4)).unwrap();
        first_pieces.submit_slot("L1", &id, "qa1").await.unwrap();

        let weights: ProductionDaySession<CavityWeightTrail> =
            sqlite_session(conn, registry.clone());
        assert_eq!(weights.load_line("L1").await.unwrap().restored_slots, 0);

        // 同一产线在两个流程中使用同一模具
        weights.select_tool("L1", "T4").await.unwrap();
        // 其他产线不可占用
        assert!(matches!(
            weights.select_tool("L2", "T4").await,
            Err(EngineError::ToolConflict { ref held_by_line_id, .. }) if held_by_line_id == "L1"
        ));
    }

    #[tokio::test]
    async fn test_other_workflow_switch_keeps_tool_held() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared_conn(&db_path);
        let registry = Arc::new(MoldAssignmentRegistry::new());

        let first_pieces: ProductionDaySession<FirstPiecesApproval> =
            sqlite_session(conn.clone(), registry.clone());
        let weights: ProductionDaySession<CavityWeightTrail> =
            sqlite_session(conn, registry.clone());

        first_pieces.select_tool("L1", "T4").await.unwrap();
        // 穴重流程在同一产线选用其他模具, 不释放首件流程的 T4
        weights.select_tool("L1", "T1").await.unwrap();

        assert!(matches!(
            weights.select_tool("L2", "T4").await,
            Err(EngineError::ToolConflict { ref held_by_line_id, .. }) if held_by_line_id == "L1"
        ));
        assert!(weights.assignment("L2").unwrap().is_none());
        assert_eq!(
            first_pieces.assignment("L1").unwrap().map(|a| a.tool.tool_id),
            Some("T4".to_string())
        );
        assert_eq!(registry.holder_of("T4").unwrap(), Some("L1".to_string()));

        // 穴重流程持有的 T1 同样不可被首件流程的其他产线占用
        assert!(matches!(
            first_pieces.select_tool("L2", "T1").await,
            Err(EngineError::ToolConflict { .. })
        ));

        // 首件流程释放后, T4 才可被其他产线使用
        first_pieces.release_line("L1").unwrap();
        weights.select_tool("L2", "T4").await.unwrap();
        assert_eq!(registry.holder_of("T4").unwrap(), Some("L2".to_string()));
    }

    #[tokio::test]
    async fn test_reset_keeps_other_workflow_holds() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared_conn(&db_path);
        let registry = Arc::new(MoldAssignmentRegistry::new());

        let first_pieces: ProductionDaySession<FirstPiecesApproval> =
            sqlite_session(conn.clone(), registry.clone());
        let mut weights: ProductionDaySession<CavityWeightTrail> =
            sqlite_session(conn, registry.clone());

        first_pieces.select_tool("L1", "T4").await.unwrap();
        weights.select_tool("L1", "T4").await.unwrap();
        weights.select_tool("L3", "T2").await.unwrap();

        let next_day = ProductionDay::new(NaiveDate::from_ymd_opt(2025, 5, 2).unwrap());
        weights.reset(next_day).unwrap();

        // 穴重流程的占用已释放, 首件流程仍持有 L1 的 T4
        assert_eq!(registry.tool_of(ReportKind::CavityWeight, "L1").unwrap(), None);
        assert_eq!(registry.holder_of("T2").unwrap(), None);
        assert_eq!(
            registry.tool_of(ReportKind::FirstPieces, "L1").unwrap(),
            Some("T4".to_string())
        );
        assert!(matches!(
            weights.select_tool("L2", "T4").await,
            Err(EngineError::ToolConflict { ref held_by_line_id, .. }) if held_by_line_id == "L1"
        ));
    }
}
