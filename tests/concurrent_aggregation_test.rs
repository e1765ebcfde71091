// ==========================================
// 并发对账测试
// ==========================================
// 测试目标: 多个引擎实例并发对账同一区间, 结果与串行执行一致
// ==========================================


use demand_aggregation::domain::RunStatus;
use demand_aggregation::engine::HorizonLockRegistry;
use demand_aggregation::logging;
use demand_aggregation::repository::RunLogRepository;
use demand_aggregation::AggregateDemandEngine;
use std::sync::Arc;
use std::thread;
use test_helpers::{
    count_plan_records, create_test_db, insert_demand, insert_item, insert_month_buckets,
    open_shared_connection, open_test_connection, read_document, ts,
};

#[test]
fn test_overlapping_passes_are_serialized() {
    logging::init_test();
    let (_tmp, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).unwrap();
    insert_month_buckets(&conn, "month", 2024).unwrap();
    insert_item(&conn, "A", Some(1.5)).unwrap();
    for (i, due) in ["2024-01-05", "2024-02-05", "2024-03-05", "2024-03-06"].iter().enumerate() {
        insert_demand(&conn, &format!("D{}", i), "A", Some("1"), Some("X"), due, 2.0, Some("open"))
            .unwrap();
    }

    let registry = Arc::new(HorizonLockRegistry::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = AggregateDemandEngine::with_registry(
                open_shared_connection(&db_path).unwrap(),
                Arc::clone(&registry),
            );
            thread::spawn(move || engine.reconcile("month", ts("2024-01-01"), ts("2025-01-01")))
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked").expect("reconcile failed"))
        .collect();

    // 只有第一个完成的对账产生写入
    let inserted: usize = results.iter().map(|c| c.inserted).sum();
    let unchanged: usize = results.iter().map(|c| c.unchanged).sum();
    assert_eq!(inserted, 3);
    assert_eq!(unchanged, 9);
    assert!(results.iter().all(|c| c.updated == 0 && c.deleted == 0));

    assert_eq!(count_plan_records(&conn).unwrap(), 3);
    let march = read_document(&conn, "A", Some("1"), Some("X"), "2024-03-01")
        .unwrap()
        .unwrap();
    assert_eq!(march["orderstotal"].as_f64(), Some(4.0));
    assert_eq!(march["ordersopenvalue"].as_f64(), Some(6.0));

    let runs = RunLogRepository::new(&conn).list_recent(10).unwrap();
    assert_eq!(runs.len(), 4);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
    assert_eq!(registry.active_count(), 0);
}

#[test]
fn test_disjoint_horizons_run_independently() {
    let (_tmp, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).unwrap();
    insert_month_buckets(&conn, "month", 2024).unwrap();
    insert_item(&conn, "A", None).unwrap();
    insert_demand(&conn, "D1", "A", None, None, "2024-01-05", 1.0, None).unwrap();
    insert_demand(&conn, "D2", "A", None, None, "2024-07-05", 1.0, None).unwrap();

    let registry = Arc::new(HorizonLockRegistry::new());
    let first_half = AggregateDemandEngine::with_registry(
        open_shared_connection(&db_path).unwrap(),
        Arc::clone(&registry),
    );
    let second_half = AggregateDemandEngine::with_registry(
        open_shared_connection(&db_path).unwrap(),
        Arc::clone(&registry),
    );

    let h1 = thread::spawn(move || first_half.reconcile("month", ts("2024-01-01"), ts("2024-07-01")));
    let h2 = thread::spawn(move || second_half.reconcile("month", ts("2024-07-01"), ts("2025-01-01")));

    assert_eq!(h1.join().unwrap().unwrap().inserted, 1);
    assert_eq!(h2.join().unwrap().unwrap().inserted, 1);
    assert_eq!(count_plan_records(&conn).unwrap(), 2);
}
