// ==========================================
// 需求聚合对账集成测试
// ==========================================
// 测试目标: 在真实 SQLite 文件库上验证一次对账的完整行为
// - 插入 / 更新 / 清除三类决策
// - 幂等、守恒、NULL 安全
// - 叶子字段以外的文档内容不受影响
// - 失败回滚与运行日志
// ==========================================


use demand_aggregation::domain::RunStatus;
use demand_aggregation::logging;
use demand_aggregation::repository::{ForecastPlanRepository, RunLogRepository};
use demand_aggregation::{AggregateDemandEngine, AggregationError, ReconcileCounters};
use rusqlite::Connection;
use serde_json::json;
use test_helpers::{
    count_plan_records, create_test_db, insert_demand, insert_item, insert_month_buckets,
    insert_plan_document, open_shared_connection, open_test_connection, read_document, ts,
};

const YEAR_START: &str = "2024-01-01";
const YEAR_END: &str = "2025-01-01";

/// 月度日历 + 物料 A(成本 2.0) / B(无成本)
fn setup() -> (tempfile::NamedTempFile, String, Connection) {
    logging::init_test();
    let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");
    insert_month_buckets(&conn, "month", 2024).unwrap();
    insert_item(&conn, "A", Some(2.0)).unwrap();
    insert_item(&conn, "B", None).unwrap();
    (temp_file, db_path, conn)
}

fn engine(db_path: &str) -> AggregateDemandEngine {
    AggregateDemandEngine::new(open_shared_connection(db_path).expect("Failed to open db"))
}

fn run_year(engine: &AggregateDemandEngine) -> ReconcileCounters {
    engine
        .reconcile("month", ts(YEAR_START), ts(YEAR_END))
        .expect("reconcile should succeed")
}

// ==========================================
// 典型场景: 插入 → 更新 → 清除
// ==========================================

#[test]
fn test_insert_update_delete_scenario() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    insert_demand(&conn, "D1", "A", Some("1"), Some("X"), "2024-01-10", 10.0, Some("open")).unwrap();
    insert_demand(&conn, "D2", "A", Some("1"), Some("X"), "2024-01-20", 5.0, Some("quote")).unwrap();

    let first = run_year(&engine);
    assert_eq!(first.inserted, 1);
    assert_eq!(first.writes(), 1);

    let doc = read_document(&conn, "A", Some("1"), Some("X"), "2024-01-01")
        .unwrap()
        .expect("leaf record should exist");
    assert_eq!(doc["orderstotal"].as_f64(), Some(15.0));
    assert_eq!(doc["ordersopen"].as_f64(), Some(15.0));
    assert_eq!(doc["orderstotalvalue"].as_f64(), Some(30.0));
    assert_eq!(doc["ordersopenvalue"].as_f64(), Some(30.0));
    assert_eq!(doc["leaf"], json!(1));

    // 第二行取消
    conn.execute("UPDATE demand SET status = 'canceled' WHERE name = 'D2'", [])
        .unwrap();
    let second = run_year(&engine);
    assert_eq!(
        second,
        ReconcileCounters {
            inserted: 0,
            updated: 1,
            deleted: 0,
            unchanged: 0
        }
    );
    let doc = read_document(&conn, "A", Some("1"), Some("X"), "2024-01-01")
        .unwrap()
        .unwrap();
    assert_eq!(doc["orderstotal"].as_f64(), Some(10.0));
    assert_eq!(doc["ordersopen"].as_f64(), Some(10.0));

    // 需求全部移除
    conn.execute("DELETE FROM demand", []).unwrap();
    let third = run_year(&engine);
    assert_eq!(third.deleted, 1);

    // 记录保留, 叶子字段被清除
    let doc = read_document(&conn, "A", Some("1"), Some("X"), "2024-01-01")
        .unwrap()
        .expect("record is never physically deleted by a pass");
    assert_eq!(doc, json!({}));
}

// ==========================================
// 性质
// ==========================================

#[test]
fn test_rerun_without_changes_is_noop() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    insert_demand(&conn, "D1", "A", Some("1"), Some("X"), "2024-01-10", 0.1, Some("open")).unwrap();
    insert_demand(&conn, "D2", "A", Some("1"), Some("X"), "2024-01-11", 0.2, None).unwrap();
    insert_demand(&conn, "D3", "A", Some("1"), Some("X"), "2024-01-12", 0.7, Some("closed")).unwrap();
    insert_demand(&conn, "D4", "B", None, None, "2024-03-03", 4.0, Some("inquiry")).unwrap();

    let first = run_year(&engine);
    assert_eq!(first.inserted, 2);

    let second = run_year(&engine);
    assert_eq!(second.writes(), 0);
    assert_eq!(second.unchanged, 2);
}

#[test]
fn test_totals_are_conserved() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    let lines = [
        ("D1", "A", Some("X"), "2024-01-10", 3.0, Some("open")),
        ("D2", "A", Some("X"), "2024-02-10", 4.0, Some("closed")),
        ("D3", "A", Some("Y"), "2024-02-11", 5.0, Some("canceled")),
        ("D4", "B", None, "2024-05-01", 6.0, None),
        ("D5", "B", Some("Y"), "2024-12-31", 7.0, Some("quote")),
    ];
    for (name, item, customer, due, qty, status) in lines {
        insert_demand(&conn, name, item, Some("1"), customer, due, qty, status).unwrap();
    }

    run_year(&engine);

    let repo = ForecastPlanRepository::new(&conn);
    let leaf_total: f64 = repo
        .list_all()
        .unwrap()
        .iter()
        .filter(|r| r.document.is_leaf())
        .filter_map(|r| r.document.number("orderstotal"))
        .sum();
    assert_eq!(leaf_total, 3.0 + 4.0 + 6.0 + 7.0);
    assert_eq!(repo.count_leaf_records(&demand_aggregation::Horizon::new(ts(YEAR_START), ts(YEAR_END))).unwrap(), 4);
}

#[test]
fn test_null_customer_and_location_match_existing_leaf() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    insert_demand(&conn, "D1", "A", None, None, "2024-04-02", 8.0, None).unwrap();
    insert_plan_document(
        &conn,
        "A",
        None,
        None,
        "2024-04-01",
        "2024-05-01",
        r#"{"orderstotal":8.0,"ordersopen":8.0,"orderstotalvalue":16.0,"ordersopenvalue":16.0,"leaf":1}"#,
    )
    .unwrap();

    let counters = run_year(&engine);
    assert_eq!(counters.unchanged, 1);
    assert_eq!(counters.writes(), 0);
    assert_eq!(count_plan_records(&conn).unwrap(), 1);
}

#[test]
fn test_insert_merges_into_override_only_record() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    insert_plan_document(&conn, "A", Some("1"), Some("X"), "2024-01-01", "2024-02-01", r#"{"override":42}"#)
        .unwrap();
    insert_demand(&conn, "D1", "A", Some("1"), Some("X"), "2024-01-10", 10.0, Some("open")).unwrap();

    let counters = run_year(&engine);
    assert_eq!(counters.inserted, 1);
    assert_eq!(count_plan_records(&conn).unwrap(), 1);

    let doc = read_document(&conn, "A", Some("1"), Some("X"), "2024-01-01")
        .unwrap()
        .unwrap();
    assert_eq!(doc["override"], json!(42));
    assert_eq!(doc["orderstotal"].as_f64(), Some(10.0));
    assert_eq!(doc["leaf"], json!(1));
}

#[test]
fn test_delete_preserves_unrelated_fields() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    insert_plan_document(
        &conn,
        "A",
        Some("1"),
        Some("X"),
        "2024-01-01",
        "2024-02-01",
        r#"{"override":42,"orderstotal":3.0,"ordersopen":3.0,"orderstotalvalue":6.0,"ordersopenvalue":6.0,"leaf":1}"#,
    )
    .unwrap();

    let counters = run_year(&engine);
    assert_eq!(counters.deleted, 1);

    let doc = read_document(&conn, "A", Some("1"), Some("X"), "2024-01-01")
        .unwrap()
        .unwrap();
    assert_eq!(doc, json!({"override": 42}));
}

#[test]
fn test_incomplete_leaf_record_is_rewritten() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    insert_plan_document(&conn, "A", Some("1"), Some("X"), "2024-01-01", "2024-02-01", r#"{"leaf":1,"orderstotal":10.0}"#)
        .unwrap();
    insert_demand(&conn, "D1", "A", Some("1"), Some("X"), "2024-01-10", 10.0, Some("open")).unwrap();

    let counters = run_year(&engine);
    assert_eq!(counters.updated, 1);

    let doc = read_document(&conn, "A", Some("1"), Some("X"), "2024-01-01")
        .unwrap()
        .unwrap();
    assert_eq!(doc["ordersopen"].as_f64(), Some(10.0));
    assert_eq!(doc["ordersopenvalue"].as_f64(), Some(20.0));
}

#[test]
fn test_missing_cost_writes_null_values() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    insert_demand(&conn, "D1", "B", Some("1"), Some("X"), "2024-06-10", 2.0, Some("closed")).unwrap();
    run_year(&engine);

    let doc = read_document(&conn, "B", Some("1"), Some("X"), "2024-06-01")
        .unwrap()
        .unwrap();
    assert_eq!(doc["orderstotal"].as_f64(), Some(2.0));
    assert_eq!(doc["ordersopen"], serde_json::Value::Null);
    assert_eq!(doc["orderstotalvalue"], serde_json::Value::Null);
    assert_eq!(doc["ordersopenvalue"], serde_json::Value::Null);

    // null 值读回后与重新计算的结果一致
    assert_eq!(run_year(&engine).writes(), 0);
}

#[test]
fn test_horizon_bounds_are_respected() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    // 区间外 (2 月之前) 的叶子记录不受影响
    insert_plan_document(&conn, "A", Some("1"), Some("X"), "2024-01-01", "2024-02-01", r#"{"leaf":1,"orderstotal":1.0}"#)
        .unwrap();
    // 区间末端所在桶的需求不参与
    insert_demand(&conn, "D1", "A", Some("1"), Some("X"), "2024-04-15", 5.0, None).unwrap();
    insert_demand(&conn, "D2", "A", Some("1"), Some("X"), "2024-02-15", 1.0, None).unwrap();

    let counters = engine
        .reconcile("month", ts("2024-02-01"), ts("2024-04-01"))
        .unwrap();
    assert_eq!(counters.inserted, 1);
    assert_eq!(counters.deleted, 0);

    let untouched = read_document(&conn, "A", Some("1"), Some("X"), "2024-01-01")
        .unwrap()
        .unwrap();
    assert_eq!(untouched, json!({"leaf": 1, "orderstotal": 1.0}));
    assert!(read_document(&conn, "A", Some("1"), Some("X"), "2024-04-01")
        .unwrap()
        .is_none());
}

#[test]
fn test_physical_order_does_not_matter() {
    let rows = [
        ("D1", "A", Some("X"), "2024-01-10", 0.1, Some("open")),
        ("D2", "A", Some("X"), "2024-01-10", 0.2, Some("quote")),
        ("D3", "A", Some("X"), "2024-01-11", 0.3, None),
        ("D4", "A", None, "2024-02-01", 1.5, Some("closed")),
        ("D5", "B", Some("Y"), "2024-02-02", 2.25, Some("open")),
        ("D6", "A", Some("X"), "2024-01-31", 0.7, Some("open")),
    ];

    let mut snapshots = Vec::new();
    for reversed in [false, true] {
        let (_tmp, db_path, conn) = setup();
        let ordered: Vec<_> = if reversed {
            rows.iter().rev().collect()
        } else {
            rows.iter().collect()
        };
        for (name, item, customer, due, qty, status) in ordered {
            insert_demand(&conn, name, item, Some("1"), *customer, due, *qty, *status).unwrap();
        }

        run_year(&engine(&db_path));

        let snapshot: Vec<(String, String)> = ForecastPlanRepository::new(&conn)
            .list_all()
            .unwrap()
            .into_iter()
            .map(|r| (r.key.to_string(), r.document.to_json()))
            .collect();
        snapshots.push(snapshot);
    }

    assert_eq!(snapshots[0].len(), 3);
    assert_eq!(snapshots[0], snapshots[1]);
}

// ==========================================
// 外部写入的时间格式
// ==========================================

fn plan_rows(conn: &Connection) -> Vec<(String, String)> {
    let mut stmt = conn
        .prepare("SELECT startdate, value FROM forecastplan ORDER BY id")
        .unwrap();
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn test_date_only_due_is_bucketed_by_its_day() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    conn.execute(
        "INSERT INTO demand (name, item_id, location_id, customer_id, due, quantity, status)
         VALUES ('D1', 'A', '1', 'X', '2024-02-01', 3, 'open')",
        [],
    )
    .unwrap();

    let counters = run_year(&engine);
    assert_eq!(counters.inserted, 1);

    let starts: Vec<String> = plan_rows(&conn).into_iter().map(|(s, _)| s).collect();
    assert_eq!(starts, vec!["2024-02-01 00:00:00".to_string()]);

    // 再跑一次无变化
    assert_eq!(run_year(&engine).writes(), 0);
}

#[test]
fn test_iso_startdate_record_is_merged_not_duplicated() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    conn.execute(
        "INSERT INTO forecastplan (item_id, location_id, customer_id, startdate, enddate, value)
         VALUES ('A', '1', 'X', '2024-01-01T00:00:00', '2024-02-01T00:00:00', '{\"override\":42}')",
        [],
    )
    .unwrap();
    insert_demand(&conn, "D1", "A", Some("1"), Some("X"), "2024-01-10", 4.0, Some("open")).unwrap();

    let counters = run_year(&engine);
    assert_eq!(counters.inserted, 1);

    let rows = plan_rows(&conn);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "2024-01-01T00:00:00");
    let doc: serde_json::Value = serde_json::from_str(&rows[0].1).unwrap();
    assert_eq!(doc["override"], json!(42));
    assert_eq!(doc["orderstotal"].as_f64(), Some(4.0));
    assert_eq!(doc["leaf"], json!(1));

    // 第二次对账经叶子扫描识别为同一键
    let second = run_year(&engine);
    assert_eq!(second.writes(), 0);
    assert_eq!(second.unchanged, 1);
}

// ==========================================
// 失败与日志
// ==========================================

#[test]
fn test_write_failure_mid_pass_rolls_back_earlier_writes() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    insert_demand(&conn, "D1", "A", Some("1"), Some("X"), "2024-01-10", 1.0, None).unwrap();
    insert_demand(&conn, "D2", "A", Some("1"), Some("X"), "2024-02-10", 2.0, None).unwrap();
    // 1 月记录先写入成功, 2 月记录写入被触发器拒绝
    conn.execute_batch(
        r#"
        CREATE TRIGGER reject_february BEFORE INSERT ON forecastplan
        WHEN NEW.startdate = '2024-02-01 00:00:00'
        BEGIN
            SELECT RAISE(ABORT, 'february rejected');
        END;
        "#,
    )
    .unwrap();

    let result = engine.reconcile("month", ts(YEAR_START), ts(YEAR_END));
    assert!(matches!(result, Err(AggregationError::Repository(_))));
    assert_eq!(count_plan_records(&conn).unwrap(), 0);

    let runs = RunLogRepository::new(&conn).list_recent(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].counters, ReconcileCounters::default());
    assert!(runs[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("february rejected"));
}

#[test]
fn test_unknown_calendar_leaves_store_untouched() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    insert_plan_document(&conn, "A", Some("1"), Some("X"), "2024-01-01", "2024-02-01", r#"{"leaf":1,"orderstotal":1.0}"#)
        .unwrap();

    let result = engine.reconcile("week", ts(YEAR_START), ts(YEAR_END));
    assert!(matches!(result, Err(AggregationError::UnknownCalendar(ref c)) if c == "week"));

    let doc = read_document(&conn, "A", Some("1"), Some("X"), "2024-01-01")
        .unwrap()
        .unwrap();
    assert_eq!(doc["leaf"], json!(1));

    let runs = RunLogRepository::new(&conn).list_recent(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error_message.as_deref().unwrap().contains("week"));
}

#[test]
fn test_successful_run_is_journaled() {
    let (_tmp, db_path, conn) = setup();
    let engine = engine(&db_path);

    insert_demand(&conn, "D1", "A", Some("1"), Some("X"), "2024-01-10", 1.0, None).unwrap();
    let counters = run_year(&engine);

    let runs = RunLogRepository::new(&conn).list_recent(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].counters, counters);
    assert_eq!(runs[0].bucket_calendar, "month");
    assert_eq!(runs[0].horizon_start, ts(YEAR_START));
    assert!(runs[0].duration_ms.is_some());
}
