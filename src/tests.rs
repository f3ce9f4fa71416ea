//! Integration tests for the request-handling core
//! These tests run the route logic against an in-memory SQLite database

#[cfg(test)]
mod tests {
    use crate::auth;
    use crate::config::Config;
    use crate::db::Database;
    use crate::error::AppError;
    use crate::models::*;
    use crate::routes::{attendance, balance, dashboard, expenses, menu, orders, staff, stream, wages};
    use crate::state::AppState;
    use rusqlite::Connection;
    use std::sync::Arc;

    /// Create an initialized in-memory database
    fn test_db() -> Database {
        let db = Database::open_in_memory().expect("Failed to create in-memory database");
        db.initialize().expect("Failed to initialize schema");
        db
    }

    /// Full application state over an in-memory database, for handlers and
    /// tasks that take `Arc<AppState>` rather than a connection
    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            db: test_db(),
            config: Config {
                port: 0,
                db_path: ":memory:".to_string(),
            },
        })
    }

    fn add_menu_item(conn: &Connection, name: &str, price: i64) -> i64 {
        conn.execute(
            "INSERT INTO menu_items (name, category, price) VALUES (?1, 'mains', ?2)",
            rusqlite::params![name, price],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn add_staff(conn: &Connection, name: &str) -> i64 {
        conn.execute("INSERT INTO staff (name) VALUES (?1)", [name])
            .unwrap();
        conn.last_insert_rowid()
    }

    fn order_of(items: &[(i64, i64)]) -> CreateOrder {
        CreateOrder {
            items: items
                .iter()
                .map(|&(menu_item_id, quantity)| CreateOrderItem {
                    menu_item_id,
                    quantity,
                    notes: None,
                })
                .collect(),
            table_number: None,
        }
    }

    // ===== ORDER INTAKE =====

    #[test]
    fn test_order_total_uses_live_menu_prices() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let soup = add_menu_item(&conn, "Soup", 450);
        let steak = add_menu_item(&conn, "Steak", 2200);

        let created = orders::insert_order(&conn, &order_of(&[(soup, 2), (steak, 1)])).unwrap();

        let order = orders::get_order(&conn, created.order_id).unwrap();
        assert_eq!(order.total, 2 * 450 + 2200);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_order_numbers_are_daily_sequential() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let soup = add_menu_item(&conn, "Soup", 450);

        let first = orders::insert_order(&conn, &order_of(&[(soup, 1)])).unwrap();
        let second = orders::insert_order(&conn, &order_of(&[(soup, 1)])).unwrap();
        let third = orders::insert_order(&conn, &order_of(&[(soup, 1)])).unwrap();

        assert_eq!(first.order_number, "001");
        assert_eq!(second.order_number, "002");
        assert_eq!(third.order_number, "003");
    }

    #[test]
    fn test_order_number_ignores_previous_days() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let soup = add_menu_item(&conn, "Soup", 450);

        // Yesterday's order must not advance today's counter
        conn.execute(
            "INSERT INTO orders (order_number, status, total, created_at, updated_at)
             VALUES ('007', 'served', 450, datetime('now', '-1 day'), datetime('now', '-1 day'))",
            [],
        )
        .unwrap();

        let created = orders::insert_order(&conn, &order_of(&[(soup, 1)])).unwrap();
        assert_eq!(created.order_number, "001");
    }

    #[test]
    fn test_empty_order_is_rejected_and_persists_nothing() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let err = orders::insert_order(&conn, &order_of(&[])).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_unknown_menu_item_rejects_whole_submission() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let soup = add_menu_item(&conn, "Soup", 450);

        let err = orders::insert_order(&conn, &order_of(&[(soup, 1), (9999, 1)])).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let orders_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
            .unwrap();
        let items_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM order_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orders_count, 0, "No order row may survive a rejected cart");
        assert_eq!(items_count, 0, "No line items may survive a rejected cart");
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let soup = add_menu_item(&conn, "Soup", 450);

        let err = orders::insert_order(&conn, &order_of(&[(soup, 0)])).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_price_at_time_survives_menu_price_change() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let steak = add_menu_item(&conn, "Steak", 2200);
        let created = orders::insert_order(&conn, &order_of(&[(steak, 1)])).unwrap();

        menu::update_item(
            &conn,
            &UpdateMenuItem {
                id: steak,
                name: None,
                category: None,
                price: Some(2600),
                available: None,
                position: None,
            },
        )
        .unwrap();

        let captured: i64 = conn
            .query_row(
                "SELECT price_at_time FROM order_items WHERE order_id = ?1",
                [created.order_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(captured, 2200, "Captured price must not follow the menu");

        // A fresh order picks up the new price
        let later = orders::insert_order(&conn, &order_of(&[(steak, 1)])).unwrap();
        let order = orders::get_order(&conn, later.order_id).unwrap();
        assert_eq!(order.total, 2600);
    }

    // ===== STATUS TRANSITIONS =====

    #[test]
    fn test_status_transitions_are_permissive() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let soup = add_menu_item(&conn, "Soup", 450);
        let created = orders::insert_order(&conn, &order_of(&[(soup, 1)])).unwrap();

        // Forward, then backward (the "undo serve" gesture)
        for status in ["served", "pending", "ready", "preparing"] {
            let order = orders::update_status(
                &conn,
                &StatusUpdate {
                    order_id: created.order_id,
                    status: status.to_string(),
                },
            )
            .unwrap();
            assert_eq!(order.status.as_str(), status);
        }
    }

    #[test]
    fn test_status_update_bumps_updated_at() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let soup = add_menu_item(&conn, "Soup", 450);
        let created = orders::insert_order(&conn, &order_of(&[(soup, 1)])).unwrap();

        conn.execute(
            "UPDATE orders SET updated_at = '2000-01-01 00:00:00' WHERE id = ?1",
            [created.order_id],
        )
        .unwrap();

        let order = orders::update_status(
            &conn,
            &StatusUpdate {
                order_id: created.order_id,
                status: "ready".to_string(),
            },
        )
        .unwrap();

        assert_ne!(order.updated_at, "2000-01-01 00:00:00");
    }

    #[test]
    fn test_invalid_status_literal_is_rejected() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let soup = add_menu_item(&conn, "Soup", 450);
        let created = orders::insert_order(&conn, &order_of(&[(soup, 1)])).unwrap();

        let err = orders::update_status(
            &conn,
            &StatusUpdate {
                order_id: created.order_id,
                status: "burnt".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_status_update_unknown_order_is_not_found() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let err = orders::update_status(
            &conn,
            &StatusUpdate {
                order_id: 42,
                status: "ready".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    // ===== LIVE FEED SNAPSHOT =====

    #[test]
    fn test_snapshot_of_empty_day_is_empty_list() {
        let db = test_db();

        let json = stream::snapshot_json(&db).unwrap();
        assert_eq!(json, "[]");
    }

    #[test]
    fn test_snapshot_is_stable_for_unchanged_data() {
        let db = test_db();

        {
            let conn = db.conn().unwrap();
            let soup = add_menu_item(&conn, "Soup", 450);
            orders::insert_order(&conn, &order_of(&[(soup, 2)])).unwrap();
        }

        let first = stream::snapshot_json(&db).unwrap();
        let second = stream::snapshot_json(&db).unwrap();
        assert_eq!(first, second, "Unchanged data must serialize identically");
    }

    #[test]
    fn test_snapshot_carries_orders_with_item_names() {
        let db = test_db();

        {
            let conn = db.conn().unwrap();
            let soup = add_menu_item(&conn, "Soup", 450);
            orders::insert_order(&conn, &order_of(&[(soup, 2)])).unwrap();
        }

        let json = stream::snapshot_json(&db).unwrap();
        assert!(json.contains("\"orderNumber\":\"001\""));
        assert!(json.contains("\"menuItemName\":\"Soup\""));
    }

    #[test]
    fn test_snapshot_changes_after_status_transition() {
        let db = test_db();

        let order_id = {
            let conn = db.conn().unwrap();
            let soup = add_menu_item(&conn, "Soup", 450);
            orders::insert_order(&conn, &order_of(&[(soup, 1)]))
                .unwrap()
                .order_id
        };

        let before = stream::snapshot_json(&db).unwrap();

        {
            let conn = db.conn().unwrap();
            orders::update_status(
                &conn,
                &StatusUpdate {
                    order_id,
                    status: "preparing".to_string(),
                },
            )
            .unwrap();
        }

        let after = stream::snapshot_json(&db).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_feed_poll_suppresses_unchanged_snapshots() {
        let db = test_db();
        let mut last_sent = None;

        assert!(
            stream::poll_event(&db, &mut last_sent).is_some(),
            "First poll always carries the snapshot, even an empty one"
        );
        assert!(
            stream::poll_event(&db, &mut last_sent).is_none(),
            "An unchanged snapshot must not be re-sent"
        );

        let order_id = {
            let conn = db.conn().unwrap();
            let soup = add_menu_item(&conn, "Soup", 450);
            orders::insert_order(&conn, &order_of(&[(soup, 1)]))
                .unwrap()
                .order_id
        };

        assert!(
            stream::poll_event(&db, &mut last_sent).is_some(),
            "A new order must produce an event"
        );
        assert!(stream::poll_event(&db, &mut last_sent).is_none());

        {
            let conn = db.conn().unwrap();
            orders::update_status(
                &conn,
                &StatusUpdate {
                    order_id,
                    status: "ready".to_string(),
                },
            )
            .unwrap();
        }

        assert!(
            stream::poll_event(&db, &mut last_sent).is_some(),
            "A status change must produce exactly one event"
        );
        assert!(stream::poll_event(&db, &mut last_sent).is_none());
    }

    #[test]
    fn test_feed_poll_failure_keeps_last_sent_snapshot() {
        let db = test_db();
        let mut last_sent = None;

        assert!(stream::poll_event(&db, &mut last_sent).is_some());
        let before = last_sent.clone();

        {
            let conn = db.conn().unwrap();
            conn.execute("DROP TABLE order_items", []).unwrap();
            conn.execute("DROP TABLE orders", []).unwrap();
        }

        assert!(
            stream::poll_event(&db, &mut last_sent).is_some(),
            "A failed read still emits an in-band error event"
        );
        assert_eq!(
            last_sent, before,
            "A failed tick must not clobber the last sent snapshot"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_tasks_stop_when_client_disconnects() {
        let state = test_state();

        {
            let conn = state.db.conn().unwrap();
            let soup = add_menu_item(&conn, "Soup", 450);
            orders::insert_order(&conn, &order_of(&[(soup, 1)])).unwrap();
        }

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let snapshot = tokio::spawn(stream::run_snapshot_loop(state.clone(), tx.clone()));
        let heartbeat = tokio::spawn(stream::run_heartbeat_loop(tx));

        // The snapshot loop owns the first event
        assert!(rx.recv().await.is_some());

        // Client goes away; both timer tasks must wind down on their own
        drop(rx);
        snapshot.await.unwrap();
        heartbeat.await.unwrap();
    }

    // ===== DASHBOARD =====

    #[test]
    fn test_dashboard_empty_day_is_all_zeroes() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let summary = dashboard::day_summary(&conn, "2001-01-01").unwrap();

        assert_eq!(summary.total_orders, 0);
        assert_eq!(summary.total_revenue, 0);
        assert_eq!(summary.status_counts.pending, 0);
        assert_eq!(summary.status_counts.preparing, 0);
        assert_eq!(summary.status_counts.ready, 0);
        assert_eq!(summary.status_counts.served, 0);
        assert!(summary.top_items.is_empty());
    }

    #[test]
    fn test_dashboard_counts_revenue_and_statuses() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let soup = add_menu_item(&conn, "Soup", 450);
        let steak = add_menu_item(&conn, "Steak", 2200);

        orders::insert_order(&conn, &order_of(&[(soup, 2)])).unwrap();
        let second = orders::insert_order(&conn, &order_of(&[(steak, 1)])).unwrap();
        orders::update_status(
            &conn,
            &StatusUpdate {
                order_id: second.order_id,
                status: "ready".to_string(),
            },
        )
        .unwrap();

        let summary = dashboard::day_summary(&conn, &local_today()).unwrap();

        assert_eq!(summary.total_orders, 2);
        assert_eq!(summary.total_revenue, 2 * 450 + 2200);
        assert_eq!(summary.status_counts.pending, 1);
        assert_eq!(summary.status_counts.ready, 1);
    }

    #[test]
    fn test_dashboard_top_items_capped_at_five() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let mut cart = Vec::new();
        for i in 0..7i64 {
            let id = add_menu_item(&conn, &format!("Dish {i}"), 1000);
            // Distinct quantities so the descending order is observable
            cart.push((id, 7 - i));
        }
        orders::insert_order(&conn, &order_of(&cart)).unwrap();

        let summary = dashboard::day_summary(&conn, &local_today()).unwrap();

        assert_eq!(summary.top_items.len(), 5);
        assert_eq!(summary.top_items[0].name.as_deref(), Some("Dish 0"));
        assert_eq!(summary.top_items[0].quantity_sold, 7);
        assert!(summary
            .top_items
            .windows(2)
            .all(|w| w[0].quantity_sold >= w[1].quantity_sold));
    }

    // ===== EXPENSES =====

    #[test]
    fn test_expense_range_filter_and_grand_total() {
        let db = test_db();
        let conn = db.conn().unwrap();

        for (date, amount) in [
            ("2024-01-05", 1000),
            ("2024-01-10", 2000),
            ("2024-01-20", 3000),
            ("2024-01-25", 4000),
        ] {
            expenses::insert_expense(
                &conn,
                &CreateExpense {
                    date: date.to_string(),
                    category: "ingredients".to_string(),
                    description: "Market run".to_string(),
                    amount,
                },
            )
            .unwrap();
        }

        let report =
            expenses::list_expenses(&conn, Some("2024-01-10"), Some("2024-01-20"), None).unwrap();

        assert_eq!(report.expenses.len(), 2);
        assert!(report
            .expenses
            .iter()
            .all(|e| e.date.as_str() >= "2024-01-10" && e.date.as_str() <= "2024-01-20"));
        assert_eq!(report.grand_total, 5000);
        assert_eq!(report.category_totals.get("ingredients"), Some(&5000));
    }

    #[test]
    fn test_expense_category_filter() {
        let db = test_db();
        let conn = db.conn().unwrap();

        expenses::insert_expense(
            &conn,
            &CreateExpense {
                date: "2024-01-10".to_string(),
                category: "rent".to_string(),
                description: "January rent".to_string(),
                amount: 90000,
            },
        )
        .unwrap();
        expenses::insert_expense(
            &conn,
            &CreateExpense {
                date: "2024-01-10".to_string(),
                category: "utilities".to_string(),
                description: "Electricity".to_string(),
                amount: 12000,
            },
        )
        .unwrap();

        let report = expenses::list_expenses(&conn, None, None, Some("rent")).unwrap();
        assert_eq!(report.expenses.len(), 1);
        assert_eq!(report.grand_total, 90000);
    }

    #[test]
    fn test_expense_validation() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let bad_date = expenses::insert_expense(
            &conn,
            &CreateExpense {
                date: "10-01-2024".to_string(),
                category: "rent".to_string(),
                description: "".to_string(),
                amount: 100,
            },
        )
        .unwrap_err();
        assert!(matches!(bad_date, AppError::Validation(_)));

        let bad_category = expenses::insert_expense(
            &conn,
            &CreateExpense {
                date: "2024-01-10".to_string(),
                category: "bribes".to_string(),
                description: "".to_string(),
                amount: 100,
            },
        )
        .unwrap_err();
        assert!(matches!(bad_category, AppError::Validation(_)));

        let bad_amount = expenses::insert_expense(
            &conn,
            &CreateExpense {
                date: "2024-01-10".to_string(),
                category: "rent".to_string(),
                description: "".to_string(),
                amount: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(bad_amount, AppError::Validation(_)));
    }

    #[test]
    fn test_expense_delete_missing_is_not_found() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let err = expenses::delete_expense(&conn, 42).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    // ===== WAGES =====

    #[test]
    fn test_wage_totals_grouped_per_staff() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let ana = add_staff(&conn, "Ana");
        let bruno = add_staff(&conn, "Bruno");

        for (staff_id, amount) in [(ana, 50000), (ana, 25000), (bruno, 60000)] {
            wages::insert_wage(
                &conn,
                &CreateWagePayment {
                    staff_id,
                    date: "2024-02-01".to_string(),
                    amount,
                    notes: None,
                },
            )
            .unwrap();
        }

        let report = wages::list_wages(&conn, None, None).unwrap();

        assert_eq!(report.grand_total, 135000);
        assert_eq!(report.staff_totals.len(), 2);

        let ana_total = report
            .staff_totals
            .iter()
            .find(|t| t.staff_id == ana)
            .unwrap();
        assert_eq!(ana_total.total, 75000);
    }

    #[test]
    fn test_wage_for_unknown_staff_is_not_found() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let err = wages::insert_wage(
            &conn,
            &CreateWagePayment {
                staff_id: 42,
                date: "2024-02-01".to_string(),
                amount: 1000,
                notes: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    // ===== STAFF =====

    #[test]
    fn test_staff_delete_is_soft() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let ana = add_staff(&conn, "Ana");
        staff::deactivate_staff(&conn, ana).unwrap();

        // Row survives with the flag cleared
        let active: bool = conn
            .query_row("SELECT active FROM staff WHERE id = ?1", [ana], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(!active);

        assert!(staff::list_staff(&conn, false).unwrap().is_empty());
        assert_eq!(staff::list_staff(&conn, true).unwrap().len(), 1);
    }

    // ===== ATTENDANCE =====

    #[test]
    fn test_attendance_upsert_never_duplicates_a_day() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let ana = add_staff(&conn, "Ana");

        attendance::upsert_record(
            &conn,
            &UpsertAttendance {
                staff_id: ana,
                date: "2024-03-01".to_string(),
                status: "present".to_string(),
            },
        )
        .unwrap();

        let updated = attendance::upsert_record(
            &conn,
            &UpsertAttendance {
                staff_id: ana,
                date: "2024-03-01".to_string(),
                status: "leave".to_string(),
            },
        )
        .unwrap();
        assert_eq!(updated.status, AttendanceStatus::Leave);

        let report =
            attendance::list_range(&conn, Some("2024-03-01"), Some("2024-03-31")).unwrap();
        assert_eq!(report.records.len(), 1, "Upsert must update, not duplicate");
        assert_eq!(report.records[0].status, AttendanceStatus::Leave);
    }

    #[test]
    fn test_attendance_lookup_by_staff_and_date() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let ana = add_staff(&conn, "Ana");

        let missing = attendance::find_record(&conn, ana, "2024-03-01").unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));

        attendance::upsert_record(
            &conn,
            &UpsertAttendance {
                staff_id: ana,
                date: "2024-03-01".to_string(),
                status: "present".to_string(),
            },
        )
        .unwrap();

        let record = attendance::find_record(&conn, ana, "2024-03-01").unwrap();
        assert_eq!(record.staff_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_attendance_rejects_unknown_staff_and_bad_status() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let ana = add_staff(&conn, "Ana");

        let unknown = attendance::upsert_record(
            &conn,
            &UpsertAttendance {
                staff_id: 42,
                date: "2024-03-01".to_string(),
                status: "present".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(unknown, AppError::NotFound(_)));

        let bad_status = attendance::upsert_record(
            &conn,
            &UpsertAttendance {
                staff_id: ana,
                date: "2024-03-01".to_string(),
                status: "awol".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(bad_status, AppError::Validation(_)));
    }

    #[test]
    fn test_attendance_update_and_delete_by_id() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let ana = add_staff(&conn, "Ana");
        let record = attendance::upsert_record(
            &conn,
            &UpsertAttendance {
                staff_id: ana,
                date: "2024-03-01".to_string(),
                status: "present".to_string(),
            },
        )
        .unwrap();

        let updated = attendance::update_record(
            &conn,
            &AttendanceUpdate {
                id: record.id,
                status: "absent".to_string(),
            },
        )
        .unwrap();
        assert_eq!(updated.status, AttendanceStatus::Absent);

        attendance::delete_record(&conn, record.id).unwrap();
        let gone = attendance::delete_record(&conn, record.id).unwrap_err();
        assert!(matches!(gone, AppError::NotFound(_)));
    }

    #[test]
    fn test_attendance_single_lookup_requires_both_params() {
        assert_eq!(
            attendance::single_record_key(Some(1), Some("2024-03-01")).unwrap(),
            Some((1, "2024-03-01"))
        );
        assert_eq!(attendance::single_record_key(None, None).unwrap(), None);

        let missing_date = attendance::single_record_key(Some(1), None).unwrap_err();
        let AppError::Validation(message) = missing_date else {
            panic!("A half-specified lookup must be a validation error");
        };
        assert!(message.contains("date"));

        let missing_staff = attendance::single_record_key(None, Some("2024-03-01")).unwrap_err();
        let AppError::Validation(message) = missing_staff else {
            panic!("A half-specified lookup must be a validation error");
        };
        assert!(message.contains("staffId"));
    }

    // ===== DAILY BALANCE =====

    #[test]
    fn test_balance_first_insert_requires_opening() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let err = balance::upsert_balance(
            &conn,
            &UpsertBalance {
                date: "2024-04-01".to_string(),
                opening_balance: None,
                closing_balance: Some(5000),
                notes: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert!(balance::find_balance(&conn, "2024-04-01").unwrap().is_none());
    }

    #[test]
    fn test_balance_upsert_patches_only_supplied_fields() {
        let db = test_db();
        let conn = db.conn().unwrap();

        balance::upsert_balance(
            &conn,
            &UpsertBalance {
                date: "2024-04-01".to_string(),
                opening_balance: Some(10000),
                closing_balance: None,
                notes: Some("float from safe".to_string()),
            },
        )
        .unwrap();

        let patched = balance::upsert_balance(
            &conn,
            &UpsertBalance {
                date: "2024-04-01".to_string(),
                opening_balance: None,
                closing_balance: Some(23500),
                notes: None,
            },
        )
        .unwrap();

        assert_eq!(patched.opening_balance, 10000);
        assert_eq!(patched.closing_balance, Some(23500));
        assert_eq!(patched.notes.as_deref(), Some("float from safe"));

        // Still exactly one row for the date
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM daily_balances WHERE date = '2024-04-01'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    // ===== MENU =====

    #[test]
    fn test_menu_partial_update_keeps_other_fields() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let created = menu::insert_item(
            &conn,
            &CreateMenuItem {
                name: "Flan".to_string(),
                category: "desserts".to_string(),
                price: 600,
                position: Some(3),
            },
        )
        .unwrap();

        let updated = menu::update_item(
            &conn,
            &UpdateMenuItem {
                id: created.id,
                name: None,
                category: None,
                price: None,
                available: Some(false),
                position: None,
            },
        )
        .unwrap();

        assert!(!updated.available);
        assert_eq!(updated.name, "Flan");
        assert_eq!(updated.price, 600);
        assert_eq!(updated.position, 3);
    }

    #[test]
    fn test_menu_update_unknown_item_is_not_found() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let err = menu::update_item(
            &conn,
            &UpdateMenuItem {
                id: 42,
                name: Some("Ghost".to_string()),
                category: None,
                price: None,
                available: None,
                position: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_menu_available_filter() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let flan = add_menu_item(&conn, "Flan", 600);
        add_menu_item(&conn, "Soup", 450);

        menu::update_item(
            &conn,
            &UpdateMenuItem {
                id: flan,
                name: None,
                category: None,
                price: None,
                available: Some(false),
                position: None,
            },
        )
        .unwrap();

        assert_eq!(menu::list_items(&conn, true).unwrap().len(), 1);
        assert_eq!(menu::list_items(&conn, false).unwrap().len(), 2);
    }

    // ===== AUTH =====

    fn seed_admin(conn: &Connection, username: &str, password: &str) {
        conn.execute(
            "INSERT INTO admin_users (username, password_hash) VALUES (?1, ?2)",
            rusqlite::params![username, auth::password_digest(password)],
        )
        .unwrap();
    }

    #[test]
    fn test_login_success() {
        let db = test_db();
        let conn = db.conn().unwrap();

        seed_admin(&conn, "owner", "secret123");

        let user = auth::verify_login(&conn, "owner", "secret123").unwrap();
        assert_eq!(user.username, "owner");
    }

    #[test]
    fn test_login_failures_are_indistinguishable() {
        let db = test_db();
        let conn = db.conn().unwrap();

        seed_admin(&conn, "owner", "secret123");

        let wrong_password = auth::verify_login(&conn, "owner", "nope").unwrap_err();
        let unknown_user = auth::verify_login(&conn, "ghost", "secret123").unwrap_err();

        let (AppError::Unauthorized(a), AppError::Unauthorized(b)) =
            (&wrong_password, &unknown_user)
        else {
            panic!("Both failures must be unauthorized");
        };
        assert_eq!(a, b, "Messages must not reveal which part was wrong");
    }

    #[tokio::test]
    async fn test_login_with_missing_fields_is_a_validation_error() {
        use axum::extract::State;
        use axum::Json;

        let state = test_state();

        // Absent keys deserialize to empty strings and must land on the
        // handler's own 400 path, not an extractor rejection
        let req: LoginRequest = serde_json::from_str("{}").unwrap();
        assert!(req.username.is_empty());
        assert!(req.password.is_empty());

        match auth::login(State(state), Json(req)).await {
            Err(AppError::Validation(message)) => assert!(message.contains("username")),
            _ => panic!("A body without credentials must be a validation error"),
        }
    }

    #[test]
    fn test_session_gate_prefix_matching() {
        assert!(auth::is_protected("/dashboard"));
        assert!(auth::is_protected("/wages/history"));
        assert!(auth::is_protected("/expenses/new"));
        assert!(!auth::is_protected("/dashboardish"));
        assert!(!auth::is_protected("/api/expenses"));
        assert!(!auth::is_protected("/login"));
        assert!(!auth::is_protected("/"));
    }

    #[test]
    fn test_session_cookie_parsing() {
        use axum::http::{header::COOKIE, HeaderMap, HeaderValue};

        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; lang=en"),
        );
        assert_eq!(auth::session_cookie(&headers).as_deref(), Some("abc123"));

        let mut empty = HeaderMap::new();
        empty.insert(COOKIE, HeaderValue::from_static("session="));
        assert_eq!(auth::session_cookie(&empty).as_deref(), Some(""));

        assert_eq!(auth::session_cookie(&HeaderMap::new()), None);
    }

    // ===== CONFIG =====

    #[test]
    fn test_config_falls_back_on_malformed_value() {
        // Variable names are unique to this test so parallel tests never race
        std::env::set_var("COMANDA_TEST_BAD_PORT", "not-a-port");
        let port: u16 = crate::config::try_load("COMANDA_TEST_BAD_PORT", "3000");
        assert_eq!(port, 3000);
        std::env::remove_var("COMANDA_TEST_BAD_PORT");

        let port: u16 = crate::config::try_load("COMANDA_TEST_UNSET_PORT", "4000");
        assert_eq!(port, 4000);

        std::env::set_var("COMANDA_TEST_GOOD_PORT", "8080");
        let port: u16 = crate::config::try_load("COMANDA_TEST_GOOD_PORT", "3000");
        assert_eq!(port, 8080);
        std::env::remove_var("COMANDA_TEST_GOOD_PORT");
    }

    // ===== DATABASE LIFECYCLE =====

    #[test]
    fn test_on_disk_database_reopens_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pos.db");

        {
            let db = Database::open(&path).unwrap();
            db.initialize().unwrap();
            let conn = db.conn().unwrap();
            add_menu_item(&conn, "Soup", 450);
        }

        // Second open runs initialize (and migrations) against existing tables
        let db = Database::open(&path).unwrap();
        db.initialize().unwrap();
        let conn = db.conn().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM menu_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_today_orders_lists_items_in_creation_order() {
        let db = test_db();
        let conn = db.conn().unwrap();

        let soup = add_menu_item(&conn, "Soup", 450);
        let steak = add_menu_item(&conn, "Steak", 2200);

        orders::insert_order(&conn, &order_of(&[(soup, 1)])).unwrap();
        orders::insert_order(&conn, &order_of(&[(steak, 2)])).unwrap();

        let listed = orders::today_orders(&conn).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].order.order_number, "001");
        assert_eq!(listed[1].order.order_number, "002");
        assert_eq!(listed[1].items[0].menu_item_name.as_deref(), Some("Steak"));
        assert_eq!(listed[1].items[0].quantity, 2);
    }

    #[test]
    fn test_date_validation() {
        assert!(validate_date("date", "2024-02-29").is_ok());
        assert!(validate_date("date", "2023-02-29").is_err());
        assert!(validate_date("date", "2024-1-05").is_err());
        assert!(validate_date("date", "yesterday").is_err());
    }
}
