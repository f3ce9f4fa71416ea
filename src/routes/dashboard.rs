use axum::{
    extract::{Query, State},
    Json,
};
use rusqlite::Connection;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{local_today, validate_date, DashboardSummary, StatusCounts, TopItem};
use crate::state::AppState;

const TOP_ITEMS_LIMIT: i64 = 5;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub date: Option<String>,
}

/// One day's aggregates, recomputed from the store on every request.
pub fn day_summary(conn: &Connection, date: &str) -> Result<DashboardSummary, AppError> {
    let (total_orders, total_revenue): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(total), 0) FROM orders
         WHERE date(created_at, 'localtime') = ?1",
        [date],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut status_counts = StatusCounts::default();

    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM orders
         WHERE date(created_at, 'localtime') = ?1
         GROUP BY status",
    )?;

    let rows = stmt
        .query_map([date], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (status, count) in rows {
        match status.as_str() {
            "pending" => status_counts.pending = count,
            "preparing" => status_counts.preparing = count,
            "ready" => status_counts.ready = count,
            "served" => status_counts.served = count,
            _ => {}
        }
    }

    let mut stmt = conn.prepare(
        "SELECT oi.menu_item_id, m.name, SUM(oi.quantity) AS sold
         FROM order_items oi
         JOIN orders o ON oi.order_id = o.id
         LEFT JOIN menu_items m ON oi.menu_item_id = m.id
         WHERE date(o.created_at, 'localtime') = ?1
         GROUP BY oi.menu_item_id
         ORDER BY sold DESC
         LIMIT ?2",
    )?;

    let top_items = stmt
        .query_map(rusqlite::params![date, TOP_ITEMS_LIMIT], |row| {
            Ok(TopItem {
                menu_item_id: row.get(0)?,
                name: row.get(1)?,
                quantity_sold: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DashboardSummary {
        date: date.to_string(),
        total_orders,
        total_revenue,
        status_counts,
        top_items,
    })
}

pub async fn summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardSummary>, AppError> {
    let date = query.date.unwrap_or_else(local_today);
    validate_date("date", &date)?;

    let conn = state.db.conn()?;
    let summary = day_summary(&conn, &date)?;

    Ok(Json(summary))
}
