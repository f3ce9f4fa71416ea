use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::IdQuery;
use crate::error::AppError;
use crate::models::{
    validate_amount, validate_date, CreateWagePayment, StaffTotal, WagePayment, WageReport,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WageQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn staff_exists(conn: &Connection, staff_id: i64) -> Result<bool, AppError> {
    let row: Option<i64> = conn
        .query_row("SELECT id FROM staff WHERE id = ?1", [staff_id], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(row.is_some())
}

pub fn list_wages(
    conn: &Connection,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<WageReport, AppError> {
    if let Some(start) = start_date {
        validate_date("startDate", start)?;
    }
    if let Some(end) = end_date {
        validate_date("endDate", end)?;
    }

    let start = start_date.unwrap_or("0000-01-01");
    let end = end_date.unwrap_or("9999-12-31");

    let mut stmt = conn.prepare(
        "SELECT w.id, w.staff_id, s.name, w.date, w.amount, w.notes, w.created_at
         FROM wage_payments w
         LEFT JOIN staff s ON w.staff_id = s.id
         WHERE w.date >= ?1 AND w.date <= ?2
         ORDER BY w.date, w.id",
    )?;

    let payments = stmt
        .query_map([start, end], |row| {
            Ok(WagePayment {
                id: row.get(0)?,
                staff_id: row.get(1)?,
                staff_name: row.get(2)?,
                date: row.get(3)?,
                amount: row.get(4)?,
                notes: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // Per-staff totals computed here rather than stored, preserving insertion
    // order of first payment per staff member
    let mut staff_totals: Vec<StaffTotal> = Vec::new();
    let mut grand_total = 0;

    for payment in &payments {
        grand_total += payment.amount;

        match staff_totals
            .iter_mut()
            .find(|t| t.staff_id == payment.staff_id)
        {
            Some(entry) => entry.total += payment.amount,
            None => staff_totals.push(StaffTotal {
                staff_id: payment.staff_id,
                staff_name: payment.staff_name.clone(),
                total: payment.amount,
            }),
        }
    }

    Ok(WageReport {
        payments,
        staff_totals,
        grand_total,
    })
}

pub fn insert_wage(conn: &Connection, req: &CreateWagePayment) -> Result<WagePayment, AppError> {
    validate_date("date", &req.date)?;
    validate_amount("amount", req.amount)?;

    if !staff_exists(conn, req.staff_id)? {
        return Err(AppError::NotFound("Staff member not found".to_string()));
    }

    conn.execute(
        "INSERT INTO wage_payments (staff_id, date, amount, notes) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![req.staff_id, req.date, req.amount, req.notes],
    )?;

    let id = conn.last_insert_rowid();

    let payment = conn.query_row(
        "SELECT w.id, w.staff_id, s.name, w.date, w.amount, w.notes, w.created_at
         FROM wage_payments w
         LEFT JOIN staff s ON w.staff_id = s.id
         WHERE w.id = ?1",
        [id],
        |row| {
            Ok(WagePayment {
                id: row.get(0)?,
                staff_id: row.get(1)?,
                staff_name: row.get(2)?,
                date: row.get(3)?,
                amount: row.get(4)?,
                notes: row.get(5)?,
                created_at: row.get(6)?,
            })
        },
    )?;

    Ok(payment)
}

pub fn delete_wage(conn: &Connection, id: i64) -> Result<(), AppError> {
    let changed = conn.execute("DELETE FROM wage_payments WHERE id = ?1", [id])?;

    if changed == 0 {
        return Err(AppError::NotFound("Wage payment not found".to_string()));
    }

    Ok(())
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WageQuery>,
) -> Result<Json<WageReport>, AppError> {
    let conn = state.db.conn()?;
    let report = list_wages(&conn, query.start_date.as_deref(), query.end_date.as_deref())?;

    Ok(Json(report))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateWagePayment>,
) -> Result<(StatusCode, Json<WagePayment>), AppError> {
    let conn = state.db.conn()?;
    let payment = insert_wage(&conn, &req)?;

    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = query.require()?;

    let conn = state.db.conn()?;
    delete_wage(&conn, id)?;

    Ok(Json(json!({ "success": true })))
}
