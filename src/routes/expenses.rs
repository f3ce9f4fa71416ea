use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::IdQuery;
use crate::error::AppError;
use crate::models::{
    validate_amount, validate_date, CreateExpense, Expense, ExpenseCategory, ExpenseReport,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub category: Option<String>,
}

/// Inclusive date-range listing; totals are summed at read time, never stored.
pub fn list_expenses(
    conn: &Connection,
    start_date: Option<&str>,
    end_date: Option<&str>,
    category: Option<&str>,
) -> Result<ExpenseReport, AppError> {
    if let Some(start) = start_date {
        validate_date("startDate", start)?;
    }
    if let Some(end) = end_date {
        validate_date("endDate", end)?;
    }
    if let Some(category) = category {
        if ExpenseCategory::parse(category).is_none() {
            return Err(AppError::Validation(format!(
                "Invalid category: {category}"
            )));
        }
    }

    let start = start_date.unwrap_or("0000-01-01");
    let end = end_date.unwrap_or("9999-12-31");

    let mut stmt = conn.prepare(
        "SELECT id, date, category, description, amount, created_at
         FROM expenses
         WHERE date >= ?1 AND date <= ?2 AND (?3 IS NULL OR category = ?3)
         ORDER BY date, id",
    )?;

    let expenses = stmt
        .query_map(rusqlite::params![start, end, category], |row| {
            Ok(Expense {
                id: row.get(0)?,
                date: row.get(1)?,
                category: row.get(2)?,
                description: row.get(3)?,
                amount: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut category_totals: BTreeMap<String, i64> = BTreeMap::new();
    let mut grand_total = 0;

    for expense in &expenses {
        *category_totals.entry(expense.category.clone()).or_insert(0) += expense.amount;
        grand_total += expense.amount;
    }

    Ok(ExpenseReport {
        expenses,
        category_totals,
        grand_total,
    })
}

pub fn insert_expense(conn: &Connection, req: &CreateExpense) -> Result<Expense, AppError> {
    validate_date("date", &req.date)?;
    validate_amount("amount", req.amount)?;

    if ExpenseCategory::parse(&req.category).is_none() {
        return Err(AppError::Validation(format!(
            "Invalid category: {}",
            req.category
        )));
    }

    conn.execute(
        "INSERT INTO expenses (date, category, description, amount) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![req.date, req.category, req.description, req.amount],
    )?;

    let id = conn.last_insert_rowid();

    let expense = conn.query_row(
        "SELECT id, date, category, description, amount, created_at FROM expenses WHERE id = ?1",
        [id],
        |row| {
            Ok(Expense {
                id: row.get(0)?,
                date: row.get(1)?,
                category: row.get(2)?,
                description: row.get(3)?,
                amount: row.get(4)?,
                created_at: row.get(5)?,
            })
        },
    )?;

    Ok(expense)
}

pub fn delete_expense(conn: &Connection, id: i64) -> Result<(), AppError> {
    let changed = conn.execute("DELETE FROM expenses WHERE id = ?1", [id])?;

    if changed == 0 {
        return Err(AppError::NotFound("Expense not found".to_string()));
    }

    Ok(())
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExpenseQuery>,
) -> Result<Json<ExpenseReport>, AppError> {
    let conn = state.db.conn()?;
    let report = list_expenses(
        &conn,
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        query.category.as_deref(),
    )?;

    Ok(Json(report))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateExpense>,
) -> Result<(StatusCode, Json<Expense>), AppError> {
    let conn = state.db.conn()?;
    let expense = insert_expense(&conn, &req)?;

    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = query.require()?;

    let conn = state.db.conn()?;
    delete_expense(&conn, id)?;

    Ok(Json(json!({ "success": true })))
}
