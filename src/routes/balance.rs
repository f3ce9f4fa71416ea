use axum::{
    extract::{Query, State},
    Json,
};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{local_today, validate_date, DailyBalance, UpsertBalance};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub date: Option<String>,
}

fn map_balance(row: &rusqlite::Row) -> rusqlite::Result<DailyBalance> {
    Ok(DailyBalance {
        id: row.get(0)?,
        date: row.get(1)?,
        opening_balance: row.get(2)?,
        closing_balance: row.get(3)?,
        notes: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn find_balance(conn: &Connection, date: &str) -> Result<Option<DailyBalance>, AppError> {
    validate_date("date", date)?;

    let balance = conn
        .query_row(
            "SELECT id, date, opening_balance, closing_balance, notes, created_at
             FROM daily_balances WHERE date = ?1",
            [date],
            map_balance,
        )
        .optional()?;

    Ok(balance)
}

/// Upsert by date. The first insert for a date must carry the opening
/// balance; later posts patch only the fields they supply.
pub fn upsert_balance(conn: &Connection, req: &UpsertBalance) -> Result<DailyBalance, AppError> {
    validate_date("date", &req.date)?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM daily_balances WHERE date = ?1",
            [&req.date],
            |row| row.get(0),
        )
        .optional()?;

    let id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE daily_balances SET
                     opening_balance = COALESCE(?1, opening_balance),
                     closing_balance = COALESCE(?2, closing_balance),
                     notes = COALESCE(?3, notes)
                 WHERE id = ?4",
                rusqlite::params![req.opening_balance, req.closing_balance, req.notes, id],
            )?;
            id
        }
        None => {
            let Some(opening) = req.opening_balance else {
                return Err(AppError::Validation(
                    "openingBalance is required for a new date".to_string(),
                ));
            };

            conn.execute(
                "INSERT INTO daily_balances (date, opening_balance, closing_balance, notes)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![req.date, opening, req.closing_balance, req.notes],
            )?;
            conn.last_insert_rowid()
        }
    };

    let balance = conn.query_row(
        "SELECT id, date, opening_balance, closing_balance, notes, created_at
         FROM daily_balances WHERE id = ?1",
        [id],
        map_balance,
    )?;

    Ok(balance)
}

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<Option<DailyBalance>>, AppError> {
    let date = query.date.unwrap_or_else(local_today);

    let conn = state.db.conn()?;
    let balance = find_balance(&conn, &date)?;

    Ok(Json(balance))
}

pub async fn upsert(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpsertBalance>,
) -> Result<Json<DailyBalance>, AppError> {
    let conn = state.db.conn()?;
    let balance = upsert_balance(&conn, &req)?;

    Ok(Json(balance))
}
