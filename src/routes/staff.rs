use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::IdQuery;
use crate::error::AppError;
use crate::models::{CreateStaff, Staff};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StaffQuery {
    pub all: Option<bool>,
}

fn map_staff(row: &rusqlite::Row) -> rusqlite::Result<Staff> {
    Ok(Staff {
        id: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        active: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn list_staff(conn: &Connection, include_inactive: bool) -> Result<Vec<Staff>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, role, active, created_at FROM staff
         WHERE active = 1 OR ?1
         ORDER BY name",
    )?;

    let staff = stmt
        .query_map([include_inactive], map_staff)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(staff)
}

pub fn insert_staff(conn: &Connection, req: &CreateStaff) -> Result<Staff, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Missing staff name".to_string()));
    }

    conn.execute(
        "INSERT INTO staff (name, role) VALUES (?1, ?2)",
        rusqlite::params![req.name, req.role],
    )?;

    let id = conn.last_insert_rowid();

    let staff = conn.query_row(
        "SELECT id, name, role, active, created_at FROM staff WHERE id = ?1",
        [id],
        map_staff,
    )?;

    Ok(staff)
}

/// Soft delete: the row stays so historical wages and attendance keep
/// resolving to a name.
pub fn deactivate_staff(conn: &Connection, id: i64) -> Result<(), AppError> {
    let changed = conn.execute("UPDATE staff SET active = 0 WHERE id = ?1", [id])?;

    if changed == 0 {
        return Err(AppError::NotFound("Staff member not found".to_string()));
    }

    Ok(())
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StaffQuery>,
) -> Result<Json<Vec<Staff>>, AppError> {
    let conn = state.db.conn()?;
    let staff = list_staff(&conn, query.all.unwrap_or(false))?;

    Ok(Json(staff))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateStaff>,
) -> Result<(StatusCode, Json<Staff>), AppError> {
    let conn = state.db.conn()?;
    let staff = insert_staff(&conn, &req)?;

    Ok((StatusCode::CREATED, Json(staff)))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = query.require()?;

    let conn = state.db.conn()?;
    deactivate_staff(&conn, id)?;

    Ok(Json(json!({ "success": true })))
}
