use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use rusqlite::Connection;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{validate_amount, CreateMenuItem, MenuItem, UpdateMenuItem};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MenuQuery {
    pub available: Option<bool>,
}

fn map_item(row: &rusqlite::Row) -> rusqlite::Result<MenuItem> {
    Ok(MenuItem {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        price: row.get(3)?,
        available: row.get(4)?,
        position: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn list_items(conn: &Connection, available_only: bool) -> Result<Vec<MenuItem>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, price, available, position, created_at
         FROM menu_items
         WHERE available = 1 OR NOT ?1
         ORDER BY position, name",
    )?;

    let items = stmt
        .query_map([available_only], map_item)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

pub fn insert_item(conn: &Connection, req: &CreateMenuItem) -> Result<MenuItem, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Missing item name".to_string()));
    }
    if req.category.trim().is_empty() {
        return Err(AppError::Validation("Missing item category".to_string()));
    }
    validate_amount("price", req.price)?;

    conn.execute(
        "INSERT INTO menu_items (name, category, price, position) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![req.name, req.category, req.price, req.position.unwrap_or(0)],
    )?;

    let id = conn.last_insert_rowid();

    let item = conn.query_row(
        "SELECT id, name, category, price, available, position, created_at
         FROM menu_items WHERE id = ?1",
        [id],
        map_item,
    )?;

    Ok(item)
}

/// Partial update; unspecified fields keep their stored values. Items are
/// never deleted, only flipped unavailable, so old orders keep their names.
pub fn update_item(conn: &Connection, req: &UpdateMenuItem) -> Result<MenuItem, AppError> {
    if let Some(price) = req.price {
        validate_amount("price", price)?;
    }

    let changed = conn.execute(
        "UPDATE menu_items SET
             name = COALESCE(?1, name),
             category = COALESCE(?2, category),
             price = COALESCE(?3, price),
             available = COALESCE(?4, available),
             position = COALESCE(?5, position)
         WHERE id = ?6",
        rusqlite::params![
            req.name,
            req.category,
            req.price,
            req.available,
            req.position,
            req.id
        ],
    )?;

    if changed == 0 {
        return Err(AppError::NotFound("Menu item not found".to_string()));
    }

    let item = conn.query_row(
        "SELECT id, name, category, price, available, position, created_at
         FROM menu_items WHERE id = ?1",
        [req.id],
        map_item,
    )?;

    Ok(item)
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MenuQuery>,
) -> Result<Json<Vec<MenuItem>>, AppError> {
    let conn = state.db.conn()?;
    let items = list_items(&conn, query.available.unwrap_or(false))?;

    Ok(Json(items))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMenuItem>,
) -> Result<(StatusCode, Json<MenuItem>), AppError> {
    let conn = state.db.conn()?;
    let item = insert_item(&conn, &req)?;

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateMenuItem>,
) -> Result<Json<MenuItem>, AppError> {
    let conn = state.db.conn()?;
    let item = update_item(&conn, &req)?;

    Ok(Json(item))
}
