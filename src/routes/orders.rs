use axum::{extract::State, http::StatusCode, Json};
use rusqlite::{Connection, OptionalExtension, Row};
use std::sync::Arc;
use tracing::info;

use crate::error::AppError;
use crate::models::{
    CreateOrder, CreatedOrder, Order, OrderItem, OrderStatus, OrderWithItems, StatusUpdate,
};
use crate::state::AppState;

fn map_order(row: &Row) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        order_number: row.get(1)?,
        table_number: row.get(2)?,
        status: row
            .get::<_, String>(3)
            .map(|s| OrderStatus::parse(&s).unwrap_or(OrderStatus::Pending))?,
        total: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Daily-sequential human-readable number: count of orders already created
/// today (server-local day), plus one, zero-padded to three digits. The
/// count-then-insert pair is not atomic across processes; within this
/// process the shared connection mutex serializes submissions.
fn next_order_number(conn: &Connection) -> Result<String, AppError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM orders
         WHERE date(created_at, 'localtime') = date('now', 'localtime')",
        [],
        |row| row.get(0),
    )?;

    Ok(format!("{:03}", count + 1))
}

/// Order intake: the whole cart is validated and priced against the live
/// menu before anything is written, so a rejected submission persists
/// nothing. Client-supplied prices are never trusted.
pub fn insert_order(conn: &Connection, req: &CreateOrder) -> Result<CreatedOrder, AppError> {
    if req.items.is_empty() {
        return Err(AppError::Validation(
            "Order must contain at least one item".to_string(),
        ));
    }

    let mut total: i64 = 0;
    let mut priced: Vec<(&crate::models::CreateOrderItem, i64)> = Vec::new();

    for item in &req.items {
        if item.quantity < 1 {
            return Err(AppError::Validation(format!(
                "Invalid quantity for menu item {}",
                item.menu_item_id
            )));
        }

        let price: Option<i64> = conn
            .query_row(
                "SELECT price FROM menu_items WHERE id = ?1",
                [item.menu_item_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(price) = price else {
            return Err(AppError::Validation(format!(
                "Unknown menu item: {}",
                item.menu_item_id
            )));
        };

        total += price * item.quantity;
        priced.push((item, price));
    }

    let order_number = next_order_number(conn)?;

    conn.execute(
        "INSERT INTO orders (order_number, table_number, status, total) VALUES (?1, ?2, 'pending', ?3)",
        rusqlite::params![order_number, req.table_number, total],
    )?;

    let order_id = conn.last_insert_rowid();

    for (item, price) in priced {
        conn.execute(
            "INSERT INTO order_items (order_id, menu_item_id, quantity, notes, price_at_time) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![order_id, item.menu_item_id, item.quantity, item.notes, price],
        )?;
    }

    Ok(CreatedOrder {
        order_id,
        order_number,
    })
}

/// Permissive transition: any of the four states may follow any other,
/// including backwards (the kitchen display reverses `served` as an undo).
pub fn update_status(conn: &Connection, req: &StatusUpdate) -> Result<Order, AppError> {
    let Some(status) = OrderStatus::parse(&req.status) else {
        return Err(AppError::Validation(format!(
            "Invalid status: {}",
            req.status
        )));
    };

    let changed = conn.execute(
        "UPDATE orders SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
        rusqlite::params![status.as_str(), req.order_id],
    )?;

    if changed == 0 {
        return Err(AppError::NotFound("Order not found".to_string()));
    }

    get_order(conn, req.order_id)
}

pub fn get_order(conn: &Connection, id: i64) -> Result<Order, AppError> {
    let order = conn
        .query_row(
            "SELECT id, order_number, table_number, status, total, created_at, updated_at
             FROM orders WHERE id = ?1",
            [id],
            map_order,
        )
        .optional()?;

    order.ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}

fn order_items(conn: &Connection, order_id: i64) -> Result<Vec<OrderItem>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT oi.id, oi.order_id, oi.menu_item_id, m.name, oi.quantity, oi.notes, oi.price_at_time
         FROM order_items oi
         LEFT JOIN menu_items m ON oi.menu_item_id = m.id
         WHERE oi.order_id = ?1
         ORDER BY oi.id",
    )?;

    let items = stmt
        .query_map([order_id], |row| {
            Ok(OrderItem {
                id: row.get(0)?,
                order_id: row.get(1)?,
                menu_item_id: row.get(2)?,
                menu_item_name: row.get(3)?,
                quantity: row.get(4)?,
                notes: row.get(5)?,
                price_at_time: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

/// Today's orders with their line items and menu names. Also the snapshot
/// the live feed serializes, so the ordering must be deterministic.
pub fn today_orders(conn: &Connection) -> Result<Vec<OrderWithItems>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, order_number, table_number, status, total, created_at, updated_at
         FROM orders
         WHERE date(created_at, 'localtime') = date('now', 'localtime')
         ORDER BY created_at, id",
    )?;

    let orders = stmt
        .query_map([], map_order)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut result = Vec::new();

    for order in orders {
        let items = order_items(conn, order.id)?;
        result.push(OrderWithItems { order, items });
    }

    Ok(result)
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrder>,
) -> Result<(StatusCode, Json<CreatedOrder>), AppError> {
    let conn = state.db.conn()?;
    let created = insert_order(&conn, &req)?;

    info!(order_number = %created.order_number, "order created");

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn patch_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<Order>, AppError> {
    let conn = state.db.conn()?;
    let order = update_status(&conn, &req)?;

    Ok(Json(order))
}

pub async fn list_today(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OrderWithItems>>, AppError> {
    let conn = state.db.conn()?;
    let orders = today_orders(&conn)?;

    Ok(Json(orders))
}
