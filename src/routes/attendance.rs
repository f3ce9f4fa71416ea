use axum::{
    extract::{Query, State},
    Json,
};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::IdQuery;
use crate::error::AppError;
use crate::models::{
    validate_date, AttendanceRecord, AttendanceReport, AttendanceStatus, AttendanceUpdate,
    UpsertAttendance,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub staff_id: Option<i64>,
    pub date: Option<String>,
}

const RECORD_SELECT: &str =
    "SELECT a.id, a.staff_id, s.name, a.date, a.status, a.created_at
     FROM attendance a
     LEFT JOIN staff s ON a.staff_id = s.id";

fn map_record(row: &rusqlite::Row) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: row.get(0)?,
        staff_id: row.get(1)?,
        staff_name: row.get(2)?,
        date: row.get(3)?,
        status: row
            .get::<_, String>(4)
            .map(|s| AttendanceStatus::parse(&s).unwrap_or(AttendanceStatus::Absent))?,
        created_at: row.get(5)?,
    })
}

fn parse_status(value: &str) -> Result<AttendanceStatus, AppError> {
    AttendanceStatus::parse(value)
        .ok_or_else(|| AppError::Validation(format!("Invalid attendance status: {value}")))
}

fn require_staff(conn: &Connection, staff_id: i64) -> Result<(), AppError> {
    let row: Option<i64> = conn
        .query_row("SELECT id FROM staff WHERE id = ?1", [staff_id], |row| {
            row.get(0)
        })
        .optional()?;

    row.map(|_| ())
        .ok_or_else(|| AppError::NotFound("Staff member not found".to_string()))
}

pub fn list_range(
    conn: &Connection,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<AttendanceReport, AppError> {
    if let Some(start) = start_date {
        validate_date("startDate", start)?;
    }
    if let Some(end) = end_date {
        validate_date("endDate", end)?;
    }

    let staff = super::staff::list_staff(conn, false)?;

    let start = start_date.unwrap_or("0000-01-01");
    let end = end_date.unwrap_or("9999-12-31");

    let mut stmt = conn.prepare(&format!(
        "{RECORD_SELECT} WHERE a.date >= ?1 AND a.date <= ?2 ORDER BY a.date, a.staff_id"
    ))?;

    let records = stmt
        .query_map([start, end], map_record)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AttendanceReport { staff, records })
}

/// `?staffId` and `?date` together ask for one record; neither means a
/// range listing. A half-specified pair names the missing parameter
/// instead of quietly degrading into the full listing.
pub fn single_record_key<'a>(
    staff_id: Option<i64>,
    date: Option<&'a str>,
) -> Result<Option<(i64, &'a str)>, AppError> {
    match (staff_id, date) {
        (Some(staff_id), Some(date)) => Ok(Some((staff_id, date))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(AppError::Validation(
            "Missing date: single-record lookup needs both staffId and date".to_string(),
        )),
        (None, Some(_)) => Err(AppError::Validation(
            "Missing staffId: single-record lookup needs both staffId and date".to_string(),
        )),
    }
}

pub fn find_record(
    conn: &Connection,
    staff_id: i64,
    date: &str,
) -> Result<AttendanceRecord, AppError> {
    validate_date("date", date)?;
    require_staff(conn, staff_id)?;

    let record = conn
        .query_row(
            &format!("{RECORD_SELECT} WHERE a.staff_id = ?1 AND a.date = ?2"),
            rusqlite::params![staff_id, date],
            map_record,
        )
        .optional()?;

    record.ok_or_else(|| AppError::NotFound("Attendance record not found".to_string()))
}

/// Upsert keyed on (staff_id, date): the pair is looked up first and an
/// existing row is updated in place, which is what keeps the
/// one-record-per-pair invariant — the table itself has no constraint.
pub fn upsert_record(conn: &Connection, req: &UpsertAttendance) -> Result<AttendanceRecord, AppError> {
    validate_date("date", &req.date)?;
    let status = parse_status(&req.status)?;
    require_staff(conn, req.staff_id)?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM attendance WHERE staff_id = ?1 AND date = ?2",
            rusqlite::params![req.staff_id, req.date],
            |row| row.get(0),
        )
        .optional()?;

    let id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE attendance SET status = ?1 WHERE id = ?2",
                rusqlite::params![status.as_str(), id],
            )?;
            id
        }
        None => {
            conn.execute(
                "INSERT INTO attendance (staff_id, date, status) VALUES (?1, ?2, ?3)",
                rusqlite::params![req.staff_id, req.date, status.as_str()],
            )?;
            conn.last_insert_rowid()
        }
    };

    let record = conn.query_row(
        &format!("{RECORD_SELECT} WHERE a.id = ?1"),
        [id],
        map_record,
    )?;

    Ok(record)
}

pub fn update_record(conn: &Connection, req: &AttendanceUpdate) -> Result<AttendanceRecord, AppError> {
    let status = parse_status(&req.status)?;

    let changed = conn.execute(
        "UPDATE attendance SET status = ?1 WHERE id = ?2",
        rusqlite::params![status.as_str(), req.id],
    )?;

    if changed == 0 {
        return Err(AppError::NotFound(
            "Attendance record not found".to_string(),
        ));
    }

    let record = conn.query_row(
        &format!("{RECORD_SELECT} WHERE a.id = ?1"),
        [req.id],
        map_record,
    )?;

    Ok(record)
}

pub fn delete_record(conn: &Connection, id: i64) -> Result<(), AppError> {
    let changed = conn.execute("DELETE FROM attendance WHERE id = ?1", [id])?;

    if changed == 0 {
        return Err(AppError::NotFound(
            "Attendance record not found".to_string(),
        ));
    }

    Ok(())
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AttendanceQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let conn = state.db.conn()?;

    if let Some((staff_id, date)) = single_record_key(query.staff_id, query.date.as_deref())? {
        let record = find_record(&conn, staff_id, date)?;
        return Ok(Json(serde_json::to_value(record)?));
    }

    let report = list_range(
        &conn,
        query.start_date.as_deref(),
        query.end_date.as_deref(),
    )?;

    Ok(Json(serde_json::to_value(report)?))
}

pub async fn upsert(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpsertAttendance>,
) -> Result<Json<AttendanceRecord>, AppError> {
    let conn = state.db.conn()?;
    let record = upsert_record(&conn, &req)?;

    Ok(Json(record))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AttendanceUpdate>,
) -> Result<Json<AttendanceRecord>, AppError> {
    let conn = state.db.conn()?;
    let record = update_record(&conn, &req)?;

    Ok(Json(record))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = query.require()?;

    let conn = state.db.conn()?;
    delete_record(&conn, id)?;

    Ok(Json(json!({ "success": true })))
}
