use axum::{
    extract::{Request, State},
    http::header::{COOKIE, SET_COOKIE},
    http::HeaderMap,
    middleware::Next,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Json,
};
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{AdminUser, LoginRequest};
use crate::state::AppState;

/// Identical for unknown usernames and wrong passwords so the response
/// cannot be used to enumerate accounts.
const LOGIN_FAILED: &str = "Invalid username or password";

/// Page prefixes that require a session cookie.
const PROTECTED_PREFIXES: &[&str] = &["/dashboard", "/expenses", "/attendance", "/wages"];

pub fn password_digest(password: &str) -> String {
    // Unsalted SHA-256, kept as-is from the system this replaces; see the
    // known-weakness note in the project docs before changing it.
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn verify_login(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Result<AdminUser, AppError> {
    let row: Option<(i64, String, String)> = conn
        .query_row(
            "SELECT id, username, password_hash FROM admin_users WHERE username = ?1",
            [username],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((id, username, password_hash)) = row else {
        return Err(AppError::Unauthorized(LOGIN_FAILED.to_string()));
    };

    if password_digest(password) != password_hash {
        return Err(AppError::Unauthorized(LOGIN_FAILED.to_string()));
    }

    Ok(AdminUser { id, username })
}

fn session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes[..]);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.username.trim().is_empty() {
        return Err(AppError::Validation("Missing username".to_string()));
    }
    if req.password.is_empty() {
        return Err(AppError::Validation("Missing password".to_string()));
    }

    let user = {
        let conn = state.db.conn()?;
        verify_login(&conn, &req.username, &req.password)?
    };

    tracing::info!(username = %user.username, "admin logged in");

    let cookie = format!(
        "session={}; HttpOnly; Path=/; SameSite=Lax",
        session_token()
    );

    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Json(user)))
}

pub async fn logout() -> impl IntoResponse {
    let cookie = "session=; HttpOnly; Path=/; Max-Age=0".to_string();

    (
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(json!({ "success": true })),
    )
}

pub fn is_protected(path: &str) -> bool {
    PROTECTED_PREFIXES
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
}

pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;

    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "session").then(|| value.to_string())
    })
}

/// Cookie-presence gate over the back-office page prefixes. This checks only
/// that a non-empty `session` cookie exists; the token is never validated
/// against a server-side store. Documented behavior of the system this
/// replaces, carried over unchanged.
pub async fn session_gate(req: Request, next: Next) -> Response {
    if is_protected(req.uri().path()) {
        let has_session = session_cookie(req.headers()).is_some_and(|v| !v.is_empty());

        if !has_session {
            return Redirect::to("/login").into_response();
        }
    }

    next.run(req).await
}
