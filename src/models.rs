use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AppError;

// ===== Status enums =====

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Served,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Served => "served",
        }
    }

    /// Any state may follow any other state (the kitchen UI uses backward
    /// jumps as an undo gesture), so parsing the literal is the only check.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "preparing" => Some(OrderStatus::Preparing),
            "ready" => Some(OrderStatus::Ready),
            "served" => Some(OrderStatus::Served),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseCategory {
    Ingredients,
    Utilities,
    Rent,
    Equipment,
    Salaries,
    Other,
}

impl ExpenseCategory {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ingredients" => Some(ExpenseCategory::Ingredients),
            "utilities" => Some(ExpenseCategory::Utilities),
            "rent" => Some(ExpenseCategory::Rent),
            "equipment" => Some(ExpenseCategory::Equipment),
            "salaries" => Some(ExpenseCategory::Salaries),
            "other" => Some(ExpenseCategory::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Leave,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Leave => "leave",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "leave" => Some(AttendanceStatus::Leave),
            _ => None,
        }
    }
}

// ===== Menu =====

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    pub category: String,
    /// Minor currency units (cents); all money in this crate is integer.
    pub price: i64,
    pub available: bool,
    pub position: i64,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMenuItem {
    pub name: String,
    pub category: String,
    pub price: i64,
    pub position: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMenuItem {
    pub id: i64,
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<i64>,
    pub available: Option<bool>,
    pub position: Option<i64>,
}

// ===== Orders =====

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub table_number: Option<i64>,
    pub status: OrderStatus,
    pub total: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub menu_item_id: i64,
    pub menu_item_name: Option<String>,
    pub quantity: i64,
    pub notes: Option<String>,
    pub price_at_time: i64,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItem {
    pub menu_item_id: i64,
    pub quantity: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    pub items: Vec<CreateOrderItem>,
    pub table_number: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order_id: i64,
    pub order_number: String,
}

/// Status carried as a plain string so a bad literal gets its own
/// validation message instead of a deserialization failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub order_id: i64,
    pub status: String,
}

// ===== Dashboard =====

#[derive(Debug, Serialize, Default, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: i64,
    pub preparing: i64,
    pub ready: i64,
    pub served: i64,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TopItem {
    pub menu_item_id: i64,
    pub name: Option<String>,
    pub quantity_sold: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub date: String,
    pub total_orders: i64,
    pub total_revenue: i64,
    pub status_counts: StatusCounts,
    pub top_items: Vec<TopItem>,
}

// ===== Expenses =====

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: i64,
    pub date: String,
    pub category: String,
    pub description: String,
    pub amount: i64,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpense {
    pub date: String,
    pub category: String,
    pub description: String,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseReport {
    pub expenses: Vec<Expense>,
    pub category_totals: BTreeMap<String, i64>,
    pub grand_total: i64,
}

// ===== Staff / wages / attendance =====

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: i64,
    pub name: String,
    pub role: Option<String>,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStaff {
    pub name: String,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WagePayment {
    pub id: i64,
    pub staff_id: i64,
    pub staff_name: Option<String>,
    pub date: String,
    pub amount: i64,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWagePayment {
    pub staff_id: i64,
    pub date: String,
    pub amount: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffTotal {
    pub staff_id: i64,
    pub staff_name: Option<String>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WageReport {
    pub payments: Vec<WagePayment>,
    pub staff_totals: Vec<StaffTotal>,
    pub grand_total: i64,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: i64,
    pub staff_id: i64,
    pub staff_name: Option<String>,
    pub date: String,
    pub status: AttendanceStatus,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertAttendance {
    pub staff_id: i64,
    pub date: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceUpdate {
    pub id: i64,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReport {
    pub staff: Vec<Staff>,
    pub records: Vec<AttendanceRecord>,
}

// ===== Daily balance =====

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DailyBalance {
    pub id: i64,
    pub date: String,
    pub opening_balance: i64,
    pub closing_balance: Option<i64>,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertBalance {
    pub date: String,
    pub opening_balance: Option<i64>,
    pub closing_balance: Option<i64>,
    pub notes: Option<String>,
}

// ===== Auth =====

/// Missing keys deserialize to empty strings so the handler's own
/// validation answers with 400, not an extractor rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
}

// ===== Shared validation =====

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

pub fn validate_date(field: &str, value: &str) -> Result<(), AppError> {
    if !DATE_RE.is_match(value) || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
        return Err(AppError::Validation(format!(
            "Invalid {field}: expected YYYY-MM-DD"
        )));
    }

    Ok(())
}

pub fn validate_amount(field: &str, value: i64) -> Result<(), AppError> {
    if value <= 0 {
        return Err(AppError::Validation(format!(
            "Invalid {field}: must be a positive amount in cents"
        )));
    }

    Ok(())
}

pub fn local_today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
