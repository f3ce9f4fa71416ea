use serde::Deserialize;

pub mod attendance;
pub mod balance;
pub mod dashboard;
pub mod expenses;
pub mod menu;
pub mod orders;
pub mod staff;
pub mod stream;
pub mod wages;

/// `?id=` query used by the delete endpoints.
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<i64>,
}

impl IdQuery {
    pub fn require(&self) -> Result<i64, crate::error::AppError> {
        self.id
            .ok_or_else(|| crate::error::AppError::Validation("Missing id".to_string()))
    }
}
