use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of the `rs485` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Rs485Reading {
    pub id: i64,
    pub slave_id: i64,
    pub data: f64,
    pub unix_timestamp: i64,
}
