pub mod config;
pub mod coupons;
pub mod orders;

use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("duplicate key {0}")]
    DuplicateKey(String),

    #[error("record {0} not found")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(key) => AppError::Conflict(format!("{key} already exists")),
            StoreError::NotFound(key) => AppError::NotFound(format!("{key} not found")),
            StoreError::Unavailable(msg) => AppError::Internal(msg),
        }
    }
}
