use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::{DispatchRecordFilter, FlightLogFilter, TaskStatus};
use crate::utils::errors::AppError;

/// Tamaño máximo de un lote de despacho
pub const MAX_BATCH_SIZE: usize = 200;

const DEFAULT_PAGE_SIZE: u32 = 10;

// Response genérica
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
            data: Some(data),
        }
    }
}

// Request para despachar un vehículo
#[derive(Debug, Deserialize, Validate)]
pub struct DispatchRequest {
    #[validate(range(min = 1))]
    pub id: i64,
}

// Request para despachar varios vehículos en una transacción
#[derive(Debug, Deserialize, Validate)]
pub struct DispatchBatchRequest {
    #[validate(custom = "validate_batch_size")]
    pub ids: Vec<i64>,
}

fn validate_batch_size(ids: &Vec<i64>) -> Result<(), ValidationError> {
    if ids.is_empty() || ids.len() > MAX_BATCH_SIZE {
        let mut err = ValidationError::new("length");
        err.add_param("min".into(), &1);
        err.add_param("max".into(), &MAX_BATCH_SIZE);
        err.add_param("value".into(), &ids.len());
        return Err(err);
    }
    Ok(())
}

// Query de GET /getDispatch
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<i16>,
    pub vehicle_id: Option<i64>,
}

impl DispatchListQuery {
    pub fn into_filter(self) -> Result<DispatchRecordFilter, AppError> {
        let status = match self.status {
            Some(code) => Some(
                TaskStatus::from_code(code)
                    .ok_or_else(|| AppError::BadRequest(format!("Unknown task status {}", code)))?,
            ),
            None => None,
        };

        Ok(DispatchRecordFilter {
            status,
            vehicle_id: self.vehicle_id,
            page: self.page.unwrap_or(1),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }
}

// Query de GET /getFlightLogs
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightLogListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub task_id: Option<i64>,
}

impl From<FlightLogListQuery> for FlightLogFilter {
    fn from(q: FlightLogListQuery) -> Self {
        FlightLogFilter {
            task_id: q.task_id,
            page: q.page.unwrap_or(1),
            page_size: q.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }
}
