//! Sistema de manejo de errores
//!
//! Este módulo define los errores del almacenamiento, del motor de despacho
//! y su conversión a respuestas HTTP apropiadas.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// SQLSTATE: serialization_failure
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE: deadlock_detected
const SQLSTATE_DEADLOCK: &str = "40P01";
/// SQLSTATE: lock_not_available (lock_timeout)
const SQLSTATE_LOCK_NOT_AVAILABLE: &str = "55P03";

/// Errores del almacenamiento relacional
#[derive(Error, Debug)]
pub enum StoreError {
    /// Contención del motor (deadlock, serialización, lock timeout). Se reintenta en el próximo tick/llamada.
    #[error("Retryable storage contention: {0}")]
    Retryable(String),

    #[error("Storage fault: {0}")]
    Fault(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Retryable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(SQLSTATE_SERIALIZATION_FAILURE)
                | Some(SQLSTATE_DEADLOCK)
                | Some(SQLSTATE_LOCK_NOT_AVAILABLE) => StoreError::Retryable(e.to_string()),
                _ => StoreError::Fault(e.to_string()),
            },
            sqlx::Error::PoolTimedOut => StoreError::Retryable(e.to_string()),
            _ => StoreError::Fault(e.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Fault(e.to_string())
    }
}

/// Ventana temporal fuera del rango representable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Time window out of range: {0}")]
pub struct ScheduleError(pub String);

impl From<ScheduleError> for StoreError {
    fn from(e: ScheduleError) -> Self {
        StoreError::Fault(e.to_string())
    }
}

/// Errores del motor de despacho
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Culpa del llamador: id inválido, vehículo inexistente o estado no despachable
    #[error("{0}")]
    Validation(String),

    /// Una actualización condicional afectó cero filas: otro actor ganó la carrera
    #[error("Route {route_id} was claimed by another actor")]
    Contention { route_id: i64 },

    /// Datos inconsistentes (p.ej. vehículo en ejecución sin tarea o ruta asociada)
    #[error("Inconsistent data: {0}")]
    Consistency(String),

    #[error("No route is free or running")]
    NoRouteAvailable,

    #[error(transparent)]
    Transaction(#[from] StoreError),
}

impl From<ScheduleError> for DispatchError {
    fn from(e: ScheduleError) -> Self {
        DispatchError::Transaction(e.into())
    }
}

impl DispatchError {
    /// Fallos que abortan la transacción completa (lote incluido)
    pub fn is_transactional(&self) -> bool {
        matches!(self, DispatchError::Transaction(_))
    }
}

/// Errores principales de la aplicación (frontera HTTP)
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Storage(e)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Validation(msg) => AppError::BadRequest(msg),
            DispatchError::Transaction(store) => AppError::Storage(store),
            other @ (DispatchError::Consistency(_)
            | DispatchError::NoRouteAvailable
            | DispatchError::Contention { .. }) => AppError::Conflict(other.to_string()),
        }
    }
}

/// Respuesta de error para la API
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            AppError::Storage(StoreError::Retryable(msg)) => {
                log::warn!("Storage contention: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse {
                        error: "Storage Busy".to_string(),
                        message: "The store is busy, please retry".to_string(),
                        details: None,
                        code: "STORAGE_RETRYABLE".to_string(),
                    },
                )
            }

            AppError::Storage(StoreError::Fault(msg)) => {
                log::error!("Storage fault: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "Database Error".to_string(),
                        message: "An error occurred while accessing the database".to_string(),
                        details: None,
                        code: "DB_ERROR".to_string(),
                    },
                )
            }

            AppError::Validation(e) => {
                log::info!("Validation error: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        error: "Validation Error".to_string(),
                        message: "The provided data is invalid".to_string(),
                        details: serde_json::to_value(&e).ok(),
                        code: "VALIDATION_ERROR".to_string(),
                    },
                )
            }

            AppError::BadRequest(msg) => {
                log::info!("Bad request: {}", msg);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        error: "Bad Request".to_string(),
                        message: msg,
                        details: None,
                        code: "BAD_REQUEST".to_string(),
                    },
                )
            }

            AppError::Conflict(msg) => {
                log::warn!("Conflict: {}", msg);
                (
                    StatusCode::CONFLICT,
                    ErrorResponse {
                        error: "Conflict".to_string(),
                        message: msg,
                        details: None,
                        code: "CONFLICT".to_string(),
                    },
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Resultado tipado para operaciones que pueden fallar
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_row_not_found_is_fault() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_dispatch_error_status_mapping() {
        let resp = AppError::from(DispatchError::Validation("vehicle disabled".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AppError::from(DispatchError::Consistency("no task".into())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = AppError::from(DispatchError::NoRouteAvailable).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = AppError::from(DispatchError::Transaction(StoreError::Retryable("deadlock".into())))
            .into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = AppError::from(DispatchError::Transaction(StoreError::Fault("disk".into())))
            .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_only_store_errors_are_transactional() {
        assert!(DispatchError::Transaction(StoreError::Fault("x".into())).is_transactional());
        assert!(!DispatchError::NoRouteAvailable.is_transactional());
        assert!(!DispatchError::Contention { route_id: 1 }.is_transactional());
    }
}
