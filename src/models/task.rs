//! Modelo de Task (tarea de vuelo)
//!
//! Mapea la tabla `dr_flight_task`. El estado solo avanza:
//! Queued → Running → Completed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// Estado de la tarea - mapea al SMALLINT `dr_flight_task.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(into = "i16", try_from = "i16")]
#[repr(i16)]
pub enum TaskStatus {
    Queued = 1,
    Running = 2,
    Completed = 3,
    /// Código reservado, sin semántica definida; el motor no lo escribe ni lo lee
    Reserved4 = 4,
    /// Código reservado, sin semántica definida; el motor no lo escribe ni lo lee
    Reserved5 = 5,
}

impl From<TaskStatus> for i16 {
    fn from(status: TaskStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i16> for TaskStatus {
    type Error = String;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        TaskStatus::from_code(code).ok_or_else(|| format!("unknown status code {}", code))
    }
}

impl TaskStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(TaskStatus::Queued),
            2 => Some(TaskStatus::Running),
            3 => Some(TaskStatus::Completed),
            4 => Some(TaskStatus::Reserved4),
            5 => Some(TaskStatus::Reserved5),
            _ => None,
        }
    }

    /// Transiciones que el motor puede aplicar
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Running) | (TaskStatus::Running, TaskStatus::Completed)
        )
    }
}

/// Task principal - mapea la tabla `dr_flight_task`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub task_name: String,
    pub vehicle_id: i64,
    pub route_id: i64,
    pub operator_id: Option<i64>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Datos para insertar una tarea nueva
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_name: String,
    pub vehicle_id: i64,
    pub route_id: i64,
    pub operator_id: Option<i64>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Registro de despacho para listados (tarea + nombres de vehículo y ruta)
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRecord {
    pub id: i64,
    pub task_name: String,
    pub vehicle_id: i64,
    pub vehicle_name: Option<String>,
    pub route_id: i64,
    pub route_name: Option<String>,
    pub expect_complete_time: Option<Decimal>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Filtros del listado de despachos
#[derive(Debug, Clone, Default)]
pub struct DispatchRecordFilter {
    pub status: Option<TaskStatus>,
    pub vehicle_id: Option<i64>,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_monotonic() {
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Queued));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Reserved4));
    }

    #[test]
    fn test_reserved_codes_are_kept() {
        assert_eq!(TaskStatus::from_code(4), Some(TaskStatus::Reserved4));
        assert_eq!(TaskStatus::from_code(5), Some(TaskStatus::Reserved5));
        assert_eq!(TaskStatus::from_code(6), None);
    }
}
