//! Registro de vuelo
//!
//! Una fila por tarea completada, solo inserción.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Tipo de evento registrado al completar un vuelo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i16)]
pub enum FlightEvent {
    Nominal = 1,
    AnomalyMinor = 2,
    AnomalyMajor = 3,
    AnomalyCritical = 4,
}

impl FlightEvent {
    pub fn code(self) -> i16 {
        self as i16
    }
}

/// Fila persistida en `dr_flight_log`
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FlightLog {
    pub id: i64,
    pub task_id: i64,
    pub vehicle_id: i64,
    pub altitude: i32,
    /// m/s
    pub speed: f64,
    pub event_type: i16,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFlightLog {
    pub task_id: i64,
    pub vehicle_id: i64,
    pub altitude: i32,
    pub speed: f64,
    pub event: FlightEvent,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct FlightLogFilter {
    pub task_id: Option<i64>,
    pub page: u32,
    pub page_size: u32,
}
