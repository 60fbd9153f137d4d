//! Modelo de Vehicle
//!
//! Mapea la tabla `dr_vehicle`. El estado se persiste como SMALLINT.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::utils::geo::GeoPoint;

/// Estado del vehículo - mapea al SMALLINT `dr_vehicle.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(into = "i16", try_from = "i16")]
#[repr(i16)]
pub enum VehicleStatus {
    Idle = 1,
    Running = 2,
    Disabled = 3,
    Maintenance = 4,
    Queued = 5,
}

impl From<VehicleStatus> for i16 {
    fn from(status: VehicleStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i16> for VehicleStatus {
    type Error = String;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        VehicleStatus::from_code(code).ok_or_else(|| format!("unknown status code {}", code))
    }
}

impl VehicleStatus {
    /// Estados fijados por administración; el motor nunca los sobrescribe
    pub const AUTHORITATIVE: [VehicleStatus; 2] = [VehicleStatus::Disabled, VehicleStatus::Maintenance];

    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(VehicleStatus::Idle),
            2 => Some(VehicleStatus::Running),
            3 => Some(VehicleStatus::Disabled),
            4 => Some(VehicleStatus::Maintenance),
            5 => Some(VehicleStatus::Queued),
            _ => None,
        }
    }

    pub fn is_authoritative(self) -> bool {
        Self::AUTHORITATIVE.contains(&self)
    }

    /// Solo vehículos en reposo o en ejecución admiten un despacho nuevo
    pub fn is_dispatchable(self) -> bool {
        matches!(self, VehicleStatus::Idle | VehicleStatus::Running)
    }
}

/// Vehicle principal - mapea la tabla `dr_vehicle`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vehicle {
    pub id: i64,
    pub vehicle_name: String,
    pub status: VehicleStatus,
    /// Posición del nido (home)
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub operator_id: Option<i64>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Vehicle {
    /// Coordenadas del nido, si son representables como f64
    pub fn home_position(&self) -> Option<GeoPoint> {
        Some(GeoPoint::new(self.latitude.to_f64()?, self.longitude.to_f64()?))
    }
}
