//! Modelo de Route
//!
//! Una ruta es un recurso mutuamente exclusivo: `locked` es verdadero mientras
//! exactamente una tarea en ejecución la referencia.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::geo::GeoPoint;

/// Route principal - mapea la tabla `dr_route`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Route {
    pub id: i64,
    pub route_name: String,
    pub is_active: bool,
    pub is_deleted: bool,
    pub locked: bool,
    /// Duración esperada en horas; puede faltar o ser no positiva
    pub expect_complete_time: Option<Decimal>,
    pub distance_km: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Route {
    /// Duración configurada en horas, solo si es finita y positiva
    pub fn planned_hours(&self) -> Option<f64> {
        self.expect_complete_time
            .and_then(|d| d.to_f64())
            .filter(|h| h.is_finite() && *h > 0.0)
    }

    /// Distancia almacenada en km, solo si es positiva
    pub fn stored_distance_km(&self) -> Option<f64> {
        self.distance_km
            .and_then(|d| d.to_f64())
            .filter(|km| km.is_finite() && *km > 0.0)
    }

    pub fn is_candidate(&self) -> bool {
        self.is_active && !self.is_deleted && !self.locked
    }
}

/// Punto de ruta - `point_index` 0 es el inicio, el máximo es el final
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoutePoint {
    pub route_id: i64,
    pub point_index: i32,
    pub lat: Decimal,
    pub lng: Decimal,
    pub name: Option<String>,
}

impl RoutePoint {
    pub fn position(&self) -> Option<GeoPoint> {
        Some(GeoPoint::new(self.lat.to_f64()?, self.lng.to_f64()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(hours: Option<Decimal>) -> Route {
        Route {
            id: 1,
            route_name: "R1".to_string(),
            is_active: true,
            is_deleted: false,
            locked: false,
            expect_complete_time: hours,
            distance_km: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_planned_hours_filters_non_positive() {
        assert_eq!(route(Some(Decimal::new(15, 1))).planned_hours(), Some(1.5));
        assert_eq!(route(Some(Decimal::ZERO)).planned_hours(), None);
        assert_eq!(route(Some(Decimal::new(-2, 0))).planned_hours(), None);
        assert_eq!(route(None).planned_hours(), None);
    }

    #[test]
    fn test_candidate_requires_active_unlocked_not_deleted() {
        let mut r = route(None);
        assert!(r.is_candidate());
        r.locked = true;
        assert!(!r.is_candidate());
        r.locked = false;
        r.is_deleted = true;
        assert!(!r.is_candidate());
    }
}
