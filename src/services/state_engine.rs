//! Motor de transiciones de estado
//!
//! Reglas deterministas sobre tareas, rutas y vehículos. No hace I/O: el
//! escáner y el despachador le consultan y luego ejecutan el resultado
//! dentro de su transacción.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use lazy_static::lazy_static;
use std::collections::BTreeSet;

use crate::config::DispatchSettings;
use crate::models::{FlightEvent, NewFlightLog, Route, RoutePoint, Task, VehicleStatus};
use crate::repositories::ReconciliationPlan;
use crate::utils::errors::ScheduleError;
use crate::utils::geo::{polyline_length_km, GeoPoint};

/// Rango de altitud simulada (metros, inclusivo)
pub const ALTITUDE_RANGE_M: (i32, i32) = (50, 300);

/// Distribución de eventos: nominal con peso 8, tres anomalías con peso 1
const EVENT_WEIGHTS: [(FlightEvent, u32); 4] = [
    (FlightEvent::Nominal, 8),
    (FlightEvent::AnomalyMinor, 1),
    (FlightEvent::AnomalyMajor, 1),
    (FlightEvent::AnomalyCritical, 1),
];

/// Duración planificada de una ejecución de la ruta.
///
/// `None` si las horas no caben en un `Duration`.
pub fn planned_duration(route: Option<&Route>, settings: &DispatchSettings) -> Option<Duration> {
    hours_to_duration(planned_hours(route, settings))
}

fn planned_hours(route: Option<&Route>, settings: &DispatchSettings) -> f64 {
    route
        .and_then(Route::planned_hours)
        .unwrap_or(settings.default_duration_hours)
}

fn hours_to_duration(hours: f64) -> Option<Duration> {
    let millis = (hours * 3_600_000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64)
}

/// Ventana `(start_time, end_time)` de una tarea que empieza ahora
pub fn execution_window(
    now: DateTime<Utc>,
    route: Option<&Route>,
    settings: &DispatchSettings,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ScheduleError> {
    let end = planned_duration(route, settings)
        .and_then(|duration| now.checked_add_signed(duration))
        .ok_or_else(|| {
            ScheduleError(format!(
                "{} h from {} for route {:?}",
                planned_hours(route, settings),
                now.to_rfc3339(),
                route.map(|r| r.id)
            ))
        })?;
    Ok((now, end))
}

/// Instante a partir del cual una tarea en cola puede promoverse
pub fn promotion_threshold(now: DateTime<Utc>, settings: &DispatchSettings) -> Result<DateTime<Utc>, ScheduleError> {
    now.checked_sub_signed(settings.queue_wait).ok_or_else(|| {
        ScheduleError(format!(
            "queue wait of {} min before {}",
            settings.queue_wait.num_minutes(),
            now.to_rfc3339()
        ))
    })
}

/// Si la pasada de promoción aún admite otra tarea
pub fn has_capacity(running: i64, settings: &DispatchSettings) -> bool {
    running < settings.max_running
}

/// Estado derivado de un vehículo a partir de sus tareas.
///
/// `None` si el estado actual es autoritativo (Disabled/Maintenance).
pub fn derive_vehicle_status(
    current: VehicleStatus,
    has_running: bool,
    has_queued: bool,
) -> Option<VehicleStatus> {
    if current.is_authoritative() {
        return None;
    }
    Some(if has_running {
        VehicleStatus::Running
    } else if has_queued {
        VehicleStatus::Queued
    } else {
        VehicleStatus::Idle
    })
}

/// Plan de reconciliación a partir de los vehículos con tareas Running y Queued.
///
/// Independiente del orden de entrada: ids ordenados y sin duplicados; un
/// vehículo con ambas clases de tarea cuenta solo como Running.
pub fn reconciliation_plan(running_ids: &[i64], queued_ids: &[i64]) -> ReconciliationPlan {
    let running: BTreeSet<i64> = running_ids.iter().copied().collect();
    let queued: BTreeSet<i64> = queued_ids
        .iter()
        .copied()
        .filter(|id| !running.contains(id))
        .collect();

    ReconciliationPlan {
        running: running.into_iter().collect(),
        queued: queued.into_iter().collect(),
    }
}

/// Distancia de la ruta en km: la almacenada, la de su polilínea o el valor de respaldo
pub fn route_distance_km(route: Option<&Route>, points: &[RoutePoint], settings: &DispatchSettings) -> f64 {
    if let Some(km) = route.and_then(Route::stored_distance_km) {
        return km;
    }

    let mut ordered: Vec<&RoutePoint> = points.iter().collect();
    ordered.sort_by_key(|p| p.point_index);
    let positions: Option<Vec<GeoPoint>> = ordered.iter().map(|p| p.position()).collect();

    match positions.map(|pts| polyline_length_km(&pts)) {
        Some(km) if km > 0.0 => km,
        _ => settings.default_route_distance_km,
    }
}

/// Velocidad media en m/s para recorrer `distance_km` en la duración planificada
pub fn average_speed_mps(distance_km: f64, route: Option<&Route>, settings: &DispatchSettings) -> f64 {
    let hours = planned_hours(route, settings);
    distance_km * 1000.0 / (hours * 3600.0)
}

/// Registro de vuelo de una tarea que se completa
pub fn completion_flight_log<R: Rng + ?Sized>(
    rng: &mut R,
    task: &Task,
    route: Option<&Route>,
    points: &[RoutePoint],
    settings: &DispatchSettings,
    now: DateTime<Utc>,
) -> NewFlightLog {
    let distance = route_distance_km(route, points, settings);

    NewFlightLog {
        task_id: task.id,
        vehicle_id: task.vehicle_id,
        altitude: rng.gen_range(ALTITUDE_RANGE_M.0..=ALTITUDE_RANGE_M.1),
        speed: average_speed_mps(distance, route, settings),
        event: sample_event(rng),
        created_at: now,
    }
}

lazy_static! {
    /// Distribución de eventos, construida una vez por proceso
    static ref EVENT_DISTRIBUTION: WeightedIndex<u32> = match WeightedIndex::new(EVENT_WEIGHTS.map(|(_, w)| w)) {
        Ok(dist) => dist,
        Err(_) => unreachable!("EVENT_WEIGHTS must be positive"),
    };
}

fn sample_event<R: Rng + ?Sized>(rng: &mut R) -> FlightEvent {
    EVENT_WEIGHTS[EVENT_DISTRIBUTION.sample(rng)].0
}
