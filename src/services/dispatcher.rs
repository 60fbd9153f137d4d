//! Despachador bajo demanda
//!
//! Asigna un vehículo a una ruta dentro de una transacción: ruta libre más
//! cercana (ejecución directa), o cola detrás de su propia ruta, o cola en la
//! ruta en ejecución cuyo final esté más cerca. El despacho directo no pasa
//! por el límite global del escáner.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::DispatchSettings;
use crate::models::{NewTask, Task, TaskStatus, Vehicle, VehicleStatus};
use crate::repositories::{DispatchRepository, DispatchTransaction, Isolation};
use crate::services::state_engine;
use crate::utils::errors::DispatchError;
use crate::utils::geo::{self, GeoPoint};

/// Resultado de un despacho exitoso
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub task_id: i64,
    pub task_name: String,
    pub vehicle_id: i64,
    pub route_id: i64,
    pub task_status: i16,
}

/// Entrada del resultado de un lote
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DispatchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Rama elegida por la selección de ruta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch {
    /// Ruta libre reclamada: la tarea nace en ejecución
    Claimed { route_id: i64 },
    /// Vehículo en ejecución: ruta libre más cercana a su final, en cola hasta que termine
    NextFree { route_id: i64 },
    /// Vehículo en ejecución: siguiente vuelta de su propia ruta
    BehindOwnRoute { route_id: i64 },
    /// Vehículo en reposo: cola en la ruta en ejecución más cercana
    NearestRunning { route_id: i64 },
}

impl RouteMatch {
    pub fn route_id(self) -> i64 {
        match self {
            RouteMatch::Claimed { route_id }
            | RouteMatch::NextFree { route_id }
            | RouteMatch::BehindOwnRoute { route_id }
            | RouteMatch::NearestRunning { route_id } => route_id,
        }
    }

    pub fn task_status(self) -> TaskStatus {
        match self {
            RouteMatch::Claimed { .. } => TaskStatus::Running,
            _ => TaskStatus::Queued,
        }
    }
}

pub struct DispatchService {
    repository: Arc<dyn DispatchRepository>,
    settings: DispatchSettings,
}

impl DispatchService {
    pub fn new(repository: Arc<dyn DispatchRepository>, settings: DispatchSettings) -> Self {
        Self { repository, settings }
    }

    /// Despacha un vehículo en su propia transacción
    pub async fn dispatch(&self, vehicle_id: i64) -> Result<DispatchOutcome, DispatchError> {
        let mut tx = self.repository.begin(Isolation::ReadCommitted).await?;

        let result = self.dispatch_in(tx.as_mut(), vehicle_id, Utc::now()).await;
        match result {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::warn!("⚠️ Rollback del despacho {} falló: {}", vehicle_id, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Despacha varios vehículos en una transacción compartida.
    ///
    /// Los fallos de negocio quedan en su entrada; solo un fallo del
    /// almacenamiento aborta el lote completo.
    pub async fn dispatch_batch(&self, vehicle_ids: &[i64]) -> Result<Vec<BatchEntry>, DispatchError> {
        let mut tx = self.repository.begin(Isolation::ReadCommitted).await?;
        let mut entries = Vec::with_capacity(vehicle_ids.len());

        for &id in vehicle_ids {
            let result = self.dispatch_in(tx.as_mut(), id, Utc::now()).await;
            match result {
                Ok(outcome) => entries.push(BatchEntry {
                    id,
                    success: true,
                    data: Some(outcome),
                    message: None,
                }),
                Err(e) if e.is_transactional() => {
                    log::error!("❌ Lote de despacho abortado en vehículo {}: {}", id, e);
                    if let Err(rollback_err) = tx.rollback().await {
                        log::warn!("⚠️ Rollback del lote falló: {}", rollback_err);
                    }
                    return Err(e);
                }
                Err(e) => {
                    log::info!("Vehículo {} no despachado: {}", id, e);
                    entries.push(BatchEntry {
                        id,
                        success: false,
                        data: None,
                        message: Some(e.to_string()),
                    });
                }
            }
        }

        tx.commit().await?;
        Ok(entries)
    }

    /// Un despacho completo dentro de una transacción ya abierta.
    ///
    /// Toda validación ocurre antes de la primera escritura, así que un fallo
    /// de negocio no deja mutaciones.
    async fn dispatch_in(
        &self,
        tx: &mut dyn DispatchTransaction,
        vehicle_id: i64,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        if vehicle_id <= 0 {
            return Err(DispatchError::Validation(format!("Invalid vehicle id {}", vehicle_id)));
        }

        let vehicle = tx
            .find_vehicle(vehicle_id)
            .await?
            .ok_or_else(|| DispatchError::Validation(format!("Vehicle {} does not exist", vehicle_id)))?;

        if !vehicle.status.is_dispatchable() {
            return Err(DispatchError::Validation(format!(
                "Vehicle {} cannot be dispatched in status {:?}",
                vehicle.id, vehicle.status
            )));
        }

        let (position, own_task) = self.current_position(tx, &vehicle).await?;
        let matched = self.pick_route(tx, &vehicle, position, own_task.as_ref()).await?;

        let route_id = matched.route_id();
        let status = matched.task_status();
        let (start_time, end_time) = match matched {
            RouteMatch::Claimed { .. } => {
                let route = tx.find_route(route_id).await?;
                let (start, end) = state_engine::execution_window(now, route.as_ref(), &self.settings)?;
                (Some(start), Some(end))
            }
            _ => (None, None),
        };

        let task_name = format!("dispatch-{}-{}", vehicle.vehicle_name, now.timestamp_millis());
        let task_id = tx
            .insert_task(&NewTask {
                task_name: task_name.clone(),
                vehicle_id: vehicle.id,
                route_id,
                operator_id: vehicle.operator_id,
                status,
                created_at: now,
                start_time,
                end_time,
            })
            .await?;

        // Mismo estado que derivaría la reconciliación
        let has_running = matches!(matched, RouteMatch::Claimed { .. }) || own_task.is_some();
        if let Some(derived) = state_engine::derive_vehicle_status(vehicle.status, has_running, true) {
            tx.set_vehicle_status(vehicle.id, derived).await?;
        }

        log::info!(
            "📦 Vehículo {} despachado: tarea {} en ruta {} ({:?})",
            vehicle.id,
            task_id,
            route_id,
            matched
        );

        Ok(DispatchOutcome {
            task_id,
            task_name,
            vehicle_id: vehicle.id,
            route_id,
            task_status: status.code(),
        })
    }

    /// Posición actual: nido si está en reposo, final de su ruta si está en ejecución
    async fn current_position(
        &self,
        tx: &mut dyn DispatchTransaction,
        vehicle: &Vehicle,
    ) -> Result<(GeoPoint, Option<Task>), DispatchError> {
        match vehicle.status {
            VehicleStatus::Running => {
                let task = tx.running_task_for_vehicle(vehicle.id).await?.ok_or_else(|| {
                    DispatchError::Consistency(format!(
                        "Vehicle {} is running but has no running task",
                        vehicle.id
                    ))
                })?;

                let endpoint = tx
                    .end_points(&[task.route_id])
                    .await?
                    .into_iter()
                    .next()
                    .and_then(|p| p.position())
                    .ok_or_else(|| {
                        DispatchError::Consistency(format!(
                            "Route {} of running task {} has no usable endpoint",
                            task.route_id, task.id
                        ))
                    })?;

                Ok((endpoint, Some(task)))
            }
            _ => {
                let home = vehicle.home_position().ok_or_else(|| {
                    DispatchError::Consistency(format!("Vehicle {} has no usable home position", vehicle.id))
                })?;
                Ok((home, None))
            }
        }
    }

    /// Selección de ruta bajo locks de fila
    async fn pick_route(
        &self,
        tx: &mut dyn DispatchTransaction,
        vehicle: &Vehicle,
        position: GeoPoint,
        own_task: Option<&Task>,
    ) -> Result<RouteMatch, DispatchError> {
        // 1. Ruta libre con el inicio más cercano
        let free_routes = tx.lock_free_routes().await?;
        if !free_routes.is_empty() {
            let ids: Vec<i64> = free_routes.iter().map(|r| r.id).collect();
            let starts = tx.start_points(&ids).await?;
            let nearest = geo::nearest(
                position,
                starts.iter().filter_map(|p| p.position().map(|pos| (p.route_id, pos))),
            );

            if let Some((route_id, distance)) = nearest {
                // Un vehículo no ejecuta dos tareas a la vez: la ruta la reclamará el escáner
                if own_task.is_some() {
                    return Ok(RouteMatch::NextFree { route_id });
                }
                match self.claim(tx, route_id).await {
                    Ok(()) => {
                        log::debug!("Ruta libre {} a {:.3} km del vehículo {}", route_id, distance, vehicle.id);
                        return Ok(RouteMatch::Claimed { route_id });
                    }
                    Err(DispatchError::Contention { route_id }) => {
                        log::info!("Ruta {} ganada por otro actor, vehículo {} pasa a cola", route_id, vehicle.id);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        // 2. En ejecución: siguiente vuelta de su propia ruta
        if let Some(task) = own_task {
            return Ok(RouteMatch::BehindOwnRoute { route_id: task.route_id });
        }

        // 3. En reposo: cola en la ruta en ejecución con el final más cercano
        let running_routes: Vec<i64> = tx
            .running_tasks()
            .await?
            .iter()
            .map(|t| t.route_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if running_routes.is_empty() {
            return Err(DispatchError::NoRouteAvailable);
        }

        let ends = tx.end_points(&running_routes).await?;
        geo::nearest(
            position,
            ends.iter().filter_map(|p| p.position().map(|pos| (p.route_id, pos))),
        )
        .map(|(route_id, _)| RouteMatch::NearestRunning { route_id })
        .ok_or(DispatchError::NoRouteAvailable)
    }

    /// CAS sobre el flag de la ruta
    async fn claim(&self, tx: &mut dyn DispatchTransaction, route_id: i64) -> Result<(), DispatchError> {
        if tx.claim_route(route_id).await? {
            Ok(())
        } else {
            Err(DispatchError::Contention { route_id })
        }
    }
}
