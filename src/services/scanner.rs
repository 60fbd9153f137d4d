//! Escáner periódico de tareas
//!
//! Cada pasada corre en una única transacción SERIALIZABLE y aplica cuatro
//! fases: completar tareas vencidas, contar las que están en ejecución,
//! promover tareas en cola (FIFO, respetando el límite global) y reconciliar
//! el estado derivado de los vehículos. Cualquier error revierte la pasada
//! entera; el siguiente tick la reintenta.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::DispatchSettings;
use crate::models::{TaskStatus, VehicleStatus};
use crate::repositories::{DispatchRepository, DispatchTransaction, Isolation};
use crate::services::state_engine;
use crate::utils::errors::StoreError;

/// Resumen de una pasada del escáner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// `false` si otra instancia tenía el lock de escaneo y la pasada se omitió
    pub acquired: bool,
    pub completed: Vec<i64>,
    pub promoted: Vec<i64>,
    /// Tareas omitidas porque su vehículo ya ejecuta otra
    pub skipped_busy_vehicle: usize,
    /// CAS de ruta que afectaron cero filas
    pub lost_races: usize,
    pub running_after: i64,
    pub reconciled: u64,
}

pub struct DispatchScanner {
    repository: Arc<dyn DispatchRepository>,
    settings: DispatchSettings,
}

impl DispatchScanner {
    pub fn new(repository: Arc<dyn DispatchRepository>, settings: DispatchSettings) -> Self {
        Self { repository, settings }
    }

    pub async fn run_once(&self) -> Result<ScanReport, StoreError> {
        self.run_once_at(Utc::now()).await
    }

    /// Ejecuta una pasada completa con `now` como reloj
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<ScanReport, StoreError> {
        let mut tx = self.repository.begin(Isolation::Serializable).await?;

        let result = self.scan(tx.as_mut(), now).await;
        match result {
            Ok(report) => {
                tx.commit().await?;
                Ok(report)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::warn!("⚠️ Rollback del escaneo falló: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn scan(&self, tx: &mut dyn DispatchTransaction, now: DateTime<Utc>) -> Result<ScanReport, StoreError> {
        let mut report = ScanReport::default();

        if !tx.try_acquire_scan_lock(self.settings.scan_lock_key).await? {
            log::info!("⏭️ Otra instancia está escaneando, se omite este tick");
            return Ok(report);
        }
        report.acquired = true;

        self.complete_expired(tx, now, &mut report).await?;

        let running = tx.count_tasks_with_status(TaskStatus::Running).await?;
        report.running_after = self.promote_queued(tx, now, running, &mut report).await?;

        report.reconciled = Self::reconcile(tx).await?;

        Ok(report)
    }

    /// Fase A: Running con `end_time <= now` → Completed, libera la ruta y escribe el registro de vuelo
    async fn complete_expired(
        &self,
        tx: &mut dyn DispatchTransaction,
        now: DateTime<Utc>,
        report: &mut ScanReport,
    ) -> Result<(), StoreError> {
        let expired = tx.expired_running_tasks(now).await?;

        for task in expired {
            if !tx.complete_task(task.id, now).await? {
                continue;
            }
            tx.release_route(task.route_id).await?;

            let route = tx.find_route(task.route_id).await?;
            let points = tx.route_points(task.route_id).await?;
            let flight_log = {
                let mut rng = rand::thread_rng();
                state_engine::completion_flight_log(&mut rng, &task, route.as_ref(), &points, &self.settings, now)
            };
            tx.insert_flight_log(&flight_log).await?;

            log::info!(
                "✅ Tarea {} completada, ruta {} liberada (vehículo {})",
                task.id,
                task.route_id,
                task.vehicle_id
            );
            report.completed.push(task.id);
        }

        Ok(())
    }

    /// Fase C: promueve tareas en cola, las más antiguas primero, hasta el límite global.
    /// Devuelve el contador local de tareas en ejecución.
    async fn promote_queued(
        &self,
        tx: &mut dyn DispatchTransaction,
        now: DateTime<Utc>,
        mut running: i64,
        report: &mut ScanReport,
    ) -> Result<i64, StoreError> {
        let threshold = state_engine::promotion_threshold(now, &self.settings)?;
        let queued = tx.queued_tasks_before(threshold).await?;

        for task in queued {
            if !state_engine::has_capacity(running, &self.settings) {
                break;
            }

            if tx.running_task_for_vehicle(task.vehicle_id).await?.is_some() {
                report.skipped_busy_vehicle += 1;
                continue;
            }

            if !tx.claim_route(task.route_id).await? {
                log::debug!("Ruta {} ocupada, tarea {} sigue en cola", task.route_id, task.id);
                report.lost_races += 1;
                continue;
            }

            let route = tx.find_route(task.route_id).await?;
            let (start, end) = state_engine::execution_window(now, route.as_ref(), &self.settings)?;

            if !tx.promote_task(task.id, start, end).await? {
                // La tarea cambió bajo nosotros; devolver la ruta
                tx.release_route(task.route_id).await?;
                report.lost_races += 1;
                continue;
            }
            tx.set_vehicle_status(task.vehicle_id, VehicleStatus::Running).await?;

            running += 1;
            log::info!(
                "🚁 Tarea {} (vehículo {}) en ejecución, start={}, end={}",
                task.id,
                task.vehicle_id,
                start.to_rfc3339(),
                end.to_rfc3339()
            );
            report.promoted.push(task.id);
        }

        Ok(running)
    }

    /// Fase D: recalcula el estado derivado de todos los vehículos no autoritativos
    async fn reconcile(tx: &mut dyn DispatchTransaction) -> Result<u64, StoreError> {
        let running_ids = tx.vehicle_ids_with_task_status(TaskStatus::Running).await?;
        let queued_ids = tx.vehicle_ids_with_task_status(TaskStatus::Queued).await?;
        let plan = state_engine::reconciliation_plan(&running_ids, &queued_ids);
        tx.apply_reconciliation(&plan).await
    }

    /// Bucle del escáner. Una pasada a la vez; los ticks perdidos se descartan.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.scan_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!(
            "🛰️ Escáner de despacho iniciado (intervalo {:?}, máximo en ejecución {})",
            self.settings.scan_interval,
            self.settings.max_running
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            log::info!("[escáner] Iniciando pasada...");
            match self.run_once().await {
                Ok(report) if report.acquired => log::info!(
                    "[escáner] Pasada completada: {} completadas, {} promovidas, {} omitidas, {} carreras perdidas, {} en ejecución, {} vehículos reconciliados",
                    report.completed.len(),
                    report.promoted.len(),
                    report.skipped_busy_vehicle,
                    report.lost_races,
                    report.running_after,
                    report.reconciled
                ),
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    log::warn!("[escáner] Contención, pasada revertida: {}", e)
                }
                Err(e) => log::error!("❌ [escáner] Error, pasada revertida: {}", e),
            }
        }

        log::info!("🛑 Escáner de despacho detenido");
    }
}
