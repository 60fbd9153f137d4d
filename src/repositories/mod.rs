//! Repositorios
//!
//! Frontera con el almacenamiento relacional. El escáner y el despachador solo
//! ven estos traits; toda exclusión mutua es un compare-and-swap en la base de
//! datos (actualización condicional cuyo éxito se mide por filas afectadas).

pub mod postgres_dispatch_repository;
pub mod query_spec;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    DispatchRecord, DispatchRecordFilter, FlightLog, FlightLogFilter, NewFlightLog, NewTask, Page,
    Route, RoutePoint, Task, TaskStatus, Vehicle, VehicleStatus,
};
use crate::utils::errors::StoreError;

pub use postgres_dispatch_repository::PgDispatchRepository;

pub type StoreResult<T> = Result<T, StoreError>;

/// Nivel de aislamiento de una transacción
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    ReadCommitted,
    Serializable,
}

/// Estados derivados que la reconciliación escribe en un solo paso
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Vehículos con al menos una tarea en ejecución
    pub running: Vec<i64>,
    /// Vehículos con tareas en cola y ninguna en ejecución
    pub queued: Vec<i64>,
}

impl ReconciliationPlan {
    /// Vehículos con alguna tarea viva; el resto pasa a Idle
    pub fn busy(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.running.iter().chain(self.queued.iter()).copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Acceso al almacenamiento compartido por escáner, despachador y listados
#[async_trait]
pub trait DispatchRepository: Send + Sync {
    /// Abrir una transacción. Una transacción descartada sin `commit` se revierte.
    async fn begin(&self, isolation: Isolation) -> StoreResult<Box<dyn DispatchTransaction>>;

    async fn list_dispatch_records(&self, filter: &DispatchRecordFilter) -> StoreResult<Page<DispatchRecord>>;

    async fn list_flight_logs(&self, filter: &FlightLogFilter) -> StoreResult<Page<FlightLog>>;
}

/// Primitivas transaccionales sobre tareas, rutas y vehículos
#[async_trait]
pub trait DispatchTransaction: Send {
    /// Lock exclusivo de la pasada del escáner, liberado al terminar la transacción.
    /// `false` si otra instancia está escaneando.
    async fn try_acquire_scan_lock(&mut self, key: i64) -> StoreResult<bool>;

    // --- Tareas ---

    /// Tareas Running con `end_time <= now`
    async fn expired_running_tasks(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<Task>>;

    /// Tareas Queued creadas antes de `created_before`, más antiguas primero
    async fn queued_tasks_before(&mut self, created_before: DateTime<Utc>) -> StoreResult<Vec<Task>>;

    async fn running_tasks(&mut self) -> StoreResult<Vec<Task>>;

    async fn count_tasks_with_status(&mut self, status: TaskStatus) -> StoreResult<i64>;

    async fn running_task_for_vehicle(&mut self, vehicle_id: i64) -> StoreResult<Option<Task>>;

    /// Ids distintos de vehículos con alguna tarea en `status`
    async fn vehicle_ids_with_task_status(&mut self, status: TaskStatus) -> StoreResult<Vec<i64>>;

    /// Running → Completed, condicional al estado actual
    async fn complete_task(&mut self, task_id: i64, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Queued → Running, condicional al estado actual
    async fn promote_task(
        &mut self,
        task_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn insert_task(&mut self, task: &NewTask) -> StoreResult<i64>;

    // --- Rutas ---

    async fn find_route(&mut self, route_id: i64) -> StoreResult<Option<Route>>;

    /// Rutas activas, no borradas y libres, bloqueando sus filas
    async fn lock_free_routes(&mut self) -> StoreResult<Vec<Route>>;

    /// CAS: marca la ruta como ocupada solo si está libre
    async fn claim_route(&mut self, route_id: i64) -> StoreResult<bool>;

    async fn release_route(&mut self, route_id: i64) -> StoreResult<bool>;

    async fn route_points(&mut self, route_id: i64) -> StoreResult<Vec<RoutePoint>>;

    /// Punto con `point_index` 0 de cada ruta
    async fn start_points(&mut self, route_ids: &[i64]) -> StoreResult<Vec<RoutePoint>>;

    /// Punto con el `point_index` máximo de cada ruta
    async fn end_points(&mut self, route_ids: &[i64]) -> StoreResult<Vec<RoutePoint>>;

    // --- Vehículos ---

    /// Vehículo no borrado
    async fn find_vehicle(&mut self, vehicle_id: i64) -> StoreResult<Option<Vehicle>>;

    /// Fija un estado derivado; nunca toca Disabled/Maintenance
    async fn set_vehicle_status(&mut self, vehicle_id: i64, status: VehicleStatus) -> StoreResult<bool>;

    /// Aplica el plan de reconciliación; devuelve las filas que cambiaron
    async fn apply_reconciliation(&mut self, plan: &ReconciliationPlan) -> StoreResult<u64>;

    // --- Registro de vuelo ---

    async fn insert_flight_log(&mut self, log: &NewFlightLog) -> StoreResult<i64>;

    // --- Ciclo de vida ---

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
