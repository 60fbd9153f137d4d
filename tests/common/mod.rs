//! Almacén en memoria para los tests de integración
//!
//! Implementa los traits de repositorio con la misma semántica que las
//! sentencias de PostgreSQL: actualizaciones condicionales medidas por filas
//! afectadas, estados autoritativos intocables y transacciones que solo
//! publican su copia de trabajo al hacer `commit`. Una transacción abierta
//! retiene el mutex, así que las transacciones concurrentes se serializan.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use drone_dispatch::config::{DispatchSettings, EnvironmentConfig};
use drone_dispatch::models::{
    DispatchRecord, DispatchRecordFilter, FlightLog, FlightLogFilter, NewFlightLog, NewTask, Page,
    Route, RoutePoint, Task, TaskStatus, Vehicle, VehicleStatus,
};
use drone_dispatch::repositories::query_spec::Pagination;
use drone_dispatch::repositories::{
    DispatchRepository, DispatchTransaction, Isolation, ReconciliationPlan, StoreResult,
};
use drone_dispatch::state::AppState;
use drone_dispatch::utils::errors::StoreError;

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub vehicles: Vec<Vehicle>,
    pub routes: Vec<Route>,
    pub points: Vec<RoutePoint>,
    pub tasks: Vec<Task>,
    pub flight_logs: Vec<FlightLog>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }
}

/// Fallos inyectables
#[derive(Debug, Default)]
pub struct Faults {
    /// Simula otra instancia del escáner con el lock tomado
    pub scan_lock_held: AtomicBool,
    pub fail_task_insert: AtomicBool,
    pub fail_flight_log_insert: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    tables: Arc<Mutex<Tables>>,
    pub faults: Arc<Faults>,
}

fn dec(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap()
}

pub fn settings() -> DispatchSettings {
    DispatchSettings::default()
}

pub fn app_state(repo: &MemoryRepository) -> AppState {
    AppState::new(Arc::new(repo.clone()), settings(), EnvironmentConfig::default())
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn DispatchRepository> {
        Arc::new(self.clone())
    }

    // --- Fixtures ---

    pub async fn add_vehicle(&self, name: &str, status: VehicleStatus, lat: f64, lng: f64) -> i64 {
        let mut t = self.tables.lock().await;
        let id = t.next_id();
        t.vehicles.push(Vehicle {
            id,
            vehicle_name: name.to_string(),
            status,
            latitude: dec(lat),
            longitude: dec(lng),
            operator_id: Some(100),
            is_deleted: false,
            created_at: Utc::now(),
        });
        id
    }

    /// Ruta con sus waypoints en orden (el primero es el inicio)
    pub async fn add_route(&self, name: &str, hours: Option<f64>, points: &[(f64, f64)]) -> i64 {
        let mut t = self.tables.lock().await;
        let id = t.next_id();
        t.routes.push(Route {
            id,
            route_name: name.to_string(),
            is_active: true,
            is_deleted: false,
            locked: false,
            expect_complete_time: hours.map(dec),
            distance_km: None,
            created_at: Utc::now(),
        });
        for (i, (lat, lng)) in points.iter().enumerate() {
            t.points.push(RoutePoint {
                route_id: id,
                point_index: i as i32,
                lat: dec(*lat),
                lng: dec(*lng),
                name: None,
            });
        }
        id
    }

    /// Tarea directa en el almacén; una Running empieza en `created_at`
    pub async fn add_task(
        &self,
        vehicle_id: i64,
        route_id: i64,
        status: TaskStatus,
        created_at: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> i64 {
        let mut t = self.tables.lock().await;
        let id = t.next_id();
        t.tasks.push(Task {
            id,
            task_name: format!("fixture-{}", id),
            vehicle_id,
            route_id,
            operator_id: None,
            status,
            created_at,
            start_time: (status == TaskStatus::Running).then_some(created_at),
            end_time,
        });
        id
    }

    pub async fn update_route(&self, id: i64, f: impl FnOnce(&mut Route)) {
        let mut t = self.tables.lock().await;
        if let Some(route) = t.routes.iter_mut().find(|r| r.id == id) {
            f(route);
        }
    }

    pub async fn update_vehicle(&self, id: i64, f: impl FnOnce(&mut Vehicle)) {
        let mut t = self.tables.lock().await;
        if let Some(vehicle) = t.vehicles.iter_mut().find(|v| v.id == id) {
            f(vehicle);
        }
    }

    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }

    pub async fn vehicle(&self, id: i64) -> Vehicle {
        let t = self.tables.lock().await;
        t.vehicles.iter().find(|v| v.id == id).cloned().unwrap()
    }

    pub async fn route(&self, id: i64) -> Route {
        let t = self.tables.lock().await;
        t.routes.iter().find(|r| r.id == id).cloned().unwrap()
    }

    pub async fn task(&self, id: i64) -> Task {
        let t = self.tables.lock().await;
        t.tasks.iter().find(|task| task.id == id).cloned().unwrap()
    }
}

#[async_trait]
impl DispatchRepository for MemoryRepository {
    async fn begin(&self, _isolation: Isolation) -> StoreResult<Box<dyn DispatchTransaction>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn list_dispatch_records(&self, filter: &DispatchRecordFilter) -> StoreResult<Page<DispatchRecord>> {
        let t = self.tables.lock().await;
        let pagination = Pagination::new(filter.page, filter.page_size);

        let mut tasks: Vec<&Task> = t
            .tasks
            .iter()
            .filter(|task| filter.status.map_or(true, |s| task.status == s))
            .filter(|task| filter.vehicle_id.map_or(true, |v| task.vehicle_id == v))
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = tasks.len() as i64;
        let data = tasks
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.page_size as usize)
            .map(|task| {
                let vehicle = t.vehicles.iter().find(|v| v.id == task.vehicle_id);
                let route = t.routes.iter().find(|r| r.id == task.route_id);
                DispatchRecord {
                    id: task.id,
                    task_name: task.task_name.clone(),
                    vehicle_id: task.vehicle_id,
                    vehicle_name: vehicle.map(|v| v.vehicle_name.clone()),
                    route_id: task.route_id,
                    route_name: route.map(|r| r.route_name.clone()),
                    expect_complete_time: route.and_then(|r| r.expect_complete_time),
                    status: task.status,
                    created_at: task.created_at,
                    start_time: task.start_time,
                    end_time: task.end_time,
                }
            })
            .collect();

        Ok(Page::new(data, pagination.page, pagination.page_size, total))
    }

    async fn list_flight_logs(&self, filter: &FlightLogFilter) -> StoreResult<Page<FlightLog>> {
        let t = self.tables.lock().await;
        let pagination = Pagination::new(filter.page, filter.page_size);

        let mut logs: Vec<&FlightLog> = t
            .flight_logs
            .iter()
            .filter(|log| filter.task_id.map_or(true, |id| log.task_id == id))
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = logs.len() as i64;
        let data = logs
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.page_size as usize)
            .cloned()
            .collect();

        Ok(Page::new(data, pagination.page, pagination.page_size, total))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<Faults>,
}

impl MemoryTransaction {
    fn task_mut(&mut self, id: i64) -> Option<&mut Task> {
        self.working.tasks.iter_mut().find(|t| t.id == id)
    }

    fn route_mut(&mut self, id: i64) -> Option<&mut Route> {
        self.working.routes.iter_mut().find(|r| r.id == id)
    }

    fn sorted_tasks<F: Fn(&Task) -> bool>(&self, pred: F) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.working.tasks.iter().filter(|t| pred(t)).cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }
}

#[async_trait]
impl DispatchTransaction for MemoryTransaction {
    async fn try_acquire_scan_lock(&mut self, _key: i64) -> StoreResult<bool> {
        Ok(!self.faults.scan_lock_held.load(Ordering::SeqCst))
    }

    async fn expired_running_tasks(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<Task>> {
        let mut tasks = self.sorted_tasks(|t| {
            t.status == TaskStatus::Running && t.end_time.map_or(false, |end| end <= now)
        });
        tasks.sort_by_key(|t| (t.end_time, t.id));
        Ok(tasks)
    }

    async fn queued_tasks_before(&mut self, created_before: DateTime<Utc>) -> StoreResult<Vec<Task>> {
        let mut tasks =
            self.sorted_tasks(|t| t.status == TaskStatus::Queued && t.created_at <= created_before);
        tasks.sort_by_key(|t| (t.created_at, t.id));
        Ok(tasks)
    }

    async fn running_tasks(&mut self) -> StoreResult<Vec<Task>> {
        Ok(self.sorted_tasks(|t| t.status == TaskStatus::Running))
    }

    async fn count_tasks_with_status(&mut self, status: TaskStatus) -> StoreResult<i64> {
        Ok(self.working.tasks.iter().filter(|t| t.status == status).count() as i64)
    }

    async fn running_task_for_vehicle(&mut self, vehicle_id: i64) -> StoreResult<Option<Task>> {
        Ok(self
            .sorted_tasks(|t| t.vehicle_id == vehicle_id && t.status == TaskStatus::Running)
            .into_iter()
            .next())
    }

    async fn vehicle_ids_with_task_status(&mut self, status: TaskStatus) -> StoreResult<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .working
            .tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.vehicle_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn complete_task(&mut self, task_id: i64, _now: DateTime<Utc>) -> StoreResult<bool> {
        match self.task_mut(task_id) {
            Some(task) if task.status.can_transition_to(TaskStatus::Completed) => {
                task.status = TaskStatus::Completed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn promote_task(
        &mut self,
        task_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match self.task_mut(task_id) {
            Some(task) if task.status.can_transition_to(TaskStatus::Running) => {
                task.status = TaskStatus::Running;
                task.start_time = Some(start_time);
                task.end_time = Some(end_time);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_task(&mut self, task: &NewTask) -> StoreResult<i64> {
        if self.faults.fail_task_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Retryable("could not serialize access".to_string()));
        }
        let id = self.working.next_id();
        self.working.tasks.push(Task {
            id,
            task_name: task.task_name.clone(),
            vehicle_id: task.vehicle_id,
            route_id: task.route_id,
            operator_id: task.operator_id,
            status: task.status,
            created_at: task.created_at,
            start_time: task.start_time,
            end_time: task.end_time,
        });
        Ok(id)
    }

    async fn find_route(&mut self, route_id: i64) -> StoreResult<Option<Route>> {
        Ok(self.working.routes.iter().find(|r| r.id == route_id).cloned())
    }

    async fn lock_free_routes(&mut self) -> StoreResult<Vec<Route>> {
        let mut routes: Vec<Route> = self
            .working
            .routes
            .iter()
            .filter(|r| r.is_candidate())
            .cloned()
            .collect();
        routes.sort_by_key(|r| r.id);
        Ok(routes)
    }

    async fn claim_route(&mut self, route_id: i64) -> StoreResult<bool> {
        match self.route_mut(route_id) {
            Some(route) if !route.locked => {
                route.locked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_route(&mut self, route_id: i64) -> StoreResult<bool> {
        match self.route_mut(route_id) {
            Some(route) if route.locked => {
                route.locked = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn route_points(&mut self, route_id: i64) -> StoreResult<Vec<RoutePoint>> {
        let mut points: Vec<RoutePoint> = self
            .working
            .points
            .iter()
            .filter(|p| p.route_id == route_id)
            .cloned()
            .collect();
        points.sort_by_key(|p| p.point_index);
        Ok(points)
    }

    async fn start_points(&mut self, route_ids: &[i64]) -> StoreResult<Vec<RoutePoint>> {
        let mut points: Vec<RoutePoint> = self
            .working
            .points
            .iter()
            .filter(|p| route_ids.contains(&p.route_id) && p.point_index == 0)
            .cloned()
            .collect();
        points.sort_by_key(|p| p.route_id);
        Ok(points)
    }

    async fn end_points(&mut self, route_ids: &[i64]) -> StoreResult<Vec<RoutePoint>> {
        let mut ends: Vec<RoutePoint> = Vec::new();
        for &route_id in route_ids {
            let last = self
                .working
                .points
                .iter()
                .filter(|p| p.route_id == route_id)
                .max_by_key(|p| p.point_index);
            if let Some(p) = last {
                ends.push(p.clone());
            }
        }
        ends.sort_by_key(|p| p.route_id);
        ends.dedup_by_key(|p| p.route_id);
        Ok(ends)
    }

    async fn find_vehicle(&mut self, vehicle_id: i64) -> StoreResult<Option<Vehicle>> {
        Ok(self
            .working
            .vehicles
            .iter()
            .find(|v| v.id == vehicle_id && !v.is_deleted)
            .cloned())
    }

    async fn set_vehicle_status(&mut self, vehicle_id: i64, status: VehicleStatus) -> StoreResult<bool> {
        match self.working.vehicles.iter_mut().find(|v| v.id == vehicle_id) {
            Some(v) if !v.status.is_authoritative() && v.status != status => {
                v.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply_reconciliation(&mut self, plan: &ReconciliationPlan) -> StoreResult<u64> {
        let mut changed = 0;
        for v in self.working.vehicles.iter_mut() {
            if v.status.is_authoritative() {
                continue;
            }
            let target = if plan.running.contains(&v.id) {
                VehicleStatus::Running
            } else if plan.queued.contains(&v.id) {
                VehicleStatus::Queued
            } else {
                VehicleStatus::Idle
            };
            if v.status != target {
                v.status = target;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn insert_flight_log(&mut self, log: &NewFlightLog) -> StoreResult<i64> {
        if self.faults.fail_flight_log_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Fault("flight log insert failed".to_string()));
        }
        let id = self.working.next_id();
        self.working.flight_logs.push(FlightLog {
            id,
            task_id: log.task_id,
            vehicle_id: log.vehicle_id,
            altitude: log.altitude,
            speed: log.speed,
            event_type: log.event.code(),
            created_at: log.created_at,
        });
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
