//! Repositorio PostgreSQL del motor de despacho
//!
//! Cada método de `PgDispatchTransaction` es una sola sentencia parametrizada
//! dentro de la transacción abierta. Los CAS se resuelven con `rows_affected()`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use super::query_spec::{Direction, Pagination, QuerySpec, Table};
use super::{DispatchRepository, DispatchTransaction, Isolation, ReconciliationPlan, StoreResult};
use crate::models::{
    DispatchRecord, DispatchRecordFilter, FlightLog, FlightLogFilter, NewFlightLog, NewTask, Page,
    Route, RoutePoint, Task, TaskStatus, Vehicle, VehicleStatus,
};

const TASK_COLUMNS: &str =
    "id, task_name, vehicle_id, route_id, operator_id, status, created_at, start_time, end_time";
const ROUTE_COLUMNS: &str =
    "id, route_name, is_active, is_deleted, locked, expect_complete_time, distance_km, created_at";
const POINT_COLUMNS: &str = "route_id, point_index, lat, lng, name";

const DISABLED: i16 = VehicleStatus::Disabled as i16;
const MAINTENANCE: i16 = VehicleStatus::Maintenance as i16;

#[derive(Clone)]
pub struct PgDispatchRepository {
    pool: PgPool,
}

impl PgDispatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DispatchRepository for PgDispatchRepository {
    async fn begin(&self, isolation: Isolation) -> StoreResult<Box<dyn DispatchTransaction>> {
        let mut tx = self.pool.begin().await?;

        if isolation == Isolation::Serializable {
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;
        }

        Ok(Box::new(PgDispatchTransaction { tx }))
    }

    async fn list_dispatch_records(&self, filter: &DispatchRecordFilter) -> StoreResult<Page<DispatchRecord>> {
        let pagination = Pagination::new(filter.page, filter.page_size);
        let spec = QuerySpec::from(Table::FlightTask, "ft")
            .left_join(Table::Vehicle, "v", "ft.vehicle_id", "v.id")
            .left_join(Table::Route, "r", "ft.route_id", "r.id")
            .filter_opt("ft.status", filter.status.map(TaskStatus::code))
            .filter_opt("ft.vehicle_id", filter.vehicle_id)
            .order_by("ft.created_at", Direction::Desc)
            .order_by("ft.id", Direction::Desc)
            .paginate(pagination);

        let (total,): (i64,) = spec
            .count_query()
            .build_query_as()
            .fetch_one(&self.pool)
            .await?;

        let rows = spec
            .select_query(&[
                "ft.id",
                "ft.task_name",
                "ft.vehicle_id",
                "v.vehicle_name",
                "ft.route_id",
                "r.route_name",
                "r.expect_complete_time",
                "ft.status",
                "ft.created_at",
                "ft.start_time",
                "ft.end_time",
            ])
            .build_query_as::<DispatchRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(rows, pagination.page, pagination.page_size, total))
    }

    async fn list_flight_logs(&self, filter: &FlightLogFilter) -> StoreResult<Page<FlightLog>> {
        let pagination = Pagination::new(filter.page, filter.page_size);
        let spec = QuerySpec::from(Table::FlightLog, "fl")
            .filter_opt("fl.task_id", filter.task_id)
            .order_by("fl.created_at", Direction::Desc)
            .order_by("fl.id", Direction::Desc)
            .paginate(pagination);

        let (total,): (i64,) = spec
            .count_query()
            .build_query_as()
            .fetch_one(&self.pool)
            .await?;

        let rows = spec
            .select_query(&[
                "fl.id",
                "fl.task_id",
                "fl.vehicle_id",
                "fl.altitude",
                "fl.speed",
                "fl.event_type",
                "fl.created_at",
            ])
            .build_query_as::<FlightLog>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(rows, pagination.page, pagination.page_size, total))
    }
}

pub struct PgDispatchTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl DispatchTransaction for PgDispatchTransaction {
    async fn try_acquire_scan_lock(&mut self, key: i64) -> StoreResult<bool> {
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_xact_lock($1)")
            .bind(key)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(acquired)
    }

    async fn expired_running_tasks(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM dr_flight_task WHERE status = $1 AND end_time <= $2 ORDER BY end_time ASC, id ASC",
            TASK_COLUMNS
        ))
        .bind(TaskStatus::Running)
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(tasks)
    }

    async fn queued_tasks_before(&mut self, created_before: DateTime<Utc>) -> StoreResult<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM dr_flight_task WHERE status = $1 AND created_at <= $2 ORDER BY created_at ASC, id ASC",
            TASK_COLUMNS
        ))
        .bind(TaskStatus::Queued)
        .bind(created_before)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(tasks)
    }

    async fn running_tasks(&mut self) -> StoreResult<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM dr_flight_task WHERE status = $1 ORDER BY id ASC",
            TASK_COLUMNS
        ))
        .bind(TaskStatus::Running)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(tasks)
    }

    async fn count_tasks_with_status(&mut self, status: TaskStatus) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dr_flight_task WHERE status = $1")
            .bind(status)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn running_task_for_vehicle(&mut self, vehicle_id: i64) -> StoreResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM dr_flight_task WHERE vehicle_id = $1 AND status = $2 ORDER BY id ASC LIMIT 1",
            TASK_COLUMNS
        ))
        .bind(vehicle_id)
        .bind(TaskStatus::Running)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(task)
    }

    async fn vehicle_ids_with_task_status(&mut self, status: TaskStatus) -> StoreResult<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT vehicle_id FROM dr_flight_task WHERE status = $1 ORDER BY vehicle_id",
        )
        .bind(status)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids)
    }

    async fn complete_task(&mut self, task_id: i64, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE dr_flight_task SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
        )
        .bind(TaskStatus::Completed)
        .bind(now)
        .bind(task_id)
        .bind(TaskStatus::Running)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn promote_task(
        &mut self,
        task_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE dr_flight_task
            SET status = $1, start_time = $2, end_time = $3, updated_at = $2
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(TaskStatus::Running)
        .bind(start_time)
        .bind(end_time)
        .bind(task_id)
        .bind(TaskStatus::Queued)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_task(&mut self, task: &NewTask) -> StoreResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO dr_flight_task
                (task_name, vehicle_id, route_id, operator_id, status, created_at, start_time, end_time, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $6)
            RETURNING id
            "#,
        )
        .bind(&task.task_name)
        .bind(task.vehicle_id)
        .bind(task.route_id)
        .bind(task.operator_id)
        .bind(task.status)
        .bind(task.created_at)
        .bind(task.start_time)
        .bind(task.end_time)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn find_route(&mut self, route_id: i64) -> StoreResult<Option<Route>> {
        let route = sqlx::query_as::<_, Route>(&format!(
            "SELECT {} FROM dr_route WHERE id = $1",
            ROUTE_COLUMNS
        ))
        .bind(route_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(route)
    }

    async fn lock_free_routes(&mut self) -> StoreResult<Vec<Route>> {
        let routes = sqlx::query_as::<_, Route>(&format!(
            r#"
            SELECT {} FROM dr_route
            WHERE locked = FALSE AND is_deleted = FALSE AND is_active = TRUE
            ORDER BY id ASC
            FOR UPDATE
            "#,
            ROUTE_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(routes)
    }

    async fn claim_route(&mut self, route_id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE dr_route SET locked = TRUE, updated_at = NOW() WHERE id = $1 AND locked = FALSE",
        )
        .bind(route_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_route(&mut self, route_id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE dr_route SET locked = FALSE, updated_at = NOW() WHERE id = $1 AND locked = TRUE",
        )
        .bind(route_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn route_points(&mut self, route_id: i64) -> StoreResult<Vec<RoutePoint>> {
        let points = sqlx::query_as::<_, RoutePoint>(&format!(
            "SELECT {} FROM dr_route_points WHERE route_id = $1 ORDER BY point_index ASC",
            POINT_COLUMNS
        ))
        .bind(route_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(points)
    }

    async fn start_points(&mut self, route_ids: &[i64]) -> StoreResult<Vec<RoutePoint>> {
        let points = sqlx::query_as::<_, RoutePoint>(&format!(
            "SELECT {} FROM dr_route_points WHERE route_id = ANY($1) AND point_index = 0 ORDER BY route_id",
            POINT_COLUMNS
        ))
        .bind(route_ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(points)
    }

    async fn end_points(&mut self, route_ids: &[i64]) -> StoreResult<Vec<RoutePoint>> {
        let points = sqlx::query_as::<_, RoutePoint>(&format!(
            r#"
            SELECT DISTINCT ON (route_id) {}
            FROM dr_route_points
            WHERE route_id = ANY($1)
            ORDER BY route_id, point_index DESC
            "#,
            POINT_COLUMNS
        ))
        .bind(route_ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(points)
    }

    async fn find_vehicle(&mut self, vehicle_id: i64) -> StoreResult<Option<Vehicle>> {
        let vehicle = sqlx::query_as::<_, Vehicle>(
            r#"
            SELECT id, vehicle_name, status, latitude, longitude, operator_id, is_deleted, created_at
            FROM dr_vehicle
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(vehicle)
    }

    async fn set_vehicle_status(&mut self, vehicle_id: i64, status: VehicleStatus) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE dr_vehicle SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status NOT IN ($3, $4) AND status <> $1
            "#,
        )
        .bind(status)
        .bind(vehicle_id)
        .bind(DISABLED)
        .bind(MAINTENANCE)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_reconciliation(&mut self, plan: &ReconciliationPlan) -> StoreResult<u64> {
        let mut changed = 0;

        for (ids, status) in [
            (&plan.running, VehicleStatus::Running),
            (&plan.queued, VehicleStatus::Queued),
        ] {
            if ids.is_empty() {
                continue;
            }
            let result = sqlx::query(
                r#"
                UPDATE dr_vehicle SET status = $1, updated_at = NOW()
                WHERE id = ANY($2) AND status NOT IN ($3, $4) AND status <> $1
                "#,
            )
            .bind(status)
            .bind(ids.as_slice())
            .bind(DISABLED)
            .bind(MAINTENANCE)
            .execute(&mut *self.tx)
            .await?;
            changed += result.rows_affected();
        }

        // Sin tareas vivas → Idle; un array vacío excluye a nadie
        let busy = plan.busy();
        let result = sqlx::query(
            r#"
            UPDATE dr_vehicle SET status = $1, updated_at = NOW()
            WHERE NOT (id = ANY($2)) AND status NOT IN ($3, $4) AND status <> $1
            "#,
        )
        .bind(VehicleStatus::Idle)
        .bind(busy.as_slice())
        .bind(DISABLED)
        .bind(MAINTENANCE)
        .execute(&mut *self.tx)
        .await?;
        changed += result.rows_affected();

        Ok(changed)
    }

    async fn insert_flight_log(&mut self, log: &NewFlightLog) -> StoreResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO dr_flight_log (task_id, vehicle_id, altitude, speed, event_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(log.task_id)
        .bind(log.vehicle_id)
        .bind(log.altitude)
        .bind(log.speed)
        .bind(log.event.code())
        .bind(log.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
