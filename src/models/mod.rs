//! Modelos del sistema
//!
//! Este módulo contiene los modelos que mapean las tablas `dr_*`
//! de PostgreSQL que el motor de despacho lee y escribe.

pub mod flight_log;
pub mod route;
pub mod task;
pub mod vehicle;

use serde::Serialize;

pub use flight_log::{FlightEvent, FlightLog, FlightLogFilter, NewFlightLog};
pub use route::{Route, RoutePoint};
pub use task::{DispatchRecord, DispatchRecordFilter, NewTask, Task, TaskStatus};
pub use vehicle::{Vehicle, VehicleStatus};

/// Página de resultados de un listado
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, page: u32, page_size: u32, total: i64) -> Self {
        let size = i64::from(page_size.max(1));
        Self {
            data,
            page,
            page_size,
            total,
            total_pages: (total + size - 1) / size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        let page: Page<()> = Page::new(vec![], 1, 10, 21);
        assert_eq!(page.total_pages, 3);
        let page: Page<()> = Page::new(vec![], 1, 10, 0);
        assert_eq!(page.total_pages, 0);
    }
}
