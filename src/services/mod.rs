//! Services module
//!
//! Lógica de negocio del despacho: reglas puras de estado, el escáner
//! periódico y el despachador bajo demanda.

pub mod dispatcher;
pub mod scanner;
pub mod state_engine;

pub use dispatcher::{BatchEntry, DispatchOutcome, DispatchService};
pub use scanner::{DispatchScanner, ScanReport};
