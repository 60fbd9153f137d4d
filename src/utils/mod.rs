//! Utilidades del sistema
//!
//! Manejo de errores y geometría esférica.

pub mod errors;
pub mod geo;
