//! Configuración del proyecto
//!
//! Este módulo contiene la configuración de base de datos, variables de entorno
//! y parámetros del motor de despacho.

pub mod database;
pub mod dispatch;
pub mod environment;

pub use database::DatabaseConfig;
pub use dispatch::DispatchSettings;
pub use environment::EnvironmentConfig;
