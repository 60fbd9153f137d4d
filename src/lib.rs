//! Despacho de flota de drones
//!
//! Escáner periódico de tareas y despachador bajo demanda sobre PostgreSQL,
//! expuestos por una API HTTP con Axum.

pub mod config;
pub mod controllers;
pub mod database;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
