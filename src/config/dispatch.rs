//! Configuración del motor de despacho
//!
//! Límite de concurrencia, espera mínima en cola, intervalo del escáner y
//! valores de respaldo para rutas sin duración o distancia utilizables.

use anyhow::{bail, Context, Result};
use chrono::Duration;
use std::env;
use std::str::FromStr;

/// Techo de la duración de respaldo: un año, la escala de `expect_complete_time`
pub const MAX_DEFAULT_DURATION_HOURS: f64 = 8_760.0;
/// Techo de la espera mínima en cola: una semana
pub const MAX_QUEUE_WAIT_MINUTES: i64 = 10_080;

/// Parámetros del escáner y del despachador
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Límite global de tareas en ejecución (solo lo aplica el escáner)
    pub max_running: i64,
    /// Antigüedad mínima de una tarea en cola antes de poder promoverse
    pub queue_wait: Duration,
    pub scan_interval: std::time::Duration,
    pub default_duration_hours: f64,
    pub default_route_distance_km: f64,
    /// Clave del advisory lock que garantiza un solo escáner por base de datos
    pub scan_lock_key: i64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_running: 5,
            queue_wait: Duration::minutes(1),
            scan_interval: std::time::Duration::from_secs(60),
            default_duration_hours: 1.0,
            default_route_distance_km: 10.0,
            scan_lock_key: 7_310_001,
        }
    }
}

impl DispatchSettings {
    /// Leer la configuración desde variables de entorno, con valores por defecto
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Variante testeable de `from_env`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let queue_wait_minutes: i64 =
            parse_or(&lookup, "QUEUE_WAIT_MINUTES", defaults.queue_wait.num_minutes())?;
        if !(0..=MAX_QUEUE_WAIT_MINUTES).contains(&queue_wait_minutes) {
            bail!(
                "QUEUE_WAIT_MINUTES must be between 0 and {}, got {}",
                MAX_QUEUE_WAIT_MINUTES,
                queue_wait_minutes
            );
        }

        let settings = Self {
            max_running: parse_or(&lookup, "MAX_RUNNING", defaults.max_running)?,
            queue_wait: Duration::minutes(queue_wait_minutes),
            scan_interval: std::time::Duration::from_secs(parse_or(
                &lookup,
                "SCAN_INTERVAL_SECS",
                defaults.scan_interval.as_secs(),
            )?),
            default_duration_hours: parse_or(
                &lookup,
                "DEFAULT_DURATION_HOURS",
                defaults.default_duration_hours,
            )?,
            default_route_distance_km: parse_or(
                &lookup,
                "DEFAULT_ROUTE_DISTANCE_KM",
                defaults.default_route_distance_km,
            )?,
            scan_lock_key: parse_or(&lookup, "SCAN_LOCK_KEY", defaults.scan_lock_key)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_running < 1 {
            bail!("MAX_RUNNING must be at least 1");
        }
        if self.queue_wait < Duration::zero() || self.queue_wait > Duration::minutes(MAX_QUEUE_WAIT_MINUTES) {
            bail!("QUEUE_WAIT_MINUTES must be between 0 and {}", MAX_QUEUE_WAIT_MINUTES);
        }
        if self.scan_interval.is_zero() {
            bail!("SCAN_INTERVAL_SECS must be greater than 0");
        }
        if !(self.default_duration_hours > 0.0 && self.default_duration_hours <= MAX_DEFAULT_DURATION_HOURS) {
            bail!(
                "DEFAULT_DURATION_HOURS must be in (0, {}]",
                MAX_DEFAULT_DURATION_HOURS
            );
        }
        if !(self.default_route_distance_km.is_finite() && self.default_route_distance_km > 0.0) {
            bail!("DEFAULT_ROUTE_DISTANCE_KM must be a positive number");
        }
        Ok(())
    }
}

pub(crate) fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value, got '{}'", key, raw)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = DispatchSettings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.max_running, 5);
        assert_eq!(settings.queue_wait, Duration::minutes(1));
        assert_eq!(settings.scan_interval.as_secs(), 60);
        assert_eq!(settings.default_duration_hours, 1.0);
    }

    #[test]
    fn test_overrides() {
        let settings = DispatchSettings::from_lookup(lookup_from(&[
            ("MAX_RUNNING", "12"),
            ("QUEUE_WAIT_MINUTES", "5"),
            ("SCAN_INTERVAL_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(settings.max_running, 12);
        assert_eq!(settings.queue_wait, Duration::minutes(5));
        assert_eq!(settings.scan_interval.as_secs(), 30);
    }

    #[test]
    fn test_rejects_garbage_and_zero_cap() {
        assert!(DispatchSettings::from_lookup(lookup_from(&[("MAX_RUNNING", "many")])).is_err());
        assert!(DispatchSettings::from_lookup(lookup_from(&[("MAX_RUNNING", "0")])).is_err());
        assert!(DispatchSettings::from_lookup(lookup_from(&[("SCAN_INTERVAL_SECS", "0")])).is_err());
        assert!(
            DispatchSettings::from_lookup(lookup_from(&[("DEFAULT_DURATION_HOURS", "-1")])).is_err()
        );
    }

    #[test]
    fn test_rejects_durations_that_overflow_timestamps() {
        for (key, value) in [
            ("DEFAULT_DURATION_HOURS", "1e300"),
            ("DEFAULT_DURATION_HOURS", "inf"),
            ("DEFAULT_DURATION_HOURS", "NaN"),
            ("DEFAULT_DURATION_HOURS", "8761"),
            ("QUEUE_WAIT_MINUTES", "10081"),
            ("QUEUE_WAIT_MINUTES", "9223372036854775807"),
            ("QUEUE_WAIT_MINUTES", "-1"),
        ] {
            assert!(
                DispatchSettings::from_lookup(lookup_from(&[(key, value)])).is_err(),
                "{}={} debería rechazarse",
                key,
                value
            );
        }

        let edge = DispatchSettings::from_lookup(lookup_from(&[
            ("DEFAULT_DURATION_HOURS", "8760"),
            ("QUEUE_WAIT_MINUTES", "10080"),
        ]))
        .unwrap();
        assert_eq!(edge.queue_wait, Duration::weeks(1));
    }
}
