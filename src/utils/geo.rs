//! Utilidades geográficas
//!
//! Distancia de gran círculo (haversine) usada únicamente como métrica de
//! comparación para elegir el candidato más cercano. No se usa para navegar.

use serde::Serialize;

/// Radio medio de la Tierra en kilómetros
pub const EARTH_MEAN_RADIUS_KM: f64 = 6371.0;

/// Par latitud/longitud en grados decimales
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Distancia haversine entre dos puntos, en kilómetros
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Clamp por errores de redondeo cerca de puntos antipodales
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_MEAN_RADIUS_KM * c
}

/// Longitud total de una polilínea ordenada, en kilómetros
pub fn polyline_length_km(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_km(pair[0], pair[1]))
        .sum()
}

/// Candidato más cercano al origen.
///
/// Empates resueltos por el id de ruta más bajo, sin depender del orden de entrada.
/// Devuelve `(id, distancia_km)`.
pub fn nearest<I>(origin: GeoPoint, candidates: I) -> Option<(i64, f64)>
where
    I: IntoIterator<Item = (i64, GeoPoint)>,
{
    let mut best: Option<(i64, f64)> = None;

    for (id, point) in candidates {
        let dist = haversine_km(origin, point);
        best = match best {
            Some((best_id, best_dist))
                if best_dist < dist || (best_dist == dist && best_id <= id) =>
            {
                Some((best_id, best_dist))
            }
            _ => Some((id, dist)),
        };
    }

    best
}
