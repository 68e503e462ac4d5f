use serde::Serialize;
use utoipa::ToSchema;

use super::snapshot::SensorSnapshot;

/// Comfort bands for a classroom.
///
/// These are narrower than the alert bands in `alerts::thresholds`; a value
/// can be outside the comfort band without being alert-worthy.
pub mod bands {
    /// °C, inclusive.
    pub const TEMPERATURE: (f64, f64) = (18.0, 26.0);
    /// %, inclusive.
    pub const HUMIDITY: (f64, f64) = (30.0, 60.0);
    /// ppm CO2, exclusive upper bound.
    pub const AIR_QUALITY_MAX: f64 = 800.0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Evaluation {
    pub temperature_normal: bool,
    pub humidity_normal: bool,
    pub air_quality_normal: bool,
}

/// Classify each metric of `snapshot` against the comfort bands.
/// An unknown metric is never normal.
pub fn evaluate(snapshot: &SensorSnapshot) -> Evaluation {
    Evaluation {
        temperature_normal: temperature_normal(snapshot.temperature),
        humidity_normal: humidity_normal(snapshot.humidity),
        air_quality_normal: air_quality_normal(snapshot.air_quality),
    }
}

pub fn temperature_normal(v: Option<f64>) -> bool {
    within(v, bands::TEMPERATURE)
}

pub fn humidity_normal(v: Option<f64>) -> bool {
    within(v, bands::HUMIDITY)
}

pub fn air_quality_normal(v: Option<f64>) -> bool {
    v.is_some_and(|v| v < bands::AIR_QUALITY_MAX)
}

fn within(v: Option<f64>, (min, max): (f64, f64)) -> bool {
    v.is_some_and(|v| (min..=max).contains(&v))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn snapshot(t: Option<f64>, h: Option<f64>, a: Option<f64>) -> SensorSnapshot {
        SensorSnapshot {
            room_id: "A101".into(),
            temperature: t,
            humidity: h,
            air_quality: a,
            timestamp: "2025-03-01T08:00:00Z".into(),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn temperature_band_is_inclusive() {
        assert!(!temperature_normal(Some(17.9)));
        assert!(temperature_normal(Some(18.0)));
        assert!(temperature_normal(Some(22.0)));
        assert!(temperature_normal(Some(26.0)));
        assert!(!temperature_normal(Some(26.1)));
        assert!(!temperature_normal(None));
    }

    #[test]
    fn humidity_band_is_inclusive() {
        assert!(!humidity_normal(Some(29.9)));
        assert!(humidity_normal(Some(30.0)));
        assert!(humidity_normal(Some(60.0)));
        assert!(!humidity_normal(Some(60.5)));
        assert!(!humidity_normal(None));
    }

    #[test]
    fn air_quality_upper_bound_is_exclusive() {
        assert!(air_quality_normal(Some(0.0)));
        assert!(air_quality_normal(Some(799.0)));
        assert!(!air_quality_normal(Some(800.0)));
        assert!(!air_quality_normal(None));
    }

    #[test]
    fn metrics_are_independent() {
        let e = evaluate(&snapshot(Some(15.0), Some(45.0), Some(500.0)));
        assert_eq!(
            e,
            Evaluation {
                temperature_normal: false,
                humidity_normal: true,
                air_quality_normal: true,
            }
        );
    }

    #[test]
    fn all_unknown_is_all_abnormal() {
        let e = evaluate(&snapshot(None, None, None));
        assert!(!e.temperature_normal && !e.humidity_normal && !e.air_quality_normal);
    }
}
