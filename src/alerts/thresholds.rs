use crate::{
    db::models::{AlertType, Severity},
    sensors::SensorSnapshot,
};

// Alert bands. Deliberately wider than the comfort bands in
// `sensors::evaluator::bands`.

/// °C; below is too cold.
pub const TEMPERATURE_MIN: f64 = 17.0;
/// °C; above is too hot.
pub const TEMPERATURE_MAX: f64 = 28.0;
/// °C past either temperature bound at which the alert becomes `danger`.
pub const TEMPERATURE_DANGER_MARGIN: f64 = 3.0;
/// %; below is too dry.
pub const HUMIDITY_MIN: f64 = 30.0;
/// %; above is too humid.
pub const HUMIDITY_MAX: f64 = 70.0;
/// ppm CO2; above is degraded air.
pub const AIR_QUALITY_MAX: f64 = 1000.0;
/// ppm past the air quality bound at which the alert becomes `danger`.
pub const AIR_QUALITY_DANGER_MARGIN: f64 = 500.0;

/// A metric outside its alert band.
#[derive(Debug, Clone, PartialEq)]
pub struct Breach {
    pub alert_type: AlertType,
    pub message: String,
    pub severity: Severity,
}

/// Every breach in `snapshot`, at most one per metric, in the order
/// temperature, humidity, air quality. Unknown metrics never breach.
pub fn breaches(snapshot: &SensorSnapshot) -> Vec<Breach> {
    let mut found = Vec::new();

    if let Some(t) = snapshot.temperature {
        if t < TEMPERATURE_MIN {
            found.push(Breach {
                alert_type: AlertType::TemperatureBasse,
                message: format!("La température est trop basse: {t}°C"),
                severity: escalate(t <= TEMPERATURE_MIN - TEMPERATURE_DANGER_MARGIN),
            });
        } else if t > TEMPERATURE_MAX {
            found.push(Breach {
                alert_type: AlertType::TemperatureHaute,
                message: format!("La température est trop élevée: {t}°C"),
                severity: escalate(t >= TEMPERATURE_MAX + TEMPERATURE_DANGER_MARGIN),
            });
        }
    }

    if let Some(h) = snapshot.humidity {
        if h < HUMIDITY_MIN {
            found.push(Breach {
                alert_type: AlertType::HumiditeBasse,
                message: format!("L'humidité est trop basse: {h}%"),
                severity: Severity::Warning,
            });
        } else if h > HUMIDITY_MAX {
            found.push(Breach {
                alert_type: AlertType::HumiditeHaute,
                message: format!("L'humidité est trop élevée: {h}%"),
                severity: Severity::Warning,
            });
        }
    }

    if let Some(a) = snapshot.air_quality {
        if a > AIR_QUALITY_MAX {
            found.push(Breach {
                alert_type: AlertType::QualiteAir,
                message: format!("La qualité de l'air est dégradée: {a} ppm"),
                severity: escalate(a >= AIR_QUALITY_MAX + AIR_QUALITY_DANGER_MARGIN),
            });
        }
    }

    found
}

fn escalate(danger: bool) -> Severity {
    if danger {
        Severity::Danger
    } else {
        Severity::Warning
    }
}
