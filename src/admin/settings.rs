use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Id of the settings document in the `configuration` collection.
pub const SETTINGS_DOCUMENT: &str = "parametres";

/// Site-wide settings edited by administrators.
///
/// Stored as a JSON document. Fields missing from a stored document take
/// their default value; unknown fields are kept as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub securite: SecuritySettings,
    pub capteurs: SensorSettings,
    pub maintenance: MaintenanceSettings,
    #[serde(flatten)]
    #[schema(ignore)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneralSettings {
    pub mode_economie_energie: bool,
    /// `HH:MM`.
    pub heure_debut_activite: String,
    /// `HH:MM`.
    pub heure_fin_activite: String,
    /// °C.
    pub temperature_defaut: f64,
    pub notifications_actives: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct SecuritySettings {
    pub autoriser_acces_public: bool,
    pub expiration_session_minutes: u32,
    pub niveau_log_verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct SensorSettings {
    pub intervalle_mesure_minutes: u32,
    pub seuils_temperature: Bounds,
    pub seuils_humidite: Bounds,
    pub seuils_qualite_air: UpperBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UpperBound {
    /// ppm CO2.
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct MaintenanceSettings {
    pub mode_maintenance: bool,
    pub message_entretien: String,
    pub frequence_entretien_jours: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            securite: SecuritySettings::default(),
            capteurs: SensorSettings::default(),
            maintenance: MaintenanceSettings::default(),
            extra: Map::new(),
        }
    }
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            mode_economie_energie: false,
            heure_debut_activite: "08:00".into(),
            heure_fin_activite: "18:00".into(),
            temperature_defaut: 21.0,
            notifications_actives: true,
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            autoriser_acces_public: false,
            expiration_session_minutes: 30,
            niveau_log_verbose: false,
        }
    }
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            intervalle_mesure_minutes: 5,
            seuils_temperature: Bounds { min: 18.0, max: 26.0 },
            seuils_humidite: Bounds { min: 30.0, max: 60.0 },
            seuils_qualite_air: UpperBound { max: 1000.0 },
        }
    }
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            mode_maintenance: false,
            message_entretien: "Système en maintenance programmée.".into(),
            frequence_entretien_jours: 90,
        }
    }
}

impl Settings {
    /// Reasons the settings cannot be saved, empty when they are valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (name, value) in [
            ("general.heureDebutActivite", &self.general.heure_debut_activite),
            ("general.heureFinActivite", &self.general.heure_fin_activite),
        ] {
            if !is_clock_time(value) {
                problems.push(format!("{name} must be HH:MM, got {value:?}"));
            }
        }

        let capteurs = &self.capteurs;
        if capteurs.intervalle_mesure_minutes == 0 {
            problems.push("capteurs.intervalleMesureMinutes must be at least 1".into());
        }
        for (name, bounds) in [
            ("capteurs.seuilsTemperature", capteurs.seuils_temperature),
            ("capteurs.seuilsHumidite", capteurs.seuils_humidite),
        ] {
            if bounds.min >= bounds.max {
                problems.push(format!("{name}: min must be below max"));
            }
        }
        if capteurs.seuils_qualite_air.max <= 0.0 {
            problems.push("capteurs.seuilsQualiteAir.max must be positive".into());
        }

        if self.securite.expiration_session_minutes == 0 {
            problems.push("securite.expirationSessionMinutes must be at least 1".into());
        }

        problems
    }
}

fn is_clock_time(value: &str) -> bool {
    let Some((h, m)) = value.split_once(':') else {
        return false;
    };
    let parse = |s: &str, max: u32| {
        s.len() == 2 && s.parse::<u32>().is_ok_and(|v| v <= max)
    };
    parse(h, 23) && parse(m, 59)
}
