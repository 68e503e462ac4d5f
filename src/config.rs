use std::str::FromStr;

use anyhow::{Context, Result};

use crate::realtime;

// ---------------------------------------------------------------------------
// DocumentStoreKind
// ---------------------------------------------------------------------------

/// Backend holding rooms, users, alerts and the equipment history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStoreKind {
    Postgres { database_url: String },
    /// Process-local, lost on restart. For development only.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreName {
    Postgres,
    Memory,
}

impl FromStr for StoreName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("unknown document store: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub document_store: DocumentStoreKind,
    /// Base URL of the realtime database, e.g. `https://<project>.firebaseio.com`.
    pub realtime_db_url: String,
    /// Database secret or ID token sent as `?auth=`.
    pub realtime_db_auth: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    /// Rooms whose sensors are watched for alerts.
    /// Format: `"A101,B202"`.
    pub monitored_rooms: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let store = optional("DOCUMENT_STORE", "postgres")
            .parse::<StoreName>()
            .context("DOCUMENT_STORE must be 'postgres' or 'memory'")?;
        let document_store = match store {
            StoreName::Postgres => DocumentStoreKind::Postgres {
                database_url: required("DATABASE_URL")?,
            },
            StoreName::Memory => DocumentStoreKind::Memory,
        };

        Ok(Self {
            document_store,
            realtime_db_url: required("REALTIME_DB_URL")?,
            realtime_db_auth: std::env::var("REALTIME_DB_AUTH")
                .ok()
                .filter(|s| !s.is_empty()),
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            monitored_rooms: parse_room_ids(&optional("MONITORED_ROOMS", ""))?,
        })
    }
}

/// Parse `"A101,B202"` into room ids.
///
/// Returns an error if any id cannot be used as a realtime key.
fn parse_room_ids(raw: &str) -> Result<Vec<String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|id| {
            if realtime::is_valid_key(id) {
                Ok(id.to_owned())
            } else {
                Err(anyhow::anyhow!("MONITORED_ROOMS contains an invalid room id: {id:?}"))
            }
        })
        .collect()
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_room_ids_empty() {
        assert!(parse_room_ids("").unwrap().is_empty());
        assert!(parse_room_ids(" , ").unwrap().is_empty());
    }

    #[test]
    fn parse_room_ids_trims_entries() {
        let rooms = parse_room_ids("A101, B202 ,C303").unwrap();
        assert_eq!(rooms, vec!["A101", "B202", "C303"]);
    }

    #[test]
    fn parse_room_ids_rejects_path_characters() {
        let err = parse_room_ids("A101,salles/B202").unwrap_err();
        assert!(err.to_string().contains("invalid room id"));
    }

    #[test]
    fn store_name_from_str() {
        assert_eq!("postgres".parse::<StoreName>().unwrap(), StoreName::Postgres);
        assert_eq!("memory".parse::<StoreName>().unwrap(), StoreName::Memory);
        let err = "mongo".parse::<StoreName>().unwrap_err();
        assert!(err.to_string().contains("unknown document store"));
    }
}
