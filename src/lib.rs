pub mod admin;
pub mod alerts;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod control;
pub mod db;
pub mod monitor;
pub mod realtime;
pub mod sensors;
pub mod snapshot_cache;
