use std::sync::Arc;

use crate::{
    admin::AdminService, alerts::AlertService, control::ControlService, db::DocumentStore, realtime::RealtimeStore,
    sensors::SensorGateway, snapshot_cache::SnapshotCache,
};

/// Store handles and services, built once at startup and handed to every
/// component that needs them.
#[derive(Clone)]
pub struct AppContext {
    pub documents: Arc<dyn DocumentStore>,
    pub gateway: SensorGateway,
    pub alerts: Arc<AlertService>,
    pub control: Arc<ControlService>,
    pub admin: Arc<AdminService>,
    pub cache: SnapshotCache,
}

impl AppContext {
    pub fn new(documents: Arc<dyn DocumentStore>, realtime: Arc<dyn RealtimeStore>) -> Self {
        Self {
            gateway: SensorGateway::new(Arc::clone(&realtime)),
            alerts: Arc::new(AlertService::new(Arc::clone(&documents), Arc::clone(&realtime))),
            control: Arc::new(ControlService::new(Arc::clone(&documents), realtime)),
            admin: Arc::new(AdminService::new(Arc::clone(&documents))),
            cache: SnapshotCache::new(),
            documents,
        }
    }
}
