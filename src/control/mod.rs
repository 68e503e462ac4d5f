pub mod service;

pub use self::service::{ControlError, ControlService, EquipmentState, RoomState};
