pub mod service;
pub mod thresholds;

pub use self::service::{AlertError, AlertService, MirroredAlert};
pub use self::thresholds::{breaches, Breach};
