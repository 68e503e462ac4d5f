pub mod service;
pub mod settings;

pub use self::service::{AdminError, AdminService, NewUser};
pub use self::settings::Settings;
