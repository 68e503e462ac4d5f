pub mod evaluator;
pub mod gateway;
pub mod snapshot;

pub use self::evaluator::{evaluate, Evaluation};
pub use self::gateway::{GatewayError, SensorGateway, Subscription};
pub use self::snapshot::SensorSnapshot;
