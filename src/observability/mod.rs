// Observability: logging and metrics

pub mod logging;
pub mod metrics;

pub use self::logging::init_logging;
pub use self::metrics::{init, render};
