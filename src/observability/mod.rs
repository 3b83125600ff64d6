// Observability: logging, metrics, and Pushgateway delivery

pub mod logging;
pub mod metrics;
pub mod metrics_push;

pub use logging::init_logging;
pub use metrics::init;
pub use metrics_push::push_metrics;
