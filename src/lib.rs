pub mod types;
pub mod error;
pub mod config;
pub mod observability;
pub mod price_infra;
pub mod history;
pub mod analytics;
pub mod broadcast;
pub mod monitor;
pub mod scheduler;
pub mod api;

pub use error::{Error, ErrorKind, Result};
pub use monitor::PriceMonitor;
pub use scheduler::{Scheduler, SchedulerState};
