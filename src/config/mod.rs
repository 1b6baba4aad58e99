pub mod settings;

pub use settings::{Config, CaptureConfig, ReportConfig, AggregationConfig, ConfigError};
