pub mod config;
pub mod error;
pub mod quantity;
pub mod types;

pub use config::BurnrateConfig;
pub use error::{SourceError, SourceResult};
pub use quantity::parse_cpu_millicores;
pub use types::*;
