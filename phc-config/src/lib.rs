//! PHC configuration management using Figment
//!
//! Settings for the custom field engine and the `phc` command line: where the
//! database lives, who is recorded in the audit columns, which host tables
//! external fields may touch and the default log filter.
//!
//! # Sources
//!
//! Later sources override earlier ones:
//!
//! - built-in defaults
//! - `phc.{toml,yaml,yml,json}` in the working directory, or one explicit file
//! - `PHC_` environment variables (`PHC_DATABASE__PATH=/srv/phc.db`)
//!
//! ## Example TOML Configuration
//!
//! ```toml
//! actor = "api"
//! external_tables = ["cl2", "bo_info"]
//!
//! [database]
//! path = "/srv/phc/erp.db"
//! busy_timeout_ms = 10000
//!
//! [log]
//! filter = "phc_entity=debug,info"
//! ```

pub mod discovery;
pub mod error;
pub mod provider;
pub mod types;

pub use discovery::{ConfigFile, ConfigFormat};
pub use error::{ConfigError, ConfigResult};
pub use provider::{load_configuration, ConfigProvider, ENV_PREFIX};
pub use types::{DatabaseConfig, LogConfig, PhcConfig};
