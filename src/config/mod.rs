//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ToolkitConfig (validated, immutable)
//!     → sections handed to each primitive's constructor
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Primitives re-run their own section's checks on construction, so a
//!   hand-built config can't bypass validation

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CacheConfig, CircuitBreakerConfig, DebounceConfig, ObservabilityConfig, PoolConfig,
    RetryConfig, ThrottleConfig, TimeoutConfig, ToolkitConfig,
};
pub use validation::validate_config;
