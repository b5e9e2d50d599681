//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → RelaySettings handed to the Relay, the rest to the server
//! ```
//!
//! # Design Decisions
//! - Config is fixed for the life of a relay; there is no hot reload
//! - All fields have defaults so an empty file is a valid config
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    FixtureConfig, FixtureMethodConfig, ListenerConfig, ObservabilityConfig, ProviderEntry,
    RelayConfig, RelaySettings,
};
pub use validation::{validate_config, ValidationError};
