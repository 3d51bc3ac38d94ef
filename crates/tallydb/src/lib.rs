//! ## Crate layout
//! - `core`: descriptor table, rule registry, observer, recompute and
//!   exclusivity executors, ports, and observability.
//!
//! Hosts build a [`RuleRegistry`](core::registry::RuleRegistry) once (in
//! code or from a TOML schema via [`load_schema`]), open one
//! [`TransactionScope`](core::session::TransactionScope) per primary
//! transaction, and dispatch their lifecycle events into it.

pub use tallydb_core as core;

/// re-exports
///
/// scalar crates appearing in `Value`, so declaring code does not need to
/// list them in its own Cargo.toml
pub mod __reexports {
    pub use rust_decimal;
    pub use ulid;
}

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Public error type.
pub use crate::core::error::InternalError as Error;

/// Read a TOML schema file and resolve it into a registry.
pub fn load_schema(
    path: impl AsRef<std::path::Path>,
) -> Result<crate::core::registry::RuleRegistry, Error> {
    crate::core::config::SchemaConfig::from_path(path)?.build_registry()
}

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::prelude::*;
    pub use rust_decimal::Decimal;
}
