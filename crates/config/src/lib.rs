//! Control-file grammar: a minimal HCL-flavored dialect (via `hcl-rs`) that
//! parses `service`/`rule`/`then`/`otherwise` blocks into a [`vigil_rules::Graph`]
//! (spec §4.4a). Not an attempt at Monit's full grammar — just enough to
//! declare services, dependencies, rules, and the actions they bind to.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod load;
mod schema;

pub use error::ConfigError;
pub use load::load;
pub use vigil_rules::Graph;

/// Reads and parses a control file from disk (spec §6 "`-c <path>`").
pub fn load_file(path: &std::path::Path) -> Result<Graph, ConfigError> {
    let source = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
    load(&source)
}
