//! Command trait definition for CLI commands.

use anyhow::Result;
use enum_dispatch::enum_dispatch;

/// Trait implemented by all mutscan CLI commands.
#[enum_dispatch]
pub trait Command {
    #[allow(clippy::missing_errors_doc)]
    fn execute(&self) -> Result<()>;
}
