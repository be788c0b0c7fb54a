//! Command runner trait.

use async_trait::async_trait;

use crate::shell::{ShellCommand, ShellError, ShellOutput};

/// Executes [`ShellCommand`]s.
///
/// The production implementation is [`crate::shell::SystemShell`]; tests
/// substitute recording stubs.
#[async_trait]
pub trait CommandRunner: Send + Sync + std::fmt::Debug + 'static {
    /// Run the command to completion and capture its output.
    async fn run(&self, command: &ShellCommand) -> Result<ShellOutput, ShellError>;
}
