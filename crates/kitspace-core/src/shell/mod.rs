//! Shell executor for external CAD tools.
//!
//! Commands are assembled with [`ShellCommand`], which escapes every
//! argument before the command line is handed to `sh -c`. Callers never
//! build command strings by hand.

pub mod command;
pub mod error;
pub mod escape;
pub mod system;

pub use command::{ShellCommand, ShellOutput};
pub use error::ShellError;
pub use escape::shell_escape;
pub use system::SystemShell;
