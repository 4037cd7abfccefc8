//! System utilities for embedded devices.
//!
//! - **[`shell`]**: line editing and tokenizing for the operator console
//! - **[`command`]**: the typed operator commands
//! - **[`random`]**: sequence-number sources
//!
//! ```rust
//! use ethmqtt::system::command::Command;
//! use ethmqtt::system::shell::{Shell, ShellResult};
//!
//! let mut shell = Shell::new();
//! let mut echo = heapless::String::<32>::new();
//! for &byte in b"ping\r" {
//!     if shell.input(byte, &mut echo) == ShellResult::Ready {
//!         let fields = shell.fields();
//!         assert_eq!(Command::parse(&fields), Some(Command::Ping));
//!     }
//! }
//! ```

/// Operator command parsing.
pub mod command;

/// Initial sequence numbers and ephemeral ports.
pub mod random;

/// Command shell interface for embedded systems.
pub mod shell;
