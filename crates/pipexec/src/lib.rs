// SPDX-License-Identifier: MIT OR Apache-2.0
//! pipexec
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Launch external processes, optionally chained into a linear pipeline, with
//! a tracing span per process and a structured diagnostic log when a process
//! fails.
//!
//! ```no_run
//! # async fn demo() -> Result<(), pipexec::ExecError> {
//! use pipexec::SharedBuffer;
//!
//! let out = SharedBuffer::new();
//! let (_cmd, result) = pipexec::command("echo")
//!     .args(["a\nb\nc"])
//!     .stdout(out.clone())
//!     .pipe("grep", ["b"])
//!     .pipe("sed", ["s/b/B/"])
//!     .run()
//!     .await;
//! result?;
//! assert_eq!(out.contents().trim(), "B");
//! # Ok(())
//! # }
//! ```
//!
//! [`Cmd::start`] must be called from within a tokio runtime.

pub mod builder;
pub mod cancel;
pub mod cmd;
pub mod context;
pub mod error;
pub mod pipe;
pub mod process;
pub mod stdio;

mod quote;

pub use builder::{CmdBuilder, command, command_with_context};
pub use cancel::CancelToken;
pub use cmd::{ArgsRedaction, Cmd};
pub use context::Context;
pub use error::{ExecError, ExitError};
pub use pipe::{PipeReader, PipeWriter, pipe};
pub use pipexec_which::{NotFoundError, look_path};
pub use process::ProcessState;
pub use stdio::{Input, Output, SharedBuffer, SharedWriter};

/// Name of the span opened for every process.
pub const SPAN_NAME: &str = "exec:run";

/// Environment variable carrying the trace id into child processes.
pub const TRACE_ID_ENV: &str = "TRACE_ID";

/// Environment variable carrying the span id into child processes.
pub const SPAN_ID_ENV: &str = "SPAN_ID";
