//! Transcode worker
//!
//! Each room runs one external transcoder as an opaque subprocess: bytes in
//! on stdin, either a multiplexed stream out on stdout (live mode) or files
//! written under the session directory (segmented mode). Stderr is logged
//! and scanned for a readiness line.

pub mod config;
pub mod diagnostic;
pub mod handle;
pub mod input;
pub mod output;

pub use config::WorkerConfig;
pub use diagnostic::DiagnosticScanner;
pub use handle::{WorkerExit, WorkerHandle, WorkerIo};
pub use input::InputSink;
pub use output::OutputSource;
