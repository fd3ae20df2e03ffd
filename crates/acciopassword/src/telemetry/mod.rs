//! Structured logging, with optional OpenTelemetry span export.
//!
//! Logs are JSON lines on stdout. When an OTLP endpoint is configured, spans
//! are also exported over OTLP/gRPC.
//!
//! # Telemetry invariants
//!
//! - **No generated password** may appear in any span attribute or log field.
//! - Log level is configurable via `telemetry.log_level` (default: `info`);
//!   `RUST_LOG` takes precedence when set.

pub mod init;

pub use init::{init_telemetry, shutdown};
