//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod remote;
pub mod session_file;
pub mod telemetry;
