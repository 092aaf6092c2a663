//! Core domain types
//!
//! This module contains the records the execution processor reads and mutates.
//! Executions are created upstream when a job is submitted; log events,
//! connections and connection tokens are owned entirely by the processor.

pub mod connection;
pub mod execution;
pub mod log;
