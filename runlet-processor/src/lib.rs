//! Runlet Processor
//!
//! Keeps execution records, buffered logs and live log subscribers consistent
//! with the infrastructure events that drive a remote command's lifecycle.

pub mod api;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod memory;
pub mod outbound;
pub mod processor;
pub mod repository;
pub mod service;
