//! Runlet Core
//!
//! Core types shared by the Runlet execution processor and its clients.
//!
//! This crate contains:
//! - Domain types: Executions, buffered log events, live connections and tokens
//! - DTOs: Inbound event envelopes and outbound socket frames

pub mod domain;
pub mod dto;
