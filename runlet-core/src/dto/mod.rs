//! Data Transfer Objects for the execution processor
//!
//! This module contains the wire shapes that cross the processor boundary:
//! the inbound event envelopes it classifies, the frames it pushes to live
//! connections, and the report returned by the reconciliation service.

pub mod event;
pub mod message;
pub mod reconcile;
