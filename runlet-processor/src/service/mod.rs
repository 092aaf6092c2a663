//! Service Module
//!
//! Business logic of the execution processor. Services depend only on the
//! store and outbound traits and thread a [`crate::context::RequestContext`]
//! through every call.

pub mod classifier;
pub mod delivery;
pub mod execution;
pub mod ingest;
pub mod reconcile;
pub mod token;

// Re-export for convenience
pub use delivery::DeliveryService;
pub use execution::ExecutionService;
pub use ingest::IngestService;
pub use reconcile::ReconcileService;
pub use token::TokenService;
