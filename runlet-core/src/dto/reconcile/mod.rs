//! Reconciliation report DTOs

use serde::{Deserialize, Serialize};

/// Summary returned by the health reconciliation service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Executions inspected
    pub checked: u32,
    /// Executions whose state was corrected
    pub repaired: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}
