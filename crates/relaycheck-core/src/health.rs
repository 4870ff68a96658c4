//! Liveness report.

use serde::{Deserialize, Serialize};

/// Health report for the validator service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Always `"healthy"` while the process can answer.
    pub status: String,
    /// Service name.
    pub service: String,
}

/// Reports the service as healthy.
#[must_use]
pub fn health() -> Health {
    Health {
        status: "healthy".to_string(),
        service: "relaycheck".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reports_healthy() {
        let json = serde_json::to_value(health()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "healthy", "service": "relaycheck"}));
    }
}
