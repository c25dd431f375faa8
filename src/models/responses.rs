//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for DELETE /entities/:entity/:id
#[derive(Debug, Clone, Serialize)]
pub struct EntityInvalidatedResponse {
    pub entity: String,
    pub id: String,
    /// Number of cache entries the entity index listed
    pub invalidated: u64,
}

impl EntityInvalidatedResponse {
    pub fn new(entity: impl Into<String>, id: impl Into<String>, invalidated: u64) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
            invalidated,
        }
    }
}

/// Response body for GET /entities/:entity/:id
#[derive(Debug, Clone, Serialize)]
pub struct ReferencesResponse {
    pub entity: String,
    pub id: String,
    /// Cache keys currently referencing the entity
    pub keys: Vec<String>,
}

impl ReferencesResponse {
    pub fn new(entity: impl Into<String>, id: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
            keys,
        }
    }
}

/// Response body for DELETE /functions/:name and DELETE /all
#[derive(Debug, Clone, Serialize)]
pub struct InvalidatedResponse {
    /// Success message
    pub message: String,
    /// Number of keys removed
    pub invalidated: u64,
}

impl InvalidatedResponse {
    pub fn new(scope: &str, invalidated: u64) -> Self {
        Self {
            message: format!("Invalidated {} keys for {}", invalidated, scope),
            invalidated,
        }
    }
}

/// Response body for POST /calls/invalidate
#[derive(Debug, Clone, Serialize)]
pub struct CallInvalidatedResponse {
    /// False only when the backend could not be reached
    pub invalidated: bool,
    pub key: String,
}

/// Response body for POST /calls/key
#[derive(Debug, Clone, Serialize)]
pub struct KeyResponse {
    pub key: String,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Backend the engine runs on
    pub backend: String,
    /// Engine counters
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    /// Creates a new StatsResponse from cache statistics
    pub fn new(backend: impl Into<String>, stats: CacheStats) -> Self {
        Self {
            backend: backend.into(),
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_response_serialize() {
        let resp = EntityInvalidatedResponse::new("user", "42", 3);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"entity\":\"user\""));
        assert!(json.contains("\"invalidated\":3"));
    }

    #[test]
    fn test_invalidated_response_message() {
        let resp = InvalidatedResponse::new("app.get_user", 2);
        assert_eq!(resp.message, "Invalidated 2 keys for app.get_user");
    }

    #[test]
    fn test_stats_response_flattens_counters() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..CacheStats::default()
        };
        let resp = StatsResponse::new("memory", stats);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"hits\":80"));
        assert!(json.contains("\"backend\":\"memory\""));
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let json = serde_json::to_string(&ErrorResponse::new("boom")).unwrap();
        assert_eq!(json, r#"{"error":"boom"}"#);
    }
}
