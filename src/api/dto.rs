//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tsdb::Query;

// ============================================
// QUERY DTOs
// ============================================

/// Query batch request
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// Lower bound, e.g. "6h", "now-6h" or epoch ms
    pub from: String,
    /// Upper bound, defaults to "now"
    #[serde(default = "default_to")]
    pub to: String,
    /// Target bucket count, overriding the server default
    #[serde(default)]
    pub resolution: Option<u32>,
    pub queries: Vec<QueryItem>,
}

fn default_to() -> String {
    "now".to_string()
}

/// One panel query; every field besides `refId` and `datasource` is the
/// backend-specific model
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryItem {
    #[serde(rename = "refId")]
    pub ref_id: String,
    /// Name of a configured data source
    pub datasource: String,
    #[serde(flatten)]
    pub model: Map<String, Value>,
}

impl QueryItem {
    pub fn into_query(self) -> Query {
        Query::new(self.ref_id, Value::Object(self.model))
    }
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: healthy, degraded
    pub status: String,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
    /// Registered backend types
    pub backends: Vec<String>,
    /// Number of configured data sources
    pub datasources: usize,
}
