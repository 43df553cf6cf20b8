//! Typed JSON request dispatch.
//!
//! The four data endpoints share one body shape. Which computation runs is
//! decided by the route that accepted the request, carried here as a
//! [`RequestKind`] rather than re-derived from the URL at runtime.

use std::fmt;

use serde_json::{Map, Value};

/// Top-level collections the engine fills when a request matched something.
pub const RESULT_COLLECTIONS: [&str; 4] = ["items", "models", "asset_impacts", "risk_measures"];

/// Field the access tier is injected into before forwarding.
const GROUP_IDS_FIELD: &str = "group_ids";

// =============================================================================
// Request Kind
// =============================================================================

/// The JSON request kinds served by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Hazard indicator values at locations
    HazardData,

    /// Which hazard indicators exist for which scenarios/years
    HazardDataAvailability,

    /// Exposure of a portfolio of assets
    AssetExposure,

    /// Impacts and risk measures for a portfolio of assets
    AssetImpact,
}

impl RequestKind {
    /// All request kinds, in route order.
    pub const ALL: [RequestKind; 4] = [
        RequestKind::HazardData,
        RequestKind::HazardDataAvailability,
        RequestKind::AssetExposure,
        RequestKind::AssetImpact,
    ];

    /// Identifier understood by the engine (also the final path segment).
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::HazardData => "get_hazard_data",
            RequestKind::HazardDataAvailability => "get_hazard_data_availability",
            RequestKind::AssetExposure => "get_asset_exposure",
            RequestKind::AssetImpact => "get_asset_impact",
        }
    }

    /// Route path for this kind, relative to `/api`.
    pub fn route(&self) -> String {
        format!("/{}", self.as_str())
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Request Envelope
// =============================================================================

/// A decoded request body bound to its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    kind: RequestKind,
    body: Map<String, Value>,
}

impl RequestEnvelope {
    /// Decode a raw body. Anything but a JSON object is rejected.
    pub fn from_slice(kind: RequestKind, body: &[u8]) -> Result<Self, serde_json::Error> {
        let body: Map<String, Value> = serde_json::from_slice(body)?;
        Ok(Self { kind, body })
    }

    /// Restrict the request to a single access group.
    ///
    /// Overwrites any `group_ids` the caller supplied.
    pub fn set_group_ids(&mut self, group: impl Into<String>) {
        self.body.insert(
            GROUP_IDS_FIELD.to_string(),
            Value::Array(vec![Value::String(group.into())]),
        );
    }

    pub fn into_parts(self) -> (RequestKind, Map<String, Value>) {
        (self.kind, self.body)
    }
}

// =============================================================================
// Computation Result
// =============================================================================

/// A parsed engine response.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputationResult(Map<String, Value>);

impl ComputationResult {
    /// Parse engine output. Anything but a JSON object is rejected.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw).map(Self)
    }

    /// Whether any recognized result collection is populated.
    pub fn has_results(&self) -> bool {
        RESULT_COLLECTIONS
            .iter()
            .any(|key| self.0.get(*key).is_some_and(is_populated))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

// =============================================================================
// Tests
// =============================================================================
