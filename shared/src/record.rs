use serde::{Deserialize, Serialize};

/// Reserved id of the record synthesized for the viewer's own location.
pub const SELF_ID: &str = "self";
/// Raw `type` value carried by the self record.
pub const SELF_TYPE: &str = "Self";

/// One detected attack event as served by the data source.
///
/// Coordinates and country default when missing so a malformed entry still
/// renders somewhere instead of failing the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_degrees")]
    pub latitude: f64,
    #[serde(default, deserialize_with = "lenient_degrees")]
    pub longitude: f64,
    #[serde(default)]
    pub country: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl AttackRecord {
    /// Build the viewer's own record from a resolved location.
    pub fn self_record(ip: String, country: String, latitude: f64, longitude: f64) -> Self {
        Self {
            id: SELF_ID.to_string(),
            latitude,
            longitude,
            country,
            kind: Some(SELF_TYPE.to_string()),
            ip: Some(ip),
        }
    }

    pub fn kind(&self) -> AttackKind {
        AttackKind::classify(self.kind.as_deref())
    }

    pub fn is_self(&self) -> bool {
        self.kind() == AttackKind::SelfLocation
    }

    /// `(longitude, latitude)`, the argument order of the projection.
    pub fn position(&self) -> (f64, f64) {
        (self.longitude, self.latitude)
    }
}

/// Marker classification used by the map. Anything unrecognized is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttackKind {
    Botnet,
    Trojan,
    Other,
    SelfLocation,
}

impl AttackKind {
    pub fn classify(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("Botnet") => Self::Botnet,
            Some("Trojan") => Self::Trojan,
            Some(SELF_TYPE) => Self::SelfLocation,
            _ => Self::Other,
        }
    }

    /// Marker fill as (r, g, b).
    pub fn marker_rgb(self) -> (u8, u8, u8) {
        match self {
            Self::SelfLocation => (255, 0, 0),
            Self::Botnet => (255, 165, 0),
            Self::Trojan => (255, 255, 0),
            Self::Other => (0, 128, 0),
        }
    }

    /// Trajectory gradient color. Self never draws a trajectory, so it shares
    /// the catch-all color.
    pub fn trajectory_rgb(self) -> (u8, u8, u8) {
        match self {
            Self::Botnet => (255, 165, 0),
            Self::Trojan => (255, 255, 0),
            Self::Other | Self::SelfLocation => (0, 128, 0),
        }
    }
}

/// Feeds sometimes carry numeric ids; both forms name the same record.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Numbers, numeric strings and `null` all decode; anything else becomes 0.
fn lenient_degrees<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError(pub String);

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data source error: {}", self.0)
    }
}

impl std::error::Error for SourceError {}

/// Decode a data-source payload, skipping elements that are not records.
///
/// Only a payload that is not a JSON array at all is an error; a single bad
/// element is dropped with a warning.
pub fn parse_feed(payload: &str) -> Result<Vec<AttackRecord>, SourceError> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(payload).map_err(|e| SourceError(format!("parse error: {e}")))?;
    Ok(records_from_values(values))
}

pub fn records_from_values(values: Vec<serde_json::Value>) -> Vec<AttackRecord> {
    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<AttackRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(index, error = %e, "skipping malformed attack record"),
        }
    }
    records
}
