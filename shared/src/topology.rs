//! Decoding of the static world TopoJSON document into country shapes.

use geo::{Geometry, MultiPolygon};
use geojson::feature::Id;
use topojson::{TopoJson, to_geojson};

/// Object inside the topology that holds the country boundaries.
pub const COUNTRIES_OBJECT: &str = "countries";

#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub name: String,
    /// Outline in `(longitude, latitude)` degrees.
    pub shape: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    Parse(String),
    MissingObject(String),
    ArcOutOfRange(i64),
    Geometry(String),
}

impl std::fmt::Display for TopologyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "topology parse error: {e}"),
            Self::MissingObject(name) => write!(f, "topology has no object named {name:?}"),
            Self::ArcOutOfRange(index) => write!(f, "arc index {index} is out of range"),
            Self::Geometry(e) => write!(f, "unusable country geometry: {e}"),
        }
    }
}

impl std::error::Error for TopologyError {}

/// Decode the `countries` object of a TopoJSON document.
pub fn decode_countries(json: &str) -> Result<Vec<Country>, TopologyError> {
    decode_object(json, COUNTRIES_OBJECT)
}

pub fn decode_object(json: &str, object: &str) -> Result<Vec<Country>, TopologyError> {
    let raw: serde_json::Value =
        serde_json::from_str(json).map_err(|e| TopologyError::Parse(e.to_string()))?;
    let root = raw
        .get("objects")
        .and_then(|objects| objects.get(object))
        .ok_or_else(|| TopologyError::MissingObject(object.to_string()))?;
    let arc_count = raw
        .get("arcs")
        .and_then(serde_json::Value::as_array)
        .map_or(0, Vec::len);
    check_arc_indices(root, arc_count)?;

    let topology = match json.parse::<TopoJson>() {
        Ok(TopoJson::Topology(topology)) => topology,
        Ok(_) => return Err(TopologyError::Parse("document is not a Topology".to_string())),
        Err(e) => return Err(TopologyError::Parse(e.to_string())),
    };
    let features = to_geojson(&topology, &object.to_string())
        .map_err(|e| TopologyError::Geometry(e.to_string()))?;

    let mut countries = Vec::new();
    for feature in features.features {
        let name = country_name(&feature);
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry: Geometry<f64> = geometry
            .value
            .try_into()
            .map_err(|e: geojson::Error| TopologyError::Geometry(e.to_string()))?;
        let shape = match geometry {
            Geometry::Polygon(polygon) => polygon.into(),
            Geometry::MultiPolygon(multi) => multi,
            _ => continue,
        };
        countries.push(Country { name, shape });
    }
    Ok(countries)
}

/// Arc references are resolved by index; a dangling one is a malformed
/// document, not something to stitch around.
fn check_arc_indices(geometry: &serde_json::Value, arc_count: usize) -> Result<(), TopologyError> {
    if let Some(children) = geometry.get("geometries").and_then(|g| g.as_array()) {
        for child in children {
            check_arc_indices(child, arc_count)?;
        }
    }
    if let Some(arcs) = geometry.get("arcs") {
        check_index_tree(arcs, arc_count)?;
    }
    Ok(())
}

fn check_index_tree(node: &serde_json::Value, arc_count: usize) -> Result<(), TopologyError> {
    match node {
        serde_json::Value::Array(items) => items
            .iter()
            .try_for_each(|item| check_index_tree(item, arc_count)),
        serde_json::Value::Number(n) => {
            let index = n
                .as_i64()
                .ok_or_else(|| TopologyError::Parse(format!("arc index {n} is not an integer")))?;
            let resolved = if index < 0 { !index } else { index };
            match usize::try_from(resolved) {
                Ok(i) if i < arc_count => Ok(()),
                _ => Err(TopologyError::ArcOutOfRange(index)),
            }
        }
        other => Err(TopologyError::Parse(format!("unexpected arc reference {other}"))),
    }
}

fn country_name(feature: &geojson::Feature) -> String {
    if let Some(name) = feature.property("name").and_then(|v| v.as_str()) {
        return name.to_string();
    }
    match &feature.id {
        Some(Id::String(s)) => s.clone(),
        Some(Id::Number(n)) => n.to_string(),
        None => "Unknown".to_string(),
    }
}
