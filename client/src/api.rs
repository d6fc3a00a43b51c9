use std::future::Future;

use gloo_net::http::Request;

use attack_map_shared::{
    AttackRecord, AttackSource, GeoLocation, GeolocationError, Geolocator, RecordSink,
    SinkError, SourceError, records_from_values,
};

pub const ATTACKERS_URL: &str = "/api/attackers";
pub const SAVE_ATTACKERS_URL: &str = "/api/attackers/save";
pub const GEOLOCATION_URL: &str = "https://ipinfo.io/json";
pub const WORLD_TOPOLOGY_URL: &str = "/world-110m.json";

/// Fetch the current attack list. Elements that are not records are dropped.
pub async fn fetch_attackers() -> Result<Vec<AttackRecord>, String> {
    let resp = Request::get(ATTACKERS_URL)
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;

    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }

    let values = resp
        .json::<Vec<serde_json::Value>>()
        .await
        .map_err(|e| format!("parse error: {e}"))?;
    Ok(records_from_values(values))
}

pub async fn fetch_location() -> Result<GeoLocation, String> {
    let resp = Request::get(GEOLOCATION_URL)
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;

    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }

    resp.json::<GeoLocation>()
        .await
        .map_err(|e| format!("parse error: {e}"))
}

pub async fn save_records(records: &[AttackRecord]) -> Result<(), String> {
    let resp = Request::post(SAVE_ATTACKERS_URL)
        .json(records)
        .map_err(|e| format!("encode error: {e}"))?
        .send()
        .await
        .map_err(|e| format!("send error: {e}"))?;

    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }
    Ok(())
}

/// Raw TopoJSON text of the base map.
pub async fn fetch_world_topology() -> Result<String, String> {
    let resp = Request::get(WORLD_TOPOLOGY_URL)
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;

    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }

    resp.text().await.map_err(|e| format!("read error: {e}"))
}

pub struct HttpAttackSource;

impl AttackSource for HttpAttackSource {
    fn fetch(&self) -> impl Future<Output = Result<Vec<AttackRecord>, SourceError>> {
        async { fetch_attackers().await.map_err(SourceError) }
    }
}

pub struct IpInfoGeolocator;

impl Geolocator for IpInfoGeolocator {
    fn locate(&self) -> impl Future<Output = Result<GeoLocation, GeolocationError>> {
        async { fetch_location().await.map_err(GeolocationError::Transport) }
    }
}

pub struct HttpRecordSink;

impl RecordSink for HttpRecordSink {
    fn save(&self, records: Vec<AttackRecord>) -> impl Future<Output = Result<(), SinkError>> {
        async move { save_records(&records).await.map_err(SinkError) }
    }
}
