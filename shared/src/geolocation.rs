use serde::{Deserialize, Serialize};

/// Response of the public IP geolocation service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(default)]
    pub ip: String,
    /// `"lat,lon"` in degrees.
    #[serde(default)]
    pub loc: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeolocationError {
    Transport(String),
    MalformedLoc(String),
}

impl std::fmt::Display for GeolocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "geolocation request failed: {e}"),
            Self::MalformedLoc(loc) => write!(f, "malformed geolocation loc {loc:?}"),
        }
    }
}

impl std::error::Error for GeolocationError {}

impl GeoLocation {
    /// Parse `loc` into `(latitude, longitude)`.
    pub fn coordinates(&self) -> Result<(f64, f64), GeolocationError> {
        let malformed = || GeolocationError::MalformedLoc(self.loc.clone());
        let (lat, lon) = self.loc.split_once(',').ok_or_else(malformed)?;
        let lat: f64 = lat.trim().parse().map_err(|_| malformed())?;
        let lon: f64 = lon.trim().parse().map_err(|_| malformed())?;
        if !lat.is_finite() || !lon.is_finite() {
            return Err(malformed());
        }
        Ok((lat, lon))
    }
}
