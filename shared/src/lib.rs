pub mod animation;
pub mod choreography;
pub mod engine;
pub mod geolocation;
pub mod projection;
pub mod record;
pub mod session;
pub mod tally;
pub mod topology;
pub mod tracker;

pub use choreography::{Phase, RecordFrame};
pub use engine::{MapEngine, Scene, SelfLocation};
pub use geolocation::{GeoLocation, GeolocationError};
pub use projection::{MapViewBox, Projection};
pub use record::*;
pub use session::{
    AttackSource, GEOLOCATION_TIMEOUT, Geolocator, MapSession, MountGuard, POLL_INTERVAL, RecordSink,
    SinkError,
};
pub use tally::{AttackCategory, Tally, tally};
pub use topology::{Country, TopologyError, decode_countries};
