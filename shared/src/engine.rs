//! Session-wide state of the attack map: which records were admitted, where
//! the viewer is, and the choreography running for each record.

use std::collections::HashSet;

use crate::choreography::{Choreography, Phase, RecordFrame};
use crate::geolocation::{GeoLocation, GeolocationError};
use crate::projection::Projection;
use crate::record::{AttackRecord, SELF_ID};
use crate::tracker::IngestionTracker;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelfLocation {
    Pending,
    Resolved { longitude: f64, latitude: f64 },
    Unresolved,
}

/// Everything visible on the map at one instant, in draw order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub records: Vec<RecordFrame>,
    /// At least one record still changes over time.
    pub animating: bool,
}

impl Scene {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug)]
pub struct MapEngine {
    projection: Projection,
    tracker: IngestionTracker,
    self_location: SelfLocation,
    /// Admitted source records in admission order.
    records: Vec<AttackRecord>,
    self_record: Option<AttackRecord>,
    /// Ids already turned away for claiming the self identity.
    rejected: HashSet<String>,
    choreographies: Vec<Choreography>,
    mounted: bool,
    started: usize,
}

impl Default for MapEngine {
    fn default() -> Self {
        Self::new(Projection::default())
    }
}

impl MapEngine {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            tracker: IngestionTracker::new(),
            self_location: SelfLocation::Pending,
            records: Vec::new(),
            self_record: None,
            rejected: HashSet::new(),
            choreographies: Vec::new(),
            mounted: true,
            started: 0,
        }
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn self_location(&self) -> SelfLocation {
        self.self_location
    }

    pub fn self_record(&self) -> Option<&AttackRecord> {
        self.self_record.as_ref()
    }

    /// Projected viewer position, the end point of every trajectory.
    pub fn destination(&self) -> Option<(f64, f64)> {
        match self.self_location {
            SelfLocation::Resolved {
                longitude,
                latitude,
            } => Some(self.projection.project(longitude, latitude)),
            SelfLocation::Pending | SelfLocation::Unresolved => None,
        }
    }

    /// Admit a polled batch and start a choreography for every record not
    /// seen before. Returns how many started.
    ///
    /// Records claiming the reserved self identity are ignored; only
    /// [`resolve_self`](Self::resolve_self) creates that record.
    pub fn ingest(&mut self, batch: &[AttackRecord], now: f64) -> usize {
        if !self.mounted {
            return 0;
        }
        let mut candidates: Vec<AttackRecord> = Vec::with_capacity(batch.len());
        for record in batch {
            if record.id == SELF_ID || record.is_self() {
                if self.rejected.insert(record.id.clone()) {
                    tracing::warn!(id = %record.id, "ignoring source record with reserved self identity");
                }
                continue;
            }
            candidates.push(record.clone());
        }

        let admitted = self.tracker.admit(&candidates);
        let destination = self.destination();
        for record in &admitted {
            self.choreographies.push(Choreography::new(
                record,
                &self.projection,
                destination,
                now,
            ));
        }
        let count = admitted.len();
        self.records.extend(admitted);
        self.started += count;
        if count > 0 {
            tracing::debug!(admitted = count, total = self.tracker.len(), "admitted attack records");
        }
        count
    }

    /// Apply the one geolocation attempt of this session.
    ///
    /// Returns `false` when the attempt was ignored because the location was
    /// already decided or the map is unmounted.
    pub fn resolve_self(
        &mut self,
        result: Result<GeoLocation, GeolocationError>,
        now: f64,
    ) -> bool {
        if !self.mounted {
            return false;
        }
        if self.self_location != SelfLocation::Pending {
            tracing::debug!("self location already decided, ignoring");
            return false;
        }

        match result.and_then(|location| location.coordinates().map(|c| (location, c))) {
            Ok((location, (latitude, longitude))) => {
                self.self_location = SelfLocation::Resolved {
                    longitude,
                    latitude,
                };
                let record =
                    AttackRecord::self_record(location.ip, location.country, latitude, longitude);
                // Mark the reserved id as handled so it can only ever animate once.
                self.tracker.admit(std::slice::from_ref(&record));
                let destination = self.destination();
                self.choreographies.push(Choreography::new(
                    &record,
                    &self.projection,
                    destination,
                    now,
                ));
                self.started += 1;
                tracing::info!(latitude, longitude, "self location resolved");
                self.self_record = Some(record);
            }
            Err(e) => {
                self.self_location = SelfLocation::Unresolved;
                tracing::warn!(error = %e, "self location unavailable, trajectories disabled");
            }
        }
        true
    }

    /// Admitted records followed by the self record, if any.
    pub fn records(&self) -> impl Iterator<Item = &AttackRecord> {
        self.records.iter().chain(self.self_record.iter())
    }

    /// Full record list as sent to the persistence sink.
    pub fn sink_payload(&self) -> Vec<AttackRecord> {
        self.records().cloned().collect()
    }

    /// Number of choreographies ever started.
    /// Distinct source ids refused for claiming the self identity.
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn started(&self) -> usize {
        self.started
    }

    pub fn phase_of(&self, id: &str, now: f64) -> Option<Phase> {
        match self.choreographies.iter().find(|c| c.id() == id) {
            Some(choreography) => Some(choreography.phase(now)),
            None if self.tracker.contains(id) => Some(Phase::Removed),
            None => None,
        }
    }

    /// Describe the map at `now`, dropping choreographies that have finished.
    pub fn scene(&mut self, now: f64) -> Scene {
        if !self.mounted {
            return Scene::default();
        }
        self.choreographies.retain(|c| !c.is_removed(now));
        let records: Vec<RecordFrame> = self
            .choreographies
            .iter()
            .filter_map(|c| c.frame(now))
            .collect();
        let animating = self.choreographies.iter().any(|c| c.is_animating(now));
        Scene { records, animating }
    }

    pub fn is_animating(&self, now: f64) -> bool {
        self.mounted && self.choreographies.iter().any(|c| c.is_animating(now))
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Stop all further work; every later call is a no-op.
    pub fn unmount(&mut self) {
        self.mounted = false;
        self.choreographies.clear();
    }
}
