//! Mount lifecycle of one map: first fetch and self location, then the sink
//! report running beside the periodic poll until the map goes away.
//!
//! The collaborators are traits so the browser can plug in HTTP clients while
//! tests drive everything with in-memory fakes on a single thread.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::time::Duration;

use futures::future::{Either, select};

use crate::engine::MapEngine;
use crate::geolocation::{GeoLocation, GeolocationError};
use crate::record::{AttackRecord, SourceError};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long the first fetch waits on the geolocation service before the
/// session carries on without trajectories.
pub const GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError(pub String);

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sink error: {}", self.0)
    }
}

impl std::error::Error for SinkError {}

/// Current list of attack records.
pub trait AttackSource {
    fn fetch(&self) -> impl Future<Output = Result<Vec<AttackRecord>, SourceError>>;
}

/// The viewer's own public location.
pub trait Geolocator {
    fn locate(&self) -> impl Future<Output = Result<GeoLocation, GeolocationError>>;
}

/// Destination of the enriched record list.
pub trait RecordSink {
    fn save(&self, records: Vec<AttackRecord>) -> impl Future<Output = Result<(), SinkError>>;
}

/// Shared "still on screen" flag checked before every piece of async work.
#[derive(Debug, Clone)]
pub struct MountGuard(Rc<Cell<bool>>);

impl Default for MountGuard {
    fn default() -> Self {
        Self(Rc::new(Cell::new(true)))
    }
}

impl MountGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounted(&self) -> bool {
        self.0.get()
    }

    pub fn unmount(&self) {
        self.0.set(false);
    }
}

/// Sleep `interval`, then run `tick`, for as long as `guard` stays mounted.
///
/// The guard is checked after every sleep, so no tick starts once the owner
/// has unmounted.
pub async fn poll_until_unmounted<S, SFut, T, TFut>(
    guard: &MountGuard,
    interval: Duration,
    sleep: S,
    mut tick: T,
) where
    S: Fn(Duration) -> SFut,
    SFut: Future<Output = ()>,
    T: FnMut() -> TFut,
    TFut: Future,
{
    while guard.is_mounted() {
        sleep(interval).await;
        if !guard.is_mounted() {
            break;
        }
        tick().await;
    }
}

pub struct MapSession<S, G, K, C> {
    engine: Rc<RefCell<MapEngine>>,
    source: S,
    geolocator: G,
    sink: K,
    clock: C,
    guard: MountGuard,
}

impl<S, G, K, C> MapSession<S, G, K, C>
where
    S: AttackSource,
    G: Geolocator,
    K: RecordSink,
    C: Fn() -> f64,
{
    /// `clock` returns the animation time in milliseconds.
    pub fn new(
        engine: Rc<RefCell<MapEngine>>,
        source: S,
        geolocator: G,
        sink: K,
        clock: C,
    ) -> Self {
        Self {
            engine,
            source,
            geolocator,
            sink,
            clock,
            guard: MountGuard::new(),
        }
    }

    pub fn engine(&self) -> Rc<RefCell<MapEngine>> {
        Rc::clone(&self.engine)
    }

    pub fn guard(&self) -> MountGuard {
        self.guard.clone()
    }

    /// First fetch and self location run concurrently, the location raced
    /// against [`GEOLOCATION_TIMEOUT`] on `sleep`. The location is applied
    /// before the batch so the first records already get their trajectories.
    pub async fn mount<F, Fut>(&self, sleep: &F)
    where
        F: Fn(Duration) -> Fut,
        Fut: Future<Output = ()>,
    {
        if !self.guard.is_mounted() {
            return;
        }
        let located = async {
            match select(pin!(self.geolocator.locate()), pin!(sleep(GEOLOCATION_TIMEOUT))).await {
                Either::Left((location, _)) => location,
                Either::Right(((), _)) => Err(GeolocationError::Transport(format!(
                    "no answer within {}s",
                    GEOLOCATION_TIMEOUT.as_secs()
                ))),
            }
        };
        let (batch, location) = futures::join!(self.source.fetch(), located);
        if !self.guard.is_mounted() {
            return;
        }

        let now = (self.clock)();
        let mut engine = self.engine.borrow_mut();
        engine.resolve_self(location, now);
        match batch {
            Ok(records) => {
                engine.ingest(&records, now);
            }
            Err(e) => tracing::warn!(error = %e, "initial attack fetch failed"),
        }
    }

    /// One poll cycle. Returns the number of newly started animations.
    pub async fn poll_once(&self) -> usize {
        if !self.guard.is_mounted() {
            return 0;
        }
        match self.source.fetch().await {
            Ok(records) => {
                if !self.guard.is_mounted() {
                    return 0;
                }
                let now = (self.clock)();
                self.engine.borrow_mut().ingest(&records, now)
            }
            Err(e) => {
                tracing::warn!(error = %e, "attack poll failed");
                0
            }
        }
    }

    /// Send the full record list to the sink. Failures are logged only.
    pub async fn report(&self) {
        let payload = self.engine.borrow().sink_payload();
        let count = payload.len();
        match self.sink.save(payload).await {
            Ok(()) => tracing::debug!(records = count, "reported records to sink"),
            Err(e) => tracing::warn!(error = %e, records = count, "sink report failed"),
        }
    }

    pub fn unmount(&self) {
        self.guard.unmount();
        self.engine.borrow_mut().unmount();
    }

    /// Mount, then report to the sink while polling every `interval` until
    /// unmounted. `notify` fires whenever new records become visible.
    ///
    /// A sink that never answers holds up nothing but itself.
    pub async fn run<F, Fut, N>(&self, interval: Duration, sleep: F, notify: N)
    where
        F: Fn(Duration) -> Fut,
        Fut: Future<Output = ()>,
        N: Fn(),
    {
        self.mount(&sleep).await;
        if !self.guard.is_mounted() {
            return;
        }
        notify();

        let notify = &notify;
        let report = pin!(self.report());
        let polling = pin!(poll_until_unmounted(&self.guard, interval, &sleep, move || {
            async move {
                if self.poll_once().await > 0 {
                    notify();
                }
            }
        }));
        if let Either::Left(((), polling)) = select(report, polling).await {
            polling.await;
        }
    }
}
