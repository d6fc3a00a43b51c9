//! Per-record animation state machine.
//!
//! A [`Choreography`] never mutates while it plays: its phase and everything
//! drawn for it are derived from the time elapsed since the record was
//! admitted. The renderer asks for a [`RecordFrame`] each animation frame and
//! draws exactly that.

use crate::animation::{Tween, cubic_ease_in_out, cubic_ease_out, lerp};
use crate::projection::Projection;
use crate::record::{AttackKind, AttackRecord};

pub const APPEAR_MS: f64 = 250.0;
pub const DRAW_MS: f64 = 3_000.0;
pub const HOLD_MS: f64 = 1_000.0;
pub const FADE_MS: f64 = 2_000.0;
pub const RIPPLE_MS: f64 = 1_000.0;
pub const BLINK_MS: f64 = 1_000.0;

pub const MARKER_RADIUS: f64 = 5.0;
pub const RIPPLE_MAX_RADIUS: f64 = 30.0;
pub const BLINK_OPACITY: f64 = 0.8;
pub const TRAJECTORY_WIDTH: f64 = 3.0;
/// Label anchor relative to the marker centre.
pub const LABEL_OFFSET: (f64, f64) = (8.0, 4.0);

/// Control point offsets from the source/destination midpoint.
const CONTROL_OFFSETS: [(f64, f64); 2] = [(50.0, -50.0), (-50.0, -100.0)];
const BUNDLE_BETA: f64 = 0.5;
const SAMPLES_PER_SEGMENT: usize = 16;

pub const ATTACK_RIPPLE_RGB: (u8, u8, u8) = (255, 0, 0);
pub const SELF_RIPPLE_RGB: (u8, u8, u8) = (30, 144, 255);
pub const BLINK_RGB: (u8, u8, u8) = (255, 0, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Appearing,
    TrajectoryDrawing,
    Holding,
    FadingOut,
    Removed,
    /// Terminal state for records that stay on the map without moving.
    Idle,
}

/// Smooth curved path from an attack source to the viewer, sampled into a
/// polyline.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    points: Vec<(f64, f64)>,
    /// Distance along the path at each point.
    distances: Vec<f64>,
}

impl Trajectory {
    pub fn between(source: (f64, f64), destination: (f64, f64)) -> Self {
        let mid = (
            (source.0 + destination.0) / 2.0,
            (source.1 + destination.1) / 2.0,
        );
        let controls = [
            source,
            (mid.0 + CONTROL_OFFSETS[0].0, mid.1 + CONTROL_OFFSETS[0].1),
            (mid.0 + CONTROL_OFFSETS[1].0, mid.1 + CONTROL_OFFSETS[1].1),
            destination,
        ];
        let points = basis_polyline(&bundle(&controls, BUNDLE_BETA));

        let mut distances = Vec::with_capacity(points.len());
        let mut total = 0.0;
        let mut previous: Option<(f64, f64)> = None;
        for &point in &points {
            if let Some(prev) = previous {
                total += distance(prev, point);
            }
            distances.push(total);
            previous = Some(point);
        }
        Self { points, distances }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn length(&self) -> f64 {
        self.distances.last().copied().unwrap_or(0.0)
    }

    pub fn start(&self) -> Option<(f64, f64)> {
        self.points.first().copied()
    }

    pub fn end(&self) -> Option<(f64, f64)> {
        self.points.last().copied()
    }

    /// The leading part of the path covering `fraction` of its length.
    pub fn revealed(&self, fraction: f64) -> Vec<(f64, f64)> {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction <= 0.0 || self.points.is_empty() {
            return Vec::new();
        }
        let total = self.length();
        if fraction >= 1.0 || total <= 0.0 {
            return self.points.clone();
        }

        let target = total * fraction;
        let mut out = vec![self.points[0]];
        for i in 1..self.points.len() {
            if self.distances[i] >= target {
                let span = self.distances[i] - self.distances[i - 1];
                let t = if span > 0.0 {
                    (target - self.distances[i - 1]) / span
                } else {
                    1.0
                };
                let (a, b) = (self.points[i - 1], self.points[i]);
                out.push((lerp(a.0, b.0, t), lerp(a.1, b.1, t)));
                break;
            }
            out.push(self.points[i]);
        }
        out
    }

    /// Axis-aligned bounds as (min, max); the gradient runs corner to corner.
    pub fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        let mut min = (f64::MAX, f64::MAX);
        let mut max = (f64::MIN, f64::MIN);
        for &(x, y) in &self.points {
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
        }
        (min, max)
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
}

/// Pull interior points toward the chord by `1 - beta`.
fn bundle(points: &[(f64, f64)], beta: f64) -> Vec<(f64, f64)> {
    let Some((&first, &last)) = points.first().zip(points.last()) else {
        return Vec::new();
    };
    let j = (points.len() - 1).max(1) as f64;
    points
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| {
            let t = i as f64 / j;
            (
                beta * x + (1.0 - beta) * (first.0 + t * (last.0 - first.0)),
                beta * y + (1.0 - beta) * (first.1 + t * (last.1 - first.1)),
            )
        })
        .collect()
}

/// Uniform cubic B-spline through clamped end points, flattened to a polyline.
fn basis_polyline(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    match points.len() {
        0 => return Vec::new(),
        1 | 2 => return points.to_vec(),
        _ => {}
    }
    let mut out = vec![points[0]];
    let (mut p0, mut p1) = (points[0], points[1]);
    out.push(((5.0 * p0.0 + p1.0) / 6.0, (5.0 * p0.1 + p1.1) / 6.0));
    for &p in &points[2..] {
        basis_segment(&mut out, p0, p1, p);
        p0 = p1;
        p1 = p;
    }
    basis_segment(&mut out, p0, p1, p1);
    out.push(p1);
    out
}

fn basis_segment(out: &mut Vec<(f64, f64)>, p0: (f64, f64), p1: (f64, f64), p: (f64, f64)) {
    let Some(&start) = out.last() else {
        return;
    };
    let c1 = ((2.0 * p0.0 + p1.0) / 3.0, (2.0 * p0.1 + p1.1) / 3.0);
    let c2 = ((p0.0 + 2.0 * p1.0) / 3.0, (p0.1 + 2.0 * p1.1) / 3.0);
    let end = (
        (p0.0 + 4.0 * p1.0 + p.0) / 6.0,
        (p0.1 + 4.0 * p1.1 + p.1) / 6.0,
    );
    for step in 1..=SAMPLES_PER_SEGMENT {
        let t = step as f64 / SAMPLES_PER_SEGMENT as f64;
        let u = 1.0 - t;
        let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
        out.push((
            a * start.0 + b * c1.0 + c * c2.0 + d * end.0,
            a * start.1 + b * c1.1 + c * c2.1 + d * end.1,
        ));
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Route {
    /// No destination: appear, then stay.
    Static,
    /// The viewer's own record: appear, ring at its own position, then stay.
    SelfArrival,
    Trajectory {
        trajectory: Trajectory,
        destination: (f64, f64),
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choreography {
    id: String,
    kind: AttackKind,
    label: String,
    source: (f64, f64),
    route: Route,
    started_at: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerFrame {
    pub center: (f64, f64),
    pub radius: f64,
    pub rgb: (u8, u8, u8),
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelFrame {
    pub anchor: (f64, f64),
    pub text: String,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathFrame {
    /// Revealed part of the trajectory.
    pub points: Vec<(f64, f64)>,
    pub rgb: (u8, u8, u8),
    pub opacity: f64,
    /// Gradient runs from `gradient.0` (half opacity) to `gradient.1` (full).
    pub gradient: ((f64, f64), (f64, f64)),
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RingFrame {
    pub center: (f64, f64),
    pub radius: f64,
    pub rgb: (u8, u8, u8),
    pub opacity: f64,
}

/// Everything drawn for one record at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFrame {
    pub id: String,
    pub phase: Phase,
    pub marker: MarkerFrame,
    pub label: LabelFrame,
    pub path: Option<PathFrame>,
    pub ripple: Option<RingFrame>,
    pub blink: Option<RingFrame>,
}

impl Choreography {
    /// Start the sequence for a freshly admitted record. `destination` is the
    /// viewer's projected position, if known.
    pub fn new(
        record: &AttackRecord,
        projection: &Projection,
        destination: Option<(f64, f64)>,
        now: f64,
    ) -> Self {
        let (lon, lat) = record.position();
        let source = projection.project(lon, lat);
        let kind = record.kind();
        let route = match (kind, destination) {
            (AttackKind::SelfLocation, _) => Route::SelfArrival,
            (_, Some(destination)) => Route::Trajectory {
                trajectory: Trajectory::between(source, destination),
                destination,
            },
            (_, None) => Route::Static,
        };
        Self {
            id: record.id.clone(),
            kind,
            label: record.country.clone(),
            source,
            route,
            started_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_trajectory(&self) -> bool {
        matches!(self.route, Route::Trajectory { .. })
    }

    fn appear(&self) -> Tween {
        Tween::new(self.started_at, APPEAR_MS)
    }

    fn draw(&self) -> Tween {
        Tween::new(self.appear().end(), DRAW_MS)
    }

    /// Moment the trajectory (or the self ring) reaches its destination.
    fn arrival(&self) -> f64 {
        match self.route {
            Route::Trajectory { .. } => self.draw().end(),
            Route::Static | Route::SelfArrival => self.appear().end(),
        }
    }

    fn hold(&self) -> Tween {
        Tween::new(self.arrival(), HOLD_MS)
    }

    fn fade(&self) -> Tween {
        Tween::new(self.hold().end(), FADE_MS)
    }

    pub fn phase(&self, now: f64) -> Phase {
        if now < self.appear().end() {
            return Phase::Appearing;
        }
        match self.route {
            Route::Static => Phase::Idle,
            Route::SelfArrival => {
                if now < self.arrival() + RIPPLE_MS {
                    Phase::Holding
                } else {
                    Phase::Idle
                }
            }
            Route::Trajectory { .. } => {
                if now < self.draw().end() {
                    Phase::TrajectoryDrawing
                } else if now < self.hold().end() {
                    Phase::Holding
                } else if now < self.fade().end() {
                    Phase::FadingOut
                } else {
                    Phase::Removed
                }
            }
        }
    }

    /// Still changing from frame to frame.
    pub fn is_animating(&self, now: f64) -> bool {
        !matches!(self.phase(now), Phase::Idle | Phase::Removed)
    }

    pub fn is_removed(&self, now: f64) -> bool {
        self.phase(now) == Phase::Removed
    }

    /// What to draw at `now`; `None` once the record has been removed.
    pub fn frame(&self, now: f64) -> Option<RecordFrame> {
        let phase = self.phase(now);
        if phase == Phase::Removed {
            return None;
        }

        let appear = self.appear().progress(now);
        let body_opacity = match self.route {
            Route::Trajectory { .. } => appear * (1.0 - self.fade().progress(now)),
            Route::Static | Route::SelfArrival => appear,
        };

        let marker = MarkerFrame {
            center: self.source,
            radius: MARKER_RADIUS,
            rgb: self.kind.marker_rgb(),
            opacity: body_opacity,
        };
        let label = LabelFrame {
            anchor: (self.source.0 + LABEL_OFFSET.0, self.source.1 + LABEL_OFFSET.1),
            text: self.label.clone(),
            opacity: body_opacity,
        };

        let (path, ripple, blink) = match &self.route {
            Route::Static => (None, None, None),
            Route::SelfArrival => (
                None,
                ripple_at(self.source, self.arrival(), SELF_RIPPLE_RGB, now),
                None,
            ),
            Route::Trajectory {
                trajectory,
                destination,
            } => {
                let arrival = self.arrival();
                (
                    self.path_frame(trajectory, now),
                    ripple_at(*destination, arrival, ATTACK_RIPPLE_RGB, now),
                    blink_at(*destination, arrival, now),
                )
            }
        };

        Some(RecordFrame {
            id: self.id.clone(),
            phase,
            marker,
            label,
            path,
            ripple,
            blink,
        })
    }

    fn path_frame(&self, trajectory: &Trajectory, now: f64) -> Option<PathFrame> {
        let draw = self.draw();
        if now < draw.start {
            return None;
        }
        let path_fade = Tween::new(draw.end(), FADE_MS);
        if now >= path_fade.end() {
            return None;
        }
        let reveal = cubic_ease_in_out(draw.progress(now));
        let points = trajectory.revealed(reveal);
        if points.is_empty() {
            return None;
        }
        Some(PathFrame {
            points,
            rgb: self.kind.trajectory_rgb(),
            opacity: 1.0 - path_fade.progress(now),
            gradient: trajectory.bounds(),
            width: TRAJECTORY_WIDTH,
        })
    }
}

/// Expanding, fading ring starting at `start`.
fn ripple_at(center: (f64, f64), start: f64, rgb: (u8, u8, u8), now: f64) -> Option<RingFrame> {
    let tween = Tween::new(start, RIPPLE_MS);
    if !tween.is_running(now) {
        return None;
    }
    let t = cubic_ease_out(tween.progress(now));
    Some(RingFrame {
        center,
        radius: RIPPLE_MAX_RADIUS * t,
        rgb,
        opacity: 1.0 - t,
    })
}

/// Dot that dims to nothing and comes back once before it is removed.
fn blink_at(center: (f64, f64), start: f64, now: f64) -> Option<RingFrame> {
    let tween = Tween::new(start, BLINK_MS);
    if !tween.is_running(now) {
        return None;
    }
    let t = tween.progress(now);
    let opacity = if t < 0.5 {
        BLINK_OPACITY * (1.0 - t * 2.0)
    } else {
        BLINK_OPACITY * (t - 0.5) * 2.0
    };
    Some(RingFrame {
        center,
        radius: MARKER_RADIUS,
        rgb: BLINK_RGB,
        opacity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attack(id: &str, kind: Option<&str>) -> AttackRecord {
        AttackRecord {
            id: id.to_string(),
            latitude: 10.0,
            longitude: 20.0,
            country: "X".to_string(),
            kind: kind.map(str::to_string),
            ip: None,
        }
    }

    fn destination() -> (f64, f64) {
        Projection::default().project(6.0, 5.0)
    }

    #[test]
    fn trajectory_record_walks_every_phase_in_order() {
        let c = Choreography::new(&attack("a1", Some("Botnet")), &Projection::default(), Some(destination()), 0.0);
        let arrival = APPEAR_MS + DRAW_MS;
        assert_eq!(c.phase(0.0), Phase::Appearing);
        assert_eq!(c.phase(APPEAR_MS), Phase::TrajectoryDrawing);
        assert_eq!(c.phase(arrival - 1.0), Phase::TrajectoryDrawing);
        assert_eq!(c.phase(arrival), Phase::Holding);
        assert_eq!(c.phase(arrival + HOLD_MS), Phase::FadingOut);
        assert_eq!(c.phase(arrival + HOLD_MS + FADE_MS), Phase::Removed);
        assert!(c.frame(arrival + HOLD_MS + FADE_MS).is_none());
        assert!(c.is_removed(1e9));
    }

    #[test]
    fn record_without_destination_stays_static() {
        let c = Choreography::new(&attack("a1", Some("Trojan")), &Projection::default(), None, 0.0);
        assert!(!c.has_trajectory());
        assert_eq!(c.phase(0.0), Phase::Appearing);
        for now in [APPEAR_MS, 5_000.0, 60_000.0] {
            assert_eq!(c.phase(now), Phase::Idle);
            let frame = c.frame(now).expect("static record stays drawn");
            assert!(frame.path.is_none());
            assert!(frame.ripple.is_none());
            assert!(frame.blink.is_none());
            assert_eq!(frame.marker.opacity, 1.0);
            assert_eq!(frame.label.text, "X");
        }
        assert!(!c.is_animating(APPEAR_MS));
    }

    #[test]
    fn self_record_never_gets_a_trajectory() {
        let me = AttackRecord::self_record("1.2.3.4".into(), "Y".into(), 5.0, 6.0);
        let c = Choreography::new(&me, &Projection::default(), Some(destination()), 0.0);
        assert!(!c.has_trajectory());

        let holding = c.frame(APPEAR_MS + 10.0).expect("self stays drawn");
        assert_eq!(holding.phase, Phase::Holding);
        assert!(holding.path.is_none());
        assert!(holding.blink.is_none());
        let ring = holding.ripple.expect("self-arrival ring");
        assert_eq!(ring.rgb, SELF_RIPPLE_RGB);

        let later = c.frame(60_000.0).expect("self marker never fades");
        assert_eq!(later.phase, Phase::Idle);
        assert_eq!(later.marker.opacity, 1.0);
        assert_eq!(later.marker.rgb, (255, 0, 0));
    }

    #[test]
    fn path_reveals_progressively_then_fades() {
        let c = Choreography::new(&attack("a1", Some("Botnet")), &Projection::default(), Some(destination()), 0.0);
        let early = c.frame(APPEAR_MS + DRAW_MS * 0.1).and_then(|f| f.path).expect("path");
        let late = c.frame(APPEAR_MS + DRAW_MS * 0.9).and_then(|f| f.path).expect("path");
        assert!(early.points.len() < late.points.len());
        assert_eq!(early.opacity, 1.0);
        assert_eq!(early.rgb, (255, 165, 0));

        let arrival = APPEAR_MS + DRAW_MS;
        let fading = c.frame(arrival + FADE_MS / 2.0).and_then(|f| f.path).expect("fading path");
        assert!((fading.opacity - 0.5).abs() < 1e-9);
        assert!(c.frame(arrival + FADE_MS + 1.0).and_then(|f| f.path).is_none());
    }

    #[test]
    fn arrival_plays_ripple_and_blink_at_destination() {
        let dest = destination();
        let c = Choreography::new(&attack("a1", None), &Projection::default(), Some(dest), 0.0);
        let frame = c.frame(APPEAR_MS + DRAW_MS + 100.0).expect("frame");
        let ripple = frame.ripple.expect("ripple");
        let blink = frame.blink.expect("blink");
        assert_eq!(ripple.center, dest);
        assert_eq!(ripple.rgb, ATTACK_RIPPLE_RGB);
        assert!(ripple.radius > 0.0 && ripple.radius < RIPPLE_MAX_RADIUS);
        assert_eq!(blink.center, dest);
        assert!(blink.opacity < BLINK_OPACITY);
        assert!(c.frame(APPEAR_MS + DRAW_MS - 1.0).expect("frame").ripple.is_none());
    }

    #[test]
    fn marker_and_label_fade_after_the_hold() {
        let c = Choreography::new(&attack("a1", None), &Projection::default(), Some(destination()), 0.0);
        let fade_start = APPEAR_MS + DRAW_MS + HOLD_MS;
        assert_eq!(c.frame(fade_start - 1.0).expect("frame").marker.opacity, 1.0);
        let mid = c.frame(fade_start + FADE_MS / 2.0).expect("frame");
        assert!((mid.marker.opacity - 0.5).abs() < 1e-9);
        assert!((mid.label.opacity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn trajectory_is_curved_and_ends_at_destination() {
        let source = (100.0, 300.0);
        let dest = (600.0, 200.0);
        let trajectory = Trajectory::between(source, dest);
        assert_eq!(trajectory.start(), Some(source));
        assert_eq!(trajectory.end(), Some(dest));
        assert!(trajectory.length() > distance(source, dest));
        assert_eq!(trajectory.revealed(1.0), trajectory.points().to_vec());
        assert!(trajectory.revealed(0.0).is_empty());

        let half = trajectory.revealed(0.5);
        let walked: f64 = half.windows(2).map(|w| distance(w[0], w[1])).sum();
        assert!((walked - trajectory.length() / 2.0).abs() < 1e-6);
    }

    #[test]
    fn zero_length_trajectory_is_safe() {
        let trajectory = Trajectory::between((10.0, 10.0), (10.0, 10.0));
        assert!(trajectory.length() > 0.0);
        assert!(!trajectory.revealed(0.3).is_empty());
    }
}
