use std::cell::{Cell, RefCell};
use std::f64::consts::TAU;
use std::rc::Rc;
use std::time::Duration;

use futures::future::{AbortHandle, abortable};
use geo::MultiPolygon;
use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{CanvasRenderingContext2d, CanvasWindingRule, HtmlCanvasElement, PointerEvent};

use attack_map_shared::{
    MapEngine, MapSession, MapViewBox, MountGuard, POLL_INTERVAL, Projection, RecordFrame, Scene,
    decode_countries,
};

use crate::api::{HttpAttackSource, HttpRecordSink, IpInfoGeolocator, fetch_world_topology};
use crate::app::{Hovered, PointerPosition};
use crate::colors::{
    BORDER_STROKE, BORDER_WIDTH, LAND_FILL, LAND_HOVER_FILL, MARKER_STROKE, rgba_css,
};
use crate::render_loop::RenderScheduler;
use crate::spatial::{CountryGrid, CountryShape};
use crate::viewport::Viewport;

const LABEL_FONT: &str = "10px sans-serif";
const MARKER_STROKE_WIDTH: f64 = 1.0;
const RING_STROKE_WIDTH: f64 = 2.0;
/// Gradient opacity at the source end of a trajectory; the destination end is opaque.
const TRAJECTORY_TAIL_OPACITY: f64 = 0.5;

struct SessionBinding {
    guard: MountGuard,
    engine: Rc<RefCell<MapEngine>>,
    abort: AbortHandle,
}

thread_local! {
    static SESSION_BINDING: RefCell<Option<SessionBinding>> = const { RefCell::new(None) };
}

fn stop_session() {
    SESSION_BINDING.with(|slot| {
        if let Some(binding) = slot.borrow_mut().take() {
            binding.guard.unmount();
            binding.engine.borrow_mut().unmount();
            binding.abort.abort();
        }
    });
}

pub(crate) fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or_else(js_sys::Date::now)
}

fn device_pixel_ratio() -> f64 {
    web_sys::window()
        .map(|w| w.device_pixel_ratio())
        .unwrap_or(1.0)
}

/// World map with the live attack animation on a single Canvas 2D surface.
#[component]
pub fn MapCanvas() -> impl IntoView {
    let Hovered(hovered) = expect_context();
    let PointerPosition(pointer) = expect_context();

    let canvas_ref = NodeRef::<leptos::html::Canvas>::new();

    let projection = Projection::default();
    let engine = Rc::new(RefCell::new(MapEngine::new(projection)));
    let shapes: Rc<RefCell<Vec<CountryShape>>> = Rc::new(RefCell::new(Vec::new()));
    let grid: Rc<RefCell<CountryGrid>> = Rc::new(RefCell::new(CountryGrid::build(&[])));
    let hovered_index: Rc<Cell<Option<usize>>> = Rc::new(Cell::new(None));
    let viewport: Rc<Cell<Viewport>> = Rc::new(Cell::new(Viewport::default()));
    let cached_ctx: Rc<RefCell<Option<CanvasRenderingContext2d>>> = Rc::new(RefCell::new(None));

    let scheduler = Rc::new(RenderScheduler::new({
        let engine = engine.clone();
        let shapes = shapes.clone();
        let hovered_index = hovered_index.clone();
        let viewport = viewport.clone();
        move |now| {
            let Some(canvas) = canvas_ref.get_untracked() else {
                return false;
            };
            let canvas: &HtmlCanvasElement = &canvas;
            let Some(parent) = canvas.parent_element() else {
                return false;
            };
            let w = parent.client_width() as f64;
            let h = parent.client_height() as f64;
            if w <= 0.0 || h <= 0.0 {
                return false;
            }

            let dpr = device_pixel_ratio();
            let pw = (w * dpr).round().max(1.0) as u32;
            let ph = (h * dpr).round().max(1.0) as u32;
            if canvas.width() != pw || canvas.height() != ph {
                canvas.set_width(pw);
                canvas.set_height(ph);
                // Resizing resets the 2D context state.
                *cached_ctx.borrow_mut() = None;
            }

            let ctx = {
                let mut slot = cached_ctx.borrow_mut();
                if slot.is_none() {
                    *slot = canvas
                        .get_context("2d")
                        .ok()
                        .flatten()
                        .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok());
                }
                let Some(ctx) = slot.clone() else {
                    return false;
                };
                ctx
            };

            let vp = Viewport::fit(MapViewBox::default(), w, h);
            viewport.set(vp);

            ctx.set_transform(dpr, 0.0, 0.0, dpr, 0.0, 0.0).ok();
            ctx.clear_rect(0.0, 0.0, w, h);
            ctx.translate(vp.offset_x, vp.offset_y).ok();
            ctx.scale(vp.scale, vp.scale).ok();

            draw_countries(&ctx, &shapes.borrow(), hovered_index.get());
            let scene = engine.borrow_mut().scene(now);
            draw_scene(&ctx, &scene);
            scene.animating
        }
    }));

    // Base map: fetched and projected once per mount.
    {
        let shapes = shapes.clone();
        let grid = grid.clone();
        let scheduler = scheduler.clone();
        spawn_local(async move {
            let decoded = fetch_world_topology()
                .await
                .and_then(|json| decode_countries(&json).map_err(|e| e.to_string()));
            match decoded {
                Ok(countries) => {
                    let projected: Vec<CountryShape> = countries
                        .into_iter()
                        .map(|country| {
                            CountryShape::new(country.name, projection.project_shape(&country.shape))
                        })
                        .collect();
                    *grid.borrow_mut() = CountryGrid::build(&projected);
                    *shapes.borrow_mut() = projected;
                    scheduler.mark_dirty();
                }
                Err(e) => {
                    web_sys::console::warn_1(&format!("world map unavailable: {e}").into());
                }
            }
        });
    }

    // Attack session: bound to this component's lifetime.
    {
        stop_session();
        let session = MapSession::new(
            engine.clone(),
            HttpAttackSource,
            IpInfoGeolocator,
            HttpRecordSink,
            now_ms,
        );
        let guard = session.guard();
        let scheduler = scheduler.clone();
        let (task, abort) = abortable(async move {
            session
                .run(
                    POLL_INTERVAL,
                    |d: Duration| gloo_timers::future::sleep(d),
                    || scheduler.mark_dirty(),
                )
                .await;
        });
        SESSION_BINDING.with(|slot| {
            *slot.borrow_mut() = Some(SessionBinding {
                guard,
                engine: engine.clone(),
                abort,
            });
        });
        spawn_local(async move {
            let _ = task.await;
        });
        on_cleanup(stop_session);
    }

    let on_pointer_move = {
        let shapes = shapes.clone();
        let grid = grid.clone();
        let hovered_index = hovered_index.clone();
        let viewport = viewport.clone();
        let scheduler = scheduler.clone();
        move |e: PointerEvent| {
            let local = canvas_ref
                .get_untracked()
                .map(|el| {
                    let rect = el.get_bounding_client_rect();
                    (
                        e.client_x() as f64 - rect.left(),
                        e.client_y() as f64 - rect.top(),
                    )
                })
                .unwrap_or((e.offset_x() as f64, e.offset_y() as f64));
            let (mx, my) = viewport.get().screen_to_map(local.0, local.1);
            let shapes = shapes.borrow();
            let hit = grid.borrow().find_at(&shapes, mx, my);
            if hit != hovered_index.get() {
                hovered_index.set(hit);
                hovered.set(hit.and_then(|i| shapes.get(i)).map(|s| s.name.clone()));
                scheduler.mark_dirty();
            }
            if hit.is_some() {
                pointer.set((e.page_x() as f64, e.page_y() as f64));
            }
        }
    };

    let on_pointer_leave = {
        let hovered_index = hovered_index.clone();
        let scheduler = scheduler.clone();
        move |_: PointerEvent| {
            if hovered_index.replace(None).is_some() {
                hovered.set(None);
                scheduler.mark_dirty();
            }
        }
    };

    view! {
        <div
            style="position: relative; width: 100%; height: 100%; overflow: hidden;"
            on:pointermove=on_pointer_move
            on:pointerleave=on_pointer_leave
        >
            <canvas
                node_ref=canvas_ref
                style="position: absolute; inset: 0; width: 100%; height: 100%;"
            />
        </div>
    }
}

fn trace_shape(ctx: &CanvasRenderingContext2d, shape: &MultiPolygon<f64>) {
    ctx.begin_path();
    for polygon in shape {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            let mut points = ring.coords();
            let Some(first) = points.next() else {
                continue;
            };
            ctx.move_to(first.x, first.y);
            for point in points {
                ctx.line_to(point.x, point.y);
            }
            ctx.close_path();
        }
    }
}

fn draw_countries(ctx: &CanvasRenderingContext2d, shapes: &[CountryShape], hovered: Option<usize>) {
    ctx.set_stroke_style_str(BORDER_STROKE);
    ctx.set_line_width(BORDER_WIDTH);
    for (idx, shape) in shapes.iter().enumerate() {
        trace_shape(ctx, &shape.shape);
        ctx.set_fill_style_str(if hovered == Some(idx) {
            LAND_HOVER_FILL
        } else {
            LAND_FILL
        });
        ctx.fill_with_canvas_winding_rule(CanvasWindingRule::Evenodd);
        ctx.stroke();
    }
}

fn circle(ctx: &CanvasRenderingContext2d, center: (f64, f64), radius: f64) {
    ctx.begin_path();
    ctx.arc(center.0, center.1, radius.max(0.0), 0.0, TAU).ok();
}

/// Paths first so markers and labels stay on top of them.
fn draw_scene(ctx: &CanvasRenderingContext2d, scene: &Scene) {
    for frame in &scene.records {
        draw_path(ctx, frame);
    }
    for frame in &scene.records {
        draw_effects(ctx, frame);
    }
    for frame in &scene.records {
        draw_marker(ctx, frame);
    }
}

fn draw_path(ctx: &CanvasRenderingContext2d, frame: &RecordFrame) {
    let Some(path) = &frame.path else {
        return;
    };
    let mut points = path.points.iter();
    let Some(&(x, y)) = points.next() else {
        return;
    };
    let ((x0, y0), (x1, y1)) = path.gradient;
    let (r, g, b) = path.rgb;
    let gradient = ctx.create_linear_gradient(x0, y0, x1, y1);
    gradient
        .add_color_stop(0.0, &rgba_css(r, g, b, TRAJECTORY_TAIL_OPACITY * path.opacity))
        .ok();
    gradient
        .add_color_stop(1.0, &rgba_css(r, g, b, path.opacity))
        .ok();

    ctx.begin_path();
    ctx.move_to(x, y);
    for &(x, y) in points {
        ctx.line_to(x, y);
    }
    ctx.set_stroke_style_canvas_gradient(&gradient);
    ctx.set_line_width(path.width);
    ctx.set_line_cap("round");
    ctx.set_line_join("round");
    ctx.stroke();
}

fn draw_effects(ctx: &CanvasRenderingContext2d, frame: &RecordFrame) {
    if let Some(ripple) = &frame.ripple {
        let (r, g, b) = ripple.rgb;
        circle(ctx, ripple.center, ripple.radius);
        ctx.set_stroke_style_str(&rgba_css(r, g, b, ripple.opacity));
        ctx.set_line_width(RING_STROKE_WIDTH);
        ctx.stroke();
    }
    if let Some(blink) = &frame.blink {
        let (r, g, b) = blink.rgb;
        circle(ctx, blink.center, blink.radius);
        ctx.set_fill_style_str(&rgba_css(r, g, b, blink.opacity));
        ctx.fill();
    }
}

fn draw_marker(ctx: &CanvasRenderingContext2d, frame: &RecordFrame) {
    let marker = &frame.marker;
    if marker.opacity <= 0.0 {
        return;
    }
    let (r, g, b) = marker.rgb;
    let (sr, sg, sb) = MARKER_STROKE;
    circle(ctx, marker.center, marker.radius);
    ctx.set_fill_style_str(&rgba_css(r, g, b, marker.opacity));
    ctx.fill();
    ctx.set_stroke_style_str(&rgba_css(sr, sg, sb, marker.opacity));
    ctx.set_line_width(MARKER_STROKE_WIDTH);
    ctx.stroke();

    let label = &frame.label;
    if !label.text.is_empty() {
        ctx.set_font(LABEL_FONT);
        ctx.set_fill_style_str(&rgba_css(0, 0, 0, label.opacity));
        ctx.fill_text(&label.text, label.anchor.0, label.anchor.1).ok();
    }
}
