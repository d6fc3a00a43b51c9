use std::cell::RefCell;
use std::time::Duration;

use futures::future::{AbortHandle, abortable};
use leptos::prelude::*;
use wasm_bindgen_futures::spawn_local;

use attack_map_shared::session::poll_until_unmounted;
use attack_map_shared::{MountGuard, POLL_INTERVAL, Tally, tally};

use crate::api::fetch_attackers;
use crate::canvas::MapCanvas;

/// Name of the country under the pointer.
#[derive(Clone, Copy)]
pub(crate) struct Hovered(pub RwSignal<Option<String>>);
/// Page coordinates of the pointer while it is over a country.
#[derive(Clone, Copy)]
pub(crate) struct PointerPosition(pub RwSignal<(f64, f64)>);

struct TallyPollBinding {
    guard: MountGuard,
    abort: AbortHandle,
}

thread_local! {
    static TALLY_POLL_BINDING: RefCell<Option<TallyPollBinding>> = const { RefCell::new(None) };
}

fn stop_tally_poll() {
    TALLY_POLL_BINDING.with(|slot| {
        if let Some(binding) = slot.borrow_mut().take() {
            binding.guard.unmount();
            binding.abort.abort();
        }
    });
}

#[component]
pub fn App() -> impl IntoView {
    let hovered: RwSignal<Option<String>> = RwSignal::new(None);
    let pointer: RwSignal<(f64, f64)> = RwSignal::new((0.0, 0.0));

    provide_context(Hovered(hovered));
    provide_context(PointerPosition(pointer));

    view! {
        <div style="width: 100%; height: 100%; display: flex; flex-direction: row;">
            <div style="flex: 1; height: 100%; position: relative; overflow: hidden; background: #ffffff;">
                <MapCanvas />
            </div>
            <aside style="width: 220px; flex-shrink: 0; border-left: 1px solid #d3d3d3; font-family: system-ui, sans-serif; font-size: 0.9rem;">
                <Classification />
            </aside>
        </div>
        <Tooltip />
    }
}

/// Attack counts per category, refreshed every second while mounted.
#[component]
fn Classification() -> impl IntoView {
    let counts: RwSignal<Tally> = RwSignal::new(Tally::default());

    stop_tally_poll();
    let guard = MountGuard::new();
    let (task, abort) = abortable({
        let guard = guard.clone();
        async move {
            let refresh = move || async move {
                match fetch_attackers().await {
                    Ok(records) => counts.set(tally(&records)),
                    Err(e) => {
                        web_sys::console::warn_1(&format!("attack tally fetch failed: {e}").into())
                    }
                }
            };
            refresh().await;
            poll_until_unmounted(
                &guard,
                POLL_INTERVAL,
                |d: Duration| gloo_timers::future::sleep(d),
                refresh,
            )
            .await;
        }
    });
    TALLY_POLL_BINDING.with(|slot| {
        *slot.borrow_mut() = Some(TallyPollBinding { guard, abort });
    });
    spawn_local(async move {
        let _ = task.await;
    });
    on_cleanup(stop_tally_poll);

    view! {
        <div>
            <p style="margin: 0; padding: 10px 20px; font-weight: 700; border-bottom: 1px solid #d3d3d3;">
                "Classification"
            </p>
            <div style="padding: 10px 20px;">
                {move || {
                    counts
                        .get()
                        .rows()
                        .map(|(label, count)| view! { <p style="margin: 4px 0;">{label} ": " {count}</p> })
                        .collect_view()
                }}
            </div>
        </div>
    }
}

/// Country name box that follows the pointer over the map.
#[component]
fn Tooltip() -> impl IntoView {
    let Hovered(hovered) = expect_context();
    let PointerPosition(pointer) = expect_context();

    view! {
        {move || {
            let Some(name) = hovered.get() else {
                return view! { <div style="display:none;" /> }.into_any();
            };
            let (x, y) = pointer.get();
            view! {
                <div
                    style:left=format!("{}px", x + 10.0)
                    style:top=format!("{}px", y - 10.0)
                    style="position: absolute; pointer-events: none; z-index: 100; padding: 8px; background: rgba(0, 0, 0, 0.7); color: #fff; border-radius: 5px; font-size: 12px;"
                >
                    {name}
                </div>
            }
            .into_any()
        }}
    }
}
