use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::window::{Window, WindowBuilder};

use tracing::{error, info, warn};

use crate::gpu::{surface_recovery, GpuState, SurfaceRecovery};
use crate::runtime::{RenderPolicy, RenderPolicyDriver};
use crate::types::RendererConfig;

const SOFTWARE_FPS_CAP: f32 = 15.0;

/// Window plus the GPU state drawing into it. `gpu` is `None` when no adapter
/// could be initialised; the window then stays blank until closed.
pub(crate) struct WindowState {
    window: Arc<Window>,
    gpu: Option<GpuState>,
}

impl WindowState {
    pub(crate) fn new(window: Arc<Window>, config: &RendererConfig) -> Self {
        let size = window.inner_size();
        let gpu = match GpuState::new(window.as_ref(), size, config) {
            Ok(gpu) => Some(gpu),
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(error = %reason, "GPU unavailable; preview window stays blank");
                None
            }
        };
        Self { window, gpu }
    }

    pub(crate) fn window(&self) -> &Window {
        self.window.as_ref()
    }

    pub(crate) fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resize(new_size);
        }
    }

    fn is_software(&self) -> bool {
        self.gpu
            .as_ref()
            .map(|gpu| gpu.adapter_profile().is_software())
            .unwrap_or(false)
    }
}

/// Applies the software-rasterizer frame cap unless the caller chose a rate.
fn effective_policy(policy: &RenderPolicy, is_software: bool) -> RenderPolicy {
    match policy {
        RenderPolicy::Animate { target_fps: None } if is_software => RenderPolicy::Animate {
            target_fps: Some(SOFTWARE_FPS_CAP),
        },
        other => other.clone(),
    }
}

/// What the event loop does once it has drained pending events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RedrawPlan {
    Now,
    WaitUntil(Instant),
    Idle,
}

/// Nothing is drawn once teardown has started or when there is no GPU.
fn plan_redraw(
    stopping: bool,
    has_gpu: bool,
    driver: &RenderPolicyDriver,
    now: Instant,
) -> RedrawPlan {
    if stopping || !has_gpu {
        return RedrawPlan::Idle;
    }
    if driver.ready_for_frame(now) {
        return RedrawPlan::Now;
    }
    match driver.next_deadline() {
        Some(deadline) => RedrawPlan::WaitUntil(deadline),
        None => RedrawPlan::Idle,
    }
}

#[derive(Debug, Clone)]
enum WindowCommand {
    Shutdown,
}

/// Preview window running its event loop on a dedicated thread.
///
/// Dropping the runtime stops the loop; no redraw is scheduled after that.
pub struct WindowRuntime {
    proxy: EventLoopProxy<WindowCommand>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl WindowRuntime {
    pub fn spawn(config: RendererConfig) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("emberwall-window".into())
            .spawn(move || run_window_thread(config, ready_tx))
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let proxy = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread failed to initialise: {err}"))??;

        Ok(Self {
            proxy,
            join_handle: Some(handle),
        })
    }

    /// Blocks until the user closes the window.
    pub fn wait(mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))?,
            None => Ok(()),
        }
    }

}

impl Drop for WindowRuntime {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(WindowCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_window_thread(
    config: RendererConfig,
    ready_tx: Sender<Result<EventLoopProxy<WindowCommand>, anyhow::Error>>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<WindowCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    let event_loop = match builder.build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            let message = format!("failed to create event loop: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };
    let proxy = event_loop.create_proxy();

    let (width, height) = config.requested_size.unwrap_or(config.surface_size);
    let window = match WindowBuilder::new()
        .with_title("emberwall")
        .with_inner_size(PhysicalSize::new(width.max(1), height.max(1)))
        .build(&event_loop)
    {
        Ok(window) => Arc::new(window),
        Err(err) => {
            let message = format!("failed to create preview window: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };

    let mut state = WindowState::new(window, &config);
    let policy = effective_policy(&config.policy, state.is_software());
    if policy != config.policy {
        warn!(
            cap = SOFTWARE_FPS_CAP,
            "software rasterizer detected; capping preview to {} FPS (override with --fps)",
            SOFTWARE_FPS_CAP
        );
    }
    let mut policy_driver = RenderPolicyDriver::new(&policy, config.time_scale, config.time_offset);
    let mut stopping = false;
    if plan_redraw(stopping, state.has_gpu(), &policy_driver, Instant::now()) == RedrawPlan::Now {
        state.window().request_redraw();
    }
    info!(?policy, "preview window ready");

    let _ = ready_tx.send(Ok(proxy));

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::UserEvent(WindowCommand::Shutdown) => {
            stopping = true;
            elwt.exit();
        }
        Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
            match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    stopping = true;
                    elwt.exit();
                }
                WindowEvent::Resized(new_size) => {
                    state.resize(new_size);
                    policy_driver.invalidate();
                }
                WindowEvent::RedrawRequested => {
                    if stopping {
                        return;
                    }
                    let Some(gpu) = state.gpu.as_mut() else {
                        return;
                    };
                    match gpu.render(policy_driver.sample()) {
                        Ok(()) => policy_driver.mark_rendered(),
                        Err(err) => match surface_recovery(&err) {
                            SurfaceRecovery::Reconfigure => {
                                gpu.reconfigure();
                                policy_driver.invalidate();
                            }
                            SurfaceRecovery::SkipFrame => {
                                tracing::debug!(error = ?err, "surface busy; retrying next frame");
                            }
                            SurfaceRecovery::Stop => {
                                error!(error = ?err, "surface out of memory; closing preview");
                                stopping = true;
                                elwt.exit();
                            }
                        },
                    }
                }
                _ => {}
            }
        }
        Event::AboutToWait => {
            let now = Instant::now();
            match plan_redraw(stopping, state.has_gpu(), &policy_driver, now) {
                RedrawPlan::Now => {
                    tracing::trace!("scheduler: issuing redraw now");
                    state.window().request_redraw();
                    elwt.set_control_flow(ControlFlow::Wait);
                }
                RedrawPlan::WaitUntil(deadline) => {
                    let ms = deadline.saturating_duration_since(now).as_millis();
                    tracing::trace!(deadline_ms = ms, "scheduler: waiting until next frame");
                    elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
                }
                RedrawPlan::Idle => {
                    tracing::trace!("scheduler: idle (no redraw requested)");
                    elwt.set_control_flow(ControlFlow::Wait);
                }
            }
        }
        Event::LoopExiting => {
            // Release the surface before the window it points at goes away.
            state.gpu = None;
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}
