use std::ffi::c_void;
use std::ptr::NonNull;
use std::result::Result as StdResult;
use std::time::Instant;

use anyhow::{Context, Result};
use smithay_client_toolkit::reexports::client::{
    globals::registry_queue_init,
    protocol::{wl_output, wl_surface},
    Connection, Proxy, QueueHandle,
};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState, Region},
    delegate_compositor, delegate_layer, delegate_output, delegate_registry,
    output::{OutputHandler, OutputInfo, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    shell::wlr_layer::{
        Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
        LayerSurfaceConfigure,
    },
    shell::WaylandSurface,
};
use tracing::{debug, error, info, trace, warn};
use winit::dpi::PhysicalSize;

use crate::gpu::{surface_recovery, GpuState, SurfaceRecovery};
use crate::runtime::RenderPolicyDriver;
use crate::types::RendererConfig;

/// Mounts the smoke field as the desktop background and renders on every
/// compositor frame callback until the layer surface is closed.
pub(crate) fn run(config: &RendererConfig) -> Result<()> {
    let conn = Connection::connect_to_env().context("failed to connect to Wayland compositor")?;
    let (globals, mut event_queue) =
        registry_queue_init(&conn).context("failed to initialize Wayland registry queue")?;
    let qh = event_queue.handle();

    let compositor =
        CompositorState::bind(&globals, &qh).context("wl_compositor is not available")?;
    let layer_shell =
        LayerShell::bind(&globals, &qh).context("layer shell protocol is not available")?;

    let registry_state = RegistryState::new(&globals);
    let output_state = OutputState::new(&globals, &qh);

    let surface = compositor.create_surface(&qh);
    let target_output = output_state.outputs().next();
    let initial_output_size = target_output
        .as_ref()
        .and_then(|output| output_state.info(output))
        .and_then(output_info_physical_size);

    let layer_surface = layer_shell.create_layer_surface(
        &qh,
        surface,
        Layer::Background,
        Some("emberwall".to_string()),
        target_output.as_ref(),
    );
    layer_surface.set_anchor(Anchor::TOP | Anchor::BOTTOM | Anchor::LEFT | Anchor::RIGHT);
    layer_surface.set_keyboard_interactivity(KeyboardInteractivity::None);
    layer_surface.set_exclusive_zone(-1);
    if let Some((width, height)) = config.requested_size {
        layer_surface.set_size(width, height);
    }
    layer_surface.commit();

    let mut manager = WallpaperManager {
        registry_state,
        output_state,
        compositor,
        surface: SurfaceState::new(layer_surface, initial_output_size, config),
        config: config.clone(),
        target_output,
        should_exit: false,
    };

    while !manager.should_exit {
        event_queue
            .blocking_dispatch(&mut manager)
            .context("error while processing Wayland events")?;
    }

    // GPU resources reference the wl_surface; release them first.
    manager.surface.gpu = None;
    info!("wallpaper stopped");
    Ok(())
}

struct WallpaperManager {
    registry_state: RegistryState,
    output_state: OutputState,
    compositor: CompositorState,
    surface: SurfaceState,
    config: RendererConfig,
    target_output: Option<wl_output::WlOutput>,
    should_exit: bool,
}

impl WallpaperManager {
    fn infer_output_size(&self) -> Option<PhysicalSize<u32>> {
        if let Some(output) = self.target_output.as_ref() {
            if let Some(info) = self.output_state.info(output) {
                return output_info_physical_size(info);
            }
        }
        self.surface.last_output_size
    }

    fn resolve_configure_size(&self, new_size: (u32, u32)) -> PhysicalSize<u32> {
        let fallback = PhysicalSize::new(self.config.surface_size.0, self.config.surface_size.1);
        let inferred = self.infer_output_size();
        resolve_surface_size(new_size, self.config.requested_size, inferred, fallback)
    }

    fn refresh_output_size(&mut self, output: &wl_output::WlOutput) {
        if let Some(info) = self.output_state.info(output) {
            let physical = output_info_physical_size(info);
            if self.target_output.as_ref() == Some(output) {
                self.surface.last_output_size = physical;
            } else if self.target_output.is_none() {
                self.target_output = Some(output.clone());
                self.surface.last_output_size = physical;
            }
        }
    }

    /// Draws a frame if the scheduler allows it, then commits the surface.
    fn draw(&mut self) {
        let Some(gpu) = self.surface.gpu.as_mut() else {
            return;
        };
        if !self.surface.driver.ready_for_frame(Instant::now()) {
            trace!("frame callback - skipped render due to fps cap");
            return;
        }
        match gpu.render(self.surface.driver.sample()) {
            Ok(()) => self.surface.driver.mark_rendered(),
            Err(err) => {
                if self.surface.handle_surface_error(err) {
                    self.should_exit = true;
                }
            }
        }
    }
}

/// Whether to ask for another `wl_surface.frame` callback. At most one is
/// outstanding, and a stopped surface or a finished still ends the chain.
fn wants_frame_callback(frame_scheduled: bool, has_gpu: bool, finished: bool) -> bool {
    !frame_scheduled && has_gpu && !finished
}

/// Picks the surface size for a configure event: the compositor's suggestion,
/// else the output mode, else the fallback, never larger than an explicit request.
fn resolve_surface_size(
    configured: (u32, u32),
    requested: Option<(u32, u32)>,
    inferred: Option<PhysicalSize<u32>>,
    fallback: PhysicalSize<u32>,
) -> PhysicalSize<u32> {
    let mut size = if configured.0 == 0 || configured.1 == 0 {
        inferred.unwrap_or(fallback)
    } else {
        PhysicalSize::new(configured.0, configured.1)
    };

    if let Some((req_w, req_h)) = requested {
        size.width = size.width.min(req_w.max(1));
        size.height = size.height.min(req_h.max(1));
    }

    if size.width == 0 || size.height == 0 {
        fallback
    } else {
        size
    }
}

impl CompositorHandler for WallpaperManager {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
        if !self.surface.matches(surface) {
            return;
        }

        self.surface.frame_scheduled = false;
        trace!("frame callback");
        self.draw();
        if self.should_exit {
            return;
        }
        self.surface.schedule_frame(qh);
    }
}

impl LayerShellHandler for WallpaperManager {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        info!("layer surface closed by compositor");
        self.should_exit = true;
    }

    fn configure(
        &mut self,
        conn: &Connection,
        qh: &QueueHandle<Self>,
        _layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        let size = self.resolve_configure_size(configure.new_size);
        self.surface.layer_surface.set_size(size.width, size.height);
        self.surface.last_output_size = Some(size);
        info!(
            "layer configure new_size={}x{} -> using {}x{}",
            configure.new_size.0, configure.new_size.1, size.width, size.height
        );

        if let Err(err) = self.surface.ensure_gpu(conn, size, &self.config) {
            let reason = format!("{err:#}");
            warn!(error = %reason, "GPU unavailable; wallpaper will not render");
            self.should_exit = true;
            return;
        }

        self.surface.apply_opaque_region(&self.compositor, size);
        // A resize invalidates whatever frame is on screen, even a still one.
        self.surface.driver.invalidate();
        self.draw();
        if self.should_exit {
            return;
        }
        self.surface.schedule_frame(qh);
    }
}

impl OutputHandler for WallpaperManager {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        self.refresh_output_size(&output);
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        self.refresh_output_size(&output);
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        if self.target_output.as_ref() == Some(&output) {
            self.target_output = None;
            self.surface.last_output_size = None;
        }
    }
}

impl ProvidesRegistryState for WallpaperManager {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState];
}

delegate_compositor!(WallpaperManager);
delegate_output!(WallpaperManager);
delegate_layer!(WallpaperManager);
delegate_registry!(WallpaperManager);

struct SurfaceState {
    layer_surface: LayerSurface,
    gpu: Option<GpuState>,
    frame_scheduled: bool,
    last_output_size: Option<PhysicalSize<u32>>,
    driver: RenderPolicyDriver,
}

impl SurfaceState {
    fn new(
        layer_surface: LayerSurface,
        last_output_size: Option<PhysicalSize<u32>>,
        config: &RendererConfig,
    ) -> Self {
        Self {
            layer_surface,
            gpu: None,
            frame_scheduled: false,
            last_output_size,
            driver: RenderPolicyDriver::new(&config.policy, config.time_scale, config.time_offset),
        }
    }

    fn matches(&self, surface: &wl_surface::WlSurface) -> bool {
        surface == self.layer_surface.wl_surface()
    }

    fn ensure_gpu(
        &mut self,
        conn: &Connection,
        size: PhysicalSize<u32>,
        config: &RendererConfig,
    ) -> Result<()> {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resize(size);
            debug!("resized GPU surface to {}x{}", size.width, size.height);
            return Ok(());
        }

        let handle = WaylandSurfaceHandle::new(conn, &self.layer_surface);
        let gpu = GpuState::new(&handle, size, config)?;
        info!(
            adapter = %gpu.adapter_profile().name,
            "initialised GPU surface {}x{}",
            size.width,
            size.height
        );
        self.gpu = Some(gpu);
        Ok(())
    }

    /// Requests the next `wl_surface.frame` callback; at most one is ever
    /// outstanding. Finished still frames stop the callback chain.
    fn schedule_frame(&mut self, qh: &QueueHandle<WallpaperManager>) {
        if !wants_frame_callback(
            self.frame_scheduled,
            self.gpu.is_some(),
            self.driver.is_finished(),
        ) {
            self.layer_surface.commit();
            return;
        }
        let surface = self.layer_surface.wl_surface();
        surface.frame(qh, surface.clone());
        self.frame_scheduled = true;
        self.layer_surface.commit();
        trace!("requested frame callback and committed surface");
    }

    fn apply_opaque_region(&self, compositor: &CompositorState, size: PhysicalSize<u32>) {
        let surface = self.layer_surface.wl_surface();
        if size.width == 0 || size.height == 0 {
            surface.set_opaque_region(None);
            return;
        }
        let width = size.width.min(i32::MAX as u32) as i32;
        let height = size.height.min(i32::MAX as u32) as i32;
        match Region::new(compositor) {
            Ok(region) => {
                region.add(0, 0, width, height);
                surface.set_opaque_region(Some(region.wl_region()));
            }
            Err(err) => {
                warn!(
                    error = %err,
                    "failed to declare opaque region for wallpaper surface"
                );
                surface.set_opaque_region(None);
            }
        }
    }

    /// Returns true when rendering cannot continue.
    fn handle_surface_error(&mut self, error: wgpu::SurfaceError) -> bool {
        match surface_recovery(&error) {
            SurfaceRecovery::Reconfigure => {
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.reconfigure();
                }
                self.driver.invalidate();
                false
            }
            SurfaceRecovery::SkipFrame => {
                debug!(?error, "surface busy; retrying next frame");
                false
            }
            SurfaceRecovery::Stop => {
                error!(?error, "surface out of memory; stopping wallpaper");
                self.gpu = None;
                true
            }
        }
    }
}

struct WaylandSurfaceHandle {
    display: *mut c_void,
    surface: *mut c_void,
}

impl WaylandSurfaceHandle {
    fn new(conn: &Connection, layer_surface: &LayerSurface) -> Self {
        let display = conn.backend().display_ptr() as *mut c_void;
        let surface = layer_surface.wl_surface().id().as_ptr() as *mut c_void;
        Self { display, surface }
    }
}

impl raw_window_handle::HasDisplayHandle for WaylandSurfaceHandle {
    fn display_handle(
        &self,
    ) -> StdResult<raw_window_handle::DisplayHandle<'_>, raw_window_handle::HandleError> {
        let display =
            NonNull::new(self.display).ok_or(raw_window_handle::HandleError::Unavailable)?;
        let wayland = raw_window_handle::WaylandDisplayHandle::new(display);
        let raw = raw_window_handle::RawDisplayHandle::Wayland(wayland);
        Ok(unsafe { raw_window_handle::DisplayHandle::borrow_raw(raw) })
    }
}

impl raw_window_handle::HasWindowHandle for WaylandSurfaceHandle {
    fn window_handle(
        &self,
    ) -> StdResult<raw_window_handle::WindowHandle<'_>, raw_window_handle::HandleError> {
        let surface =
            NonNull::new(self.surface).ok_or(raw_window_handle::HandleError::Unavailable)?;
        let wayland = raw_window_handle::WaylandWindowHandle::new(surface);
        let raw = raw_window_handle::RawWindowHandle::Wayland(wayland);
        Ok(unsafe { raw_window_handle::WindowHandle::borrow_raw(raw) })
    }
}

fn output_info_physical_size(info: OutputInfo) -> Option<PhysicalSize<u32>> {
    if let Some(mode) = info.modes.iter().find(|mode| mode.current) {
        let width = mode.dimensions.0.max(1) as u32;
        let height = mode.dimensions.1.max(1) as u32;
        return Some(PhysicalSize::new(width, height));
    }

    if let Some((width, height)) = info.logical_size {
        let scale = info.scale_factor.max(1) as u32;
        return Some(PhysicalSize::new(
            width.max(1) as u32 * scale,
            height.max(1) as u32 * scale,
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::runtime::RenderPolicy;

    const FALLBACK: PhysicalSize<u32> = PhysicalSize {
        width: 1920,
        height: 1080,
    };

    #[test]
    fn configure_size_prefers_compositor_suggestion() {
        let size = resolve_surface_size((2560, 1440), None, None, FALLBACK);
        assert_eq!(size, PhysicalSize::new(2560, 1440));
    }

    #[test]
    fn zero_configure_falls_back_to_output_then_default() {
        let output = Some(PhysicalSize::new(3840, 2160));
        assert_eq!(
            resolve_surface_size((0, 0), None, output, FALLBACK),
            PhysicalSize::new(3840, 2160)
        );
        assert_eq!(resolve_surface_size((0, 0), None, None, FALLBACK), FALLBACK);
    }

    #[test]
    fn explicit_request_caps_the_surface() {
        let size = resolve_surface_size((2560, 1440), Some((1280, 2000)), None, FALLBACK);
        assert_eq!(size, PhysicalSize::new(1280, 1440));
    }

    #[test]
    fn frame_callback_requested_only_when_idle_and_drawable() {
        assert!(wants_frame_callback(false, true, false));
        assert!(!wants_frame_callback(true, true, false));
        assert!(!wants_frame_callback(false, false, false));
        assert!(!wants_frame_callback(false, true, true));
        assert!(!wants_frame_callback(true, false, true));
    }

    #[test]
    fn finished_still_stops_the_callback_chain() {
        let mut driver =
            RenderPolicyDriver::new(&RenderPolicy::Still { time: 4.0 }, 1.0, Duration::ZERO);
        assert!(wants_frame_callback(false, true, driver.is_finished()));
        driver.mark_rendered();
        assert!(!wants_frame_callback(false, true, driver.is_finished()));
        driver.invalidate();
        assert!(wants_frame_callback(false, true, driver.is_finished()));
    }

    #[test]
    fn stopped_surface_never_requests_callbacks() {
        let driver = RenderPolicyDriver::new(&RenderPolicy::default(), 1.0, Duration::ZERO);
        assert!(!driver.is_finished());
        assert!(!wants_frame_callback(false, false, driver.is_finished()));
    }
}
