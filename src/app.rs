use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::error::{PipelineError, Result};
use crate::gpu::GpuContext;
use crate::pipeline::{Compositor, CompositorConfig};
use crate::scene::Scene;
use crate::shader_library::ShaderLibrary;

/// Environment variable naming a directory of WGSL overrides for the demo.
pub const SHADER_DIR_ENV: &str = "CELLINE_SHADER_DIR";

/// Configuration for the app window.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub present_mode: wgpu::PresentMode,
    /// Directory of `<program>.wgsl` overrides, loaded at startup.
    pub shader_dir: Option<PathBuf>,
    pub background: wgpu::Color,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Toonify".to_string(),
            width: 800,
            height: 600,
            present_mode: wgpu::PresentMode::Fifo,
            shader_dir: None,
            background: wgpu::Color::TRANSPARENT,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// `Fifo` caps the frame rate to the display; `Immediate` or `Mailbox` do not.
    pub fn present_mode(mut self, present_mode: wgpu::PresentMode) -> Self {
        self.present_mode = present_mode;
        self
    }

    pub fn shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }

    pub fn background(mut self, background: wgpu::Color) -> Self {
        self.background = background;
        self
    }

    /// Shader sources: the configured directory's overrides, or the built-ins.
    pub fn shaders(&self) -> Result<ShaderLibrary> {
        match &self.shader_dir {
            Some(dir) => ShaderLibrary::from_dir(dir),
            None => Ok(ShaderLibrary::builtin()),
        }
    }
}

/// Logs frames per second once per second.
#[derive(Debug)]
pub struct FpsLogger {
    window_start: Instant,
    frames: u32,
}

impl Default for FpsLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsLogger {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(start: Instant) -> Self {
        Self {
            window_start: start,
            frames: 0,
        }
    }

    /// Counts one frame. Returns (and logs) the rate when a second has passed.
    pub fn log(&mut self) -> Option<f32> {
        self.log_at(Instant::now())
    }

    fn log_at(&mut self, now: Instant) -> Option<f32> {
        self.frames += 1;
        let elapsed = now.duration_since(self.window_start);
        if elapsed < Duration::from_secs(1) {
            return None;
        }

        let fps = self.frames as f32 / elapsed.as_secs_f32();
        log::info!("fps: {fps:.0}");
        self.window_start = now;
        self.frames = 0;
        Some(fps)
    }
}

/// Run the toon + outline demo until the window closes.
///
/// `setup` builds the scene once the GPU is ready. Errors from setup, or a
/// fatal error during a frame, end the event loop and are returned.
///
/// # Example
/// ```ignore
/// celline::run(AppConfig::new().title("Toonify"), |gpu| {
///     let camera = Camera::new().at(5.0, 5.0, 5.0).looking_at(0.0, 0.0, 0.0);
///     Ok(Scene::new(camera, Model::new(Mesh::cube(gpu))))
/// })?;
/// ```
pub fn run<S>(config: AppConfig, setup: S) -> Result<()>
where
    S: FnOnce(&GpuContext) -> Result<Scene> + 'static,
{
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = CellineApp::Pending {
        config,
        setup: Some(Box::new(setup)),
    };
    event_loop.run_app(&mut app)?;

    match app {
        CellineApp::Failed(err) => Err(err),
        _ => Ok(()),
    }
}

type SetupFn = Box<dyn FnOnce(&GpuContext) -> Result<Scene>>;

enum CellineApp {
    Pending {
        config: AppConfig,
        setup: Option<SetupFn>,
    },
    Running {
        window: Arc<Window>,
        gpu: GpuContext,
        compositor: Compositor,
        scene: Scene,
        fps: FpsLogger,
    },
    Failed(PipelineError),
}

impl CellineApp {
    fn start(
        event_loop: &ActiveEventLoop,
        config: &AppConfig,
        setup: SetupFn,
    ) -> Result<CellineApp> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let gpu = GpuContext::new(window.clone(), config.present_mode)?;

        let shaders = config.shaders()?;
        let compositor_config = CompositorConfig::for_gpu(&gpu).with_background(config.background);
        let compositor = Compositor::new(&gpu, compositor_config, &shaders)?;
        let scene = setup(&gpu)?;

        window.request_redraw();

        Ok(CellineApp::Running {
            window,
            gpu,
            compositor,
            scene,
            fps: FpsLogger::new(),
        })
    }
}

impl ApplicationHandler for CellineApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let CellineApp::Pending { config, setup } = self else {
            return;
        };
        let Some(setup) = setup.take() else {
            return;
        };

        *self = match Self::start(event_loop, config, setup) {
            Ok(running) => running,
            Err(err) => {
                log::error!("Startup failed: {err}");
                event_loop.exit();
                CellineApp::Failed(err)
            }
        };
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let CellineApp::Running {
            window,
            gpu,
            compositor,
            scene,
            fps,
        } = self
        else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                compositor.request_resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                match compositor.render_frame(gpu, scene) {
                    Ok(()) => {
                        fps.log();
                    }
                    Err(err) if skips_frame(&err) => {
                        log::warn!("{err}, skipping frame");
                    }
                    Err(err) => {
                        log::error!("Frame failed: {err}");
                        event_loop.exit();
                        *self = CellineApp::Failed(err);
                        return;
                    }
                }
                window.request_redraw();
            }
            _ => {}
        }
    }
}

/// Surface failures that only cost the current frame. The compositor already
/// reconfigured once for `Lost` and `Outdated`; the next redraw tries again.
fn skips_frame(err: &PipelineError) -> bool {
    matches!(
        err,
        PipelineError::Surface(
            wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_is_reported_once_per_second() {
        let start = Instant::now();
        let mut fps = FpsLogger::starting_at(start);
        for i in 1..60 {
            assert_eq!(fps.log_at(start + Duration::from_millis(i * 16)), None);
        }
        let rate = fps.log_at(start + Duration::from_secs(1)).unwrap();
        assert!((rate - 60.0).abs() < 1e-3);
        assert_eq!(fps.log_at(start + Duration::from_millis(1016)), None);
    }

    #[test]
    fn transient_surface_errors_skip_the_frame() {
        for err in [
            wgpu::SurfaceError::Timeout,
            wgpu::SurfaceError::Lost,
            wgpu::SurfaceError::Outdated,
        ] {
            let err = PipelineError::Surface(err);
            assert!(skips_frame(&err), "{err}");
        }
        assert!(!skips_frame(&PipelineError::Surface(wgpu::SurfaceError::OutOfMemory)));
        assert!(!skips_frame(&PipelineError::NoSurface));
    }

    #[test]
    fn config_builder_defaults() {
        let config = AppConfig::new().title("Toon").size(1024, 768);
        assert_eq!(config.title, "Toon");
        assert_eq!((config.width, config.height), (1024, 768));
        assert_eq!(config.present_mode, wgpu::PresentMode::Fifo);
        assert!(config.shader_dir.is_none());
        assert!(config.shaders().is_ok());
    }
}
