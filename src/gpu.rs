//! Core GPU context and device management.
//!
//! This module provides [`GpuContext`], the struct that holds all wgpu resources
//! needed for rendering: the device, the queue, an optional window surface and the
//! surface configuration. It is passed by reference to every pipeline component.
//!
//! # Initialization
//!
//! - [`GpuContext::new`] creates a context for a winit [`Window`] and configures
//!   its surface.
//! - [`GpuContext::headless`] creates a context without a surface. The
//!   configuration still records the viewport size and output format so the
//!   pipeline can render into an offscreen target (tests, screenshots).
//!
//! [`Window`]: winit::window::Window

use std::sync::Arc;
use winit::window::Window;

use crate::error::{PipelineError, Result};

/// Format used for every offscreen target and for headless output.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Core GPU context holding wgpu resources.
///
/// All fields are public to allow direct access to wgpu APIs when needed.
/// The context is created once at startup and passed by reference to all
/// rendering components.
pub struct GpuContext {
    /// The surface for presenting rendered frames to the window, if any.
    pub surface: Option<wgpu::Surface<'static>>,
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// Current output configuration (format, size, present mode).
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Create a new GPU context from a winit window.
    ///
    /// This performs all wgpu initialization:
    /// 1. Creates a wgpu instance with primary backends (Vulkan, Metal, DX12)
    /// 2. Creates a surface for the window
    /// 3. Requests a suitable GPU adapter
    /// 4. Creates the logical device and command queue
    /// 5. Configures the surface with an 8-bit linear format
    pub fn new(window: Arc<Window>, present_mode: wgpu::PresentMode) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| PipelineError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = Self::request_device(&adapter)?;

        // The toon bands are computed in linear 8-bit targets, so the surface
        // must not re-encode them.
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                PipelineError::AdapterRequestFailed("surface reports no formats".to_string())
            })?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        log::info!(
            "GPU context ready: {} ({:?}), surface {:?} {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            config.format,
            config.width,
            config.height
        );

        Ok(Self {
            surface: Some(surface),
            device,
            queue,
            config,
        })
    }

    /// Create a GPU context without a window.
    ///
    /// Falls back to a software adapter when no hardware adapter is available.
    pub fn headless(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidViewport { width, height });
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .or_else(|_| {
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: true,
            }))
        })
        .map_err(|e| PipelineError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = Self::request_device(&adapter)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: OFFSCREEN_FORMAT,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        log::info!(
            "Headless GPU context ready: {} ({:?}) {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            width,
            height
        );

        Ok(Self {
            surface: None,
            device,
            queue,
            config,
        })
    }

    fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
        let device = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Celline Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))?;
        Ok(device)
    }

    /// Resize the output to new dimensions.
    ///
    /// Ignores zero-sized dimensions to avoid wgpu validation errors (which can
    /// occur during window minimize).
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            if let Some(surface) = &self.surface {
                surface.configure(&self.device, &self.config);
            }
        }
    }

    /// Reconfigure the surface with the current configuration (after a lost surface).
    pub fn reconfigure(&self) {
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
    }

    /// Returns the current output width in pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Returns the current output height in pixels.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Returns the current aspect ratio (width / height).
    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }

    /// Maximum number of textures one shader stage may sample in a draw.
    pub fn max_texture_units(&self) -> u32 {
        self.device.limits().max_sampled_textures_per_shader_stage
    }
}
