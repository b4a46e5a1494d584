//! The compositor: owns every pipeline resource and runs the pass plan.
//!
//! Each frame records all passes of the plan into one command encoder, in
//! order, and submits once:
//!
//! ```text
//! scene-color  -> Scene
//! toonify      Scene -> ToonColor
//! scene-depth  -> Depth
//! outline      Depth -> Scene
//! combine      ToonColor + Scene -> output
//! ```
//!
//! wgpu tracks each target's usage across render passes, so the transition
//! of `Scene` from attachment to sampled texture and back needs no explicit
//! barrier.

use std::collections::HashMap;

use image::RgbaImage;

use crate::error::{PipelineError, Result};
use crate::gpu::{GpuContext, OFFSCREEN_FORMAT};
use crate::quad::FullScreenQuad;
use crate::scene::Scene;
use crate::shader_library::ShaderLibrary;

use super::frame::{Attachments, FrameContext};
use super::pass::{PassDescriptor, PassKind, PassPlan, PassTarget, StageId};
use super::render_target::{FramebufferSet, RenderTarget};
use super::scene_renderer::SceneRenderer;
use super::shader_stage::ShaderStage;
use super::texture_units::{self, TextureBinding, TextureUnit};

/// Compositor settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositorConfig {
    /// Color the output pass clears to. Offscreen passes always clear to
    /// transparent so uncovered pixels keep alpha 0.
    pub background: wgpu::Color,
    /// Format of the output the last pass writes.
    pub output_format: wgpu::TextureFormat,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            background: wgpu::Color::TRANSPARENT,
            output_format: OFFSCREEN_FORMAT,
        }
    }
}

impl CompositorConfig {
    /// Defaults, writing to the context's output format.
    pub fn for_gpu(gpu: &GpuContext) -> Self {
        Self {
            output_format: gpu.config.format,
            ..Default::default()
        }
    }

    pub fn with_background(mut self, background: wgpu::Color) -> Self {
        self.background = background;
        self
    }
}

/// Runs the toon + outline pipeline.
pub struct Compositor {
    config: CompositorConfig,
    plan: PassPlan,
    /// Texture units per pass, parallel to `plan.passes()`.
    units: Vec<Vec<TextureUnit>>,
    framebuffers: FramebufferSet,
    quad: FullScreenQuad,
    scene_renderer: SceneRenderer,
    stages: HashMap<StageId, ShaderStage>,
    pending_resize: Option<(u32, u32)>,
}

impl Compositor {
    /// Builds the toon + outline plan at the context's current size.
    pub fn new(gpu: &GpuContext, config: CompositorConfig, shaders: &ShaderLibrary) -> Result<Self> {
        Self::with_plan(gpu, config, shaders, PassPlan::toon_outline())
    }

    /// Builds an arbitrary plan over the same targets and programs.
    ///
    /// Validates the plan, compiles every program it uses and allocates the
    /// framebuffers. Any failure aborts construction.
    pub fn with_plan(
        gpu: &GpuContext,
        config: CompositorConfig,
        shaders: &ShaderLibrary,
        plan: PassPlan,
    ) -> Result<Self> {
        let max_units = gpu.max_texture_units();
        plan.validate(max_units)?;

        let units = plan
            .passes()
            .iter()
            .map(|pass| texture_units::assign(pass.label, pass.inputs.len(), max_units))
            .collect::<Result<Vec<_>>>()?;

        let scene_renderer = SceneRenderer::new(
            gpu,
            shaders.scene_color().source(),
            shaders.scene_depth().source(),
        )?;

        let mut stages = HashMap::new();
        for pass in plan.passes() {
            let PassKind::Fullscreen(id) = pass.kind else {
                continue;
            };
            let format = match pass.target {
                PassTarget::Offscreen(_) => RenderTarget::COLOR_FORMAT,
                PassTarget::Output => config.output_format,
            };
            let stage = ShaderStage::new(
                gpu,
                id.name(),
                shaders.stage(id).source(),
                &id.interface(),
                format,
            )?;
            log::debug!(
                "Pass '{}': {} -> {:?}, samplers {:?} <- {:?}",
                pass.label,
                id.name(),
                pass.target,
                stage.sampler_names(),
                pass.inputs
            );
            stages.insert(id, stage);
        }

        let framebuffers = FramebufferSet::new(gpu, gpu.width(), gpu.height())?;
        let quad = FullScreenQuad::new(gpu);

        log::info!(
            "Compositor ready: {} passes at {}x{}, output {:?}",
            plan.len(),
            gpu.width(),
            gpu.height(),
            config.output_format
        );

        Ok(Self {
            config,
            plan,
            units,
            framebuffers,
            quad,
            scene_renderer,
            stages,
            pending_resize: None,
        })
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn plan(&self) -> &PassPlan {
        &self.plan
    }

    pub fn framebuffers(&self) -> &FramebufferSet {
        &self.framebuffers
    }

    /// Texture units the `index`-th pass binds its inputs to.
    pub fn units(&self, index: usize) -> &[TextureUnit] {
        &self.units[index]
    }

    /// Records a new viewport size, applied at the start of the next frame.
    ///
    /// Zero sizes (a minimized window) are ignored.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::warn!("Ignoring resize to {width}x{height}");
            return;
        }
        self.pending_resize = Some((width, height));
    }

    pub fn pending_resize(&self) -> Option<(u32, u32)> {
        self.pending_resize
    }

    fn apply_pending_resize(&mut self, gpu: &mut GpuContext) -> Result<()> {
        let Some((width, height)) = self.pending_resize.take() else {
            return Ok(());
        };
        gpu.resize(width, height);
        if self.framebuffers.size() != (width, height) {
            self.framebuffers.resize(gpu, width, height)?;
        }
        Ok(())
    }

    /// Renders one frame to the window surface and presents it.
    ///
    /// A lost or outdated surface is reconfigured and acquired once more;
    /// any other acquisition failure is returned.
    pub fn render_frame(&mut self, gpu: &mut GpuContext, scene: &Scene) -> Result<()> {
        self.apply_pending_resize(gpu)?;

        let surface = gpu.surface.as_ref().ok_or(PipelineError::NoSurface)?;
        let output = match surface.get_current_texture() {
            Ok(output) => output,
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                log::warn!("Surface {err}, reconfiguring");
                gpu.reconfigure();
                surface.get_current_texture()?
            }
            Err(err) => return Err(err.into()),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let commands = self.record(gpu, scene, &view);
        gpu.queue.submit(std::iter::once(commands));
        output.present();
        Ok(())
    }

    /// Renders one frame into `target` instead of the surface.
    ///
    /// `target` must match the current viewport size and the configured
    /// output format.
    pub fn render_to_target(
        &mut self,
        gpu: &mut GpuContext,
        scene: &Scene,
        target: &RenderTarget,
    ) -> Result<()> {
        self.apply_pending_resize(gpu)?;

        if target.size() != self.framebuffers.size() {
            return Err(PipelineError::OutputMismatch(format!(
                "target is {:?}, viewport is {:?}",
                target.size(),
                self.framebuffers.size()
            )));
        }
        if RenderTarget::COLOR_FORMAT != self.config.output_format {
            return Err(PipelineError::OutputMismatch(format!(
                "target format {:?}, pipeline writes {:?}",
                RenderTarget::COLOR_FORMAT,
                self.config.output_format
            )));
        }

        let commands = self.record(gpu, scene, &target.view);
        gpu.queue.submit(std::iter::once(commands));
        Ok(())
    }

    fn record(&self, gpu: &GpuContext, scene: &Scene, output: &wgpu::TextureView) -> wgpu::CommandBuffer {
        let (width, height) = self.framebuffers.size();
        self.scene_renderer
            .prepare(gpu, scene, width as f32 / height as f32);

        let mut frame = FrameContext::new(gpu);
        for (pass, units) in self.plan.passes().iter().zip(&self.units) {
            let target = match pass.target {
                PassTarget::Offscreen(id) => Attachments::offscreen(id, self.framebuffers.target(id)),
                PassTarget::Output => Attachments::output(output),
            };

            match pass.kind {
                PassKind::SceneColor => self.scene_renderer.render_color(&mut frame, target, scene),
                PassKind::SceneDepth => self.scene_renderer.render_depth(&mut frame, target, scene),
                PassKind::Fullscreen(id) => self.run_stage(gpu, &mut frame, pass, units, id, target),
            }
        }
        debug_assert_eq!(frame.pass_count(), self.plan.len());
        frame.finish()
    }

    fn run_stage(
        &self,
        gpu: &GpuContext,
        frame: &mut FrameContext,
        pass: &PassDescriptor,
        units: &[TextureUnit],
        id: StageId,
        target: Attachments<'_>,
    ) {
        let (width, height) = self.framebuffers.size();

        let bindings: Vec<TextureBinding<'_>> = pass
            .inputs
            .iter()
            .zip(units)
            .map(|(&input, &unit)| {
                assert_ne!(
                    PassTarget::Offscreen(input),
                    target.id,
                    "pass '{}' samples the target it writes",
                    pass.label
                );
                TextureBinding {
                    unit,
                    view: self.framebuffers.color_texture(input),
                }
            })
            .collect();
        let uniforms: Vec<_> = pass
            .uniforms
            .iter()
            .map(|source| source.resolve(width, height))
            .collect();

        let clear = match target.id {
            PassTarget::Output => self.config.background,
            PassTarget::Offscreen(_) => wgpu::Color::TRANSPARENT,
        };

        // Post stages draw without depth testing, even into `Scene`.
        let target = Attachments {
            depth: None,
            ..target
        };

        let stage = &self.stages[&id];
        let mut render_pass = frame.begin_pass(pass.label, target, clear);
        debug_assert_eq!(render_pass.target(), pass.target);
        stage.run(gpu, &mut render_pass, &self.quad, &bindings, &uniforms);
    }

    /// Copies `target`'s color attachment back to the CPU.
    ///
    /// Blocks until the GPU has finished all submitted work.
    pub fn read_target(gpu: &GpuContext, target: &RenderTarget) -> Result<RgbaImage> {
        let (width, height) = target.size();
        let unpadded_row = width * 4;
        let padded_row = unpadded_row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        gpu.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| PipelineError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| PipelineError::Readback(e.to_string()))?
            .map_err(|e| PipelineError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded_row * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded_row as usize) {
                pixels.extend_from_slice(&row[..unpadded_row as usize]);
            }
        }
        buffer.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| PipelineError::Readback("pixel buffer size mismatch".to_string()))
    }
}
