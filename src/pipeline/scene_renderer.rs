//! Draws the model into an offscreen target through the color or depth path.
//!
//! Both paths share one bind group at group 0:
//!
//! - binding 0: [`CameraUniforms`] (view-projection, view, position, clip planes)
//! - binding 1: [`ModelUniforms`] (model and normal matrices, base color)
//! - binding 2: [`LightUniforms`] (directional light and ambient term)
//!
//! The color path shades with ambient plus Lambert directional lighting. The
//! depth path culls back faces and writes linear view depth, normalized to
//! `[near, far]`, as a 24-bit fixed-point value in RGB with alpha 1. Both
//! clear to transparent, so background pixels keep alpha 0.

use crate::error::{PipelineError, Result};
use crate::gpu::GpuContext;
use crate::mesh::Vertex3d;
use crate::scene::Scene;

use super::frame::{Attachments, FrameContext};
use super::reflect;
use super::render_target::RenderTarget;

/// Camera uniforms shared by both scene paths.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub position: [f32; 3],
    pub near: f32,
    pub far: f32,
    pub _padding: [f32; 3],
}

/// Placement and base color of the model.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelUniforms {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of `model`, for normals under non-uniform scale.
    pub normal_matrix: [[f32; 4]; 4],
    pub color: [f32; 4],
}

/// One directional light plus ambient.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniforms {
    pub color: [f32; 3],
    pub _pad0: f32,
    pub direction: [f32; 3],
    pub _pad1: f32,
    pub ambient: [f32; 3],
    pub _pad2: f32,
}

impl CameraUniforms {
    pub fn from_scene(scene: &Scene, aspect: f32) -> Self {
        let camera = &scene.camera;
        Self {
            view_proj: camera.view_projection(aspect).to_cols_array_2d(),
            view: camera.view_matrix().to_cols_array_2d(),
            position: camera.position.to_array(),
            near: camera.near,
            far: camera.far,
            _padding: [0.0; 3],
        }
    }
}

impl ModelUniforms {
    pub fn from_scene(scene: &Scene) -> Self {
        let model = scene.model.transform.matrix();
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            color: scene.model.color.to_array(),
        }
    }
}

impl LightUniforms {
    pub fn from_scene(scene: &Scene) -> Self {
        Self {
            color: scene.light.color.to_array(),
            _pad0: 0.0,
            direction: scene.light.direction.to_array(),
            _pad1: 0.0,
            ambient: scene.ambient.to_array(),
            _pad2: 0.0,
        }
    }
}

/// Largest value of the 24-bit fixed-point depth encoding.
pub const DEPTH_ENCODING_MAX: u32 = 0x00FF_FFFF;

/// Encodes a normalized depth into RGB bytes, most significant byte first.
///
/// Mirrors the depth shader so tests can predict target contents.
pub fn encode_depth(depth: f32) -> [u8; 3] {
    let fixed = (depth.clamp(0.0, 1.0) * DEPTH_ENCODING_MAX as f32) as u32;
    [(fixed >> 16) as u8, (fixed >> 8) as u8, fixed as u8]
}

/// Decodes RGB bytes written by the depth path back into `[0, 1]`.
pub fn decode_depth(rgb: [u8; 3]) -> f32 {
    let fixed = (rgb[0] as u32) << 16 | (rgb[1] as u32) << 8 | rgb[2] as u32;
    fixed as f32 / DEPTH_ENCODING_MAX as f32
}

/// Renders the single scene model for the color and depth passes.
pub struct SceneRenderer {
    color_pipeline: wgpu::RenderPipeline,
    depth_pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    model_buffer: wgpu::Buffer,
    light_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl SceneRenderer {
    /// Builds both scene pipelines from WGSL sources.
    pub fn new(gpu: &GpuContext, color_source: &str, depth_source: &str) -> Result<Self> {
        let device = &gpu.device;

        let camera_buffer = Self::uniform_buffer(device, "Camera Uniforms", size_of::<CameraUniforms>());
        let model_buffer = Self::uniform_buffer(device, "Model Uniforms", size_of::<ModelUniforms>());
        let light_buffer = Self::uniform_buffer(device, "Light Uniforms", size_of::<LightUniforms>());

        let entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &[entry(0), entry(1), entry(2)],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: model_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: light_buffer.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let color_pipeline = Self::pipeline(gpu, &pipeline_layout, "scene_color", color_source)?;
        let depth_pipeline = Self::pipeline(gpu, &pipeline_layout, "scene_depth", depth_source)?;

        log::info!("Scene renderer ready (color + depth paths)");

        Ok(Self {
            color_pipeline,
            depth_pipeline,
            camera_buffer,
            model_buffer,
            light_buffer,
            bind_group,
        })
    }

    fn uniform_buffer(device: &wgpu::Device, label: &str, size: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn pipeline(
        gpu: &GpuContext,
        layout: &wgpu::PipelineLayout,
        name: &str,
        source: &str,
    ) -> Result<wgpu::RenderPipeline> {
        let module = reflect::compile(name, source)?;
        reflect::require_entry_points(name, &module)?;

        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{name} Pipeline")),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some(reflect::VERTEX_ENTRY),
                buffers: &[Vertex3d::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(reflect::FRAGMENT_ENTRY),
                targets: &[Some(wgpu::ColorTargetState {
                    format: RenderTarget::COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: RenderTarget::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(PipelineError::ShaderCompile {
                program: name.to_string(),
                message: err.to_string(),
            }),
            None => Ok(pipeline),
        }
    }

    /// Uploads camera, model and light uniforms for this frame.
    pub fn prepare(&self, gpu: &GpuContext, scene: &Scene, aspect: f32) {
        gpu.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::bytes_of(&CameraUniforms::from_scene(scene, aspect)),
        );
        gpu.queue.write_buffer(
            &self.model_buffer,
            0,
            bytemuck::bytes_of(&ModelUniforms::from_scene(scene)),
        );
        gpu.queue.write_buffer(
            &self.light_buffer,
            0,
            bytemuck::bytes_of(&LightUniforms::from_scene(scene)),
        );
    }

    /// Draws the lit model into `target`.
    pub fn render_color(&self, frame: &mut FrameContext, target: Attachments<'_>, scene: &Scene) {
        self.draw(frame, target, scene, &self.color_pipeline, "scene-color");
    }

    /// Draws the model's encoded linear depth into `target`.
    pub fn render_depth(&self, frame: &mut FrameContext, target: Attachments<'_>, scene: &Scene) {
        self.draw(frame, target, scene, &self.depth_pipeline, "scene-depth");
    }

    fn draw(
        &self,
        frame: &mut FrameContext,
        target: Attachments<'_>,
        scene: &Scene,
        pipeline: &wgpu::RenderPipeline,
        label: &str,
    ) {
        assert!(
            target.depth.is_some(),
            "{label} needs a target with a depth attachment"
        );

        let mesh = &scene.model.mesh;
        let mut pass = frame.begin_pass(label, target, wgpu::Color::TRANSPARENT);
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count(), 0, 0..1);
    }
}
