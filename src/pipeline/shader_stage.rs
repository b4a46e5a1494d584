//! A compiled post-process program and the quad draw that runs it.
//!
//! [`ShaderStage`] owns one render pipeline, its bind group layout, a shared
//! nearest-filtering sampler and one uniform buffer per `var<uniform>` block.
//! The layout is built from reflection, so texture and uniform names are
//! resolved once at construction. A missing name aborts construction instead
//! of silently sampling nothing at draw time.

use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};
use crate::gpu::GpuContext;
use crate::quad::{FullScreenQuad, QuadVertex};

use super::reflect::{self, ProgramInterface, StageInterface, UniformValue};
use super::texture_units::{self, TextureBinding};

/// A post-process shader program bound to a full-screen quad pipeline.
pub struct ShaderStage {
    name: String,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffers: Vec<wgpu::Buffer>,
    resolved: ProgramInterface,
    declared: StageInterface,
}

impl ShaderStage {
    /// Compiles `source`, resolves `interface` against it and builds the pipeline.
    ///
    /// Fails on WGSL errors, missing `vs`/`fs` entry points, unresolved texture
    /// or uniform names, and resources the program declares but the stage
    /// never binds.
    pub fn new(
        gpu: &GpuContext,
        name: &str,
        source: &str,
        interface: &StageInterface,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let module = reflect::compile(name, source)?;
        reflect::require_entry_points(name, &module)?;
        let resolved = reflect::reflect(name, &module, interface)?;

        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{name} Sampler")),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffers: Vec<wgpu::Buffer> = resolved
            .blocks
            .iter()
            .map(|block| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{name} {} Uniforms", block.name)),
                    size: block.size as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let mut entries = Vec::new();
        for block in &resolved.blocks {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        for &binding in &resolved.textures {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: resolved.sampler_binding,
            visibility,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{name} Bind Group Layout")),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{name} Pipeline Layout")),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{name} Pipeline")),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some(reflect::VERTEX_ENTRY),
                buffers: &[QuadVertex::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(reflect::FRAGMENT_ENTRY),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(PipelineError::ShaderCompile {
                program: name.to_string(),
                message: err.to_string(),
            });
        }

        log::debug!(
            "Built stage '{name}': {} texture(s), {} uniform block(s)",
            resolved.textures.len(),
            resolved.blocks.len()
        );

        Ok(Self {
            name: name.to_string(),
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffers,
            resolved,
            declared: *interface,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of textures the program samples, one per unit.
    pub fn sampler_count(&self) -> usize {
        self.declared.samplers.len()
    }

    /// Texture names in unit order.
    pub fn sampler_names(&self) -> &'static [&'static str] {
        self.declared.samplers
    }

    /// Number of uniform values [`run`](Self::run) expects.
    pub fn uniform_count(&self) -> usize {
        self.declared.uniforms.len()
    }

    /// Binds `bindings` and `uniforms`, then draws the quad once into `render_pass`.
    ///
    /// Unit `k` of `bindings` feeds the `k`-th declared texture. `uniforms` are
    /// given in declaration order.
    ///
    /// # Panics
    ///
    /// Panics if the binding or uniform count differs from the program's, if two
    /// bindings share a unit, or if a uniform value has the wrong type. A
    /// validated pass plan never does any of these.
    pub fn run(
        &self,
        gpu: &GpuContext,
        render_pass: &mut wgpu::RenderPass<'_>,
        quad: &FullScreenQuad,
        bindings: &[TextureBinding<'_>],
        uniforms: &[UniformValue],
    ) {
        assert_eq!(
            bindings.len(),
            self.sampler_count(),
            "stage '{}' binds {} textures, program samples {}",
            self.name,
            bindings.len(),
            self.sampler_count()
        );
        assert!(
            texture_units::units_are_distinct(bindings),
            "stage '{}' bound two textures to one unit",
            self.name
        );
        assert_eq!(uniforms.len(), self.uniform_count(), "stage '{}' uniform count", self.name);

        // Pack every block on the CPU, then upload each once.
        let mut packed: BTreeMap<usize, Vec<u8>> = BTreeMap::new();
        for (value, slot) in uniforms.iter().zip(&self.resolved.uniforms) {
            assert_eq!(value.kind(), slot.kind, "stage '{}' uniform type", self.name);
            let block = packed
                .entry(slot.block)
                .or_insert_with(|| vec![0; self.resolved.blocks[slot.block].size as usize]);
            let start = slot.offset as usize;
            block[start..start + value.as_bytes().len()].copy_from_slice(value.as_bytes());
        }
        for (index, bytes) in &packed {
            gpu.queue.write_buffer(&self.uniform_buffers[*index], 0, bytes);
        }

        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = self
            .resolved
            .blocks
            .iter()
            .zip(&self.uniform_buffers)
            .map(|(block, buffer)| wgpu::BindGroupEntry {
                binding: block.binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        for binding in bindings {
            entries.push(wgpu::BindGroupEntry {
                binding: self.resolved.textures[binding.unit.index()],
                resource: wgpu::BindingResource::TextureView(binding.view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: self.resolved.sampler_binding,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Bind Group", self.name)),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        quad.draw(render_pass);
    }
}

impl std::fmt::Debug for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderStage")
            .field("name", &self.name)
            .field("interface", &self.resolved)
            .finish_non_exhaustive()
    }
}
