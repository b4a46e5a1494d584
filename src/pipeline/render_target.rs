//! Offscreen render targets and the set of three the pipeline hands between passes.

use crate::error::{PipelineError, Result};
use crate::gpu::{GpuContext, OFFSCREEN_FORMAT};

/// Names the three offscreen targets owned by a [`FramebufferSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetId {
    /// Lit scene color (pass 1), reused as the outline mask (pass 4). Has depth.
    Scene,
    /// Toon-banded color (pass 2). Color only.
    ToonColor,
    /// Depth encoded as color (pass 3). Has depth.
    Depth,
}

impl TargetId {
    pub const ALL: [TargetId; 3] = [TargetId::Scene, TargetId::ToonColor, TargetId::Depth];

    pub fn label(self) -> &'static str {
        match self {
            TargetId::Scene => "Scene Target",
            TargetId::ToonColor => "Toon Color Target",
            TargetId::Depth => "Depth Target",
        }
    }

    /// Whether this target carries a depth attachment.
    pub fn has_depth(self) -> bool {
        !matches!(self, TargetId::ToonColor)
    }
}

/// An off-screen render target used for intermediate pass results.
///
/// The color attachment is an 8-bit RGBA texture that can be both rendered to
/// and sampled from. An optional `Depth32Float` attachment is created for
/// targets that receive scene geometry.
pub struct RenderTarget {
    /// The color texture.
    pub texture: wgpu::Texture,
    /// A view into the color texture, used both as attachment and for sampling.
    pub view: wgpu::TextureView,
    depth: Option<(wgpu::Texture, wgpu::TextureView)>,
    width: u32,
    height: u32,
}

impl RenderTarget {
    pub const COLOR_FORMAT: wgpu::TextureFormat = OFFSCREEN_FORMAT;
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Creates a target of the given size. Dimensions must be non-zero.
    pub fn new(gpu: &GpuContext, label: &str, width: u32, height: u32, with_depth: bool) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth = with_depth.then(|| {
            let depth_texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{label} Depth")),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
            (depth_texture, depth_view)
        });

        Self {
            texture,
            view,
            depth,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    /// The depth attachment view, if this target has one.
    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth.as_ref().map(|(_, view)| view)
    }
}

/// The three offscreen targets of the pipeline, always sized to the viewport.
///
/// | Target      | Color | Depth | Written by        | Read by         |
/// |-------------|-------|-------|-------------------|-----------------|
/// | `Scene`     | yes   | yes   | scene color, outline | toonify, combine |
/// | `ToonColor` | yes   | no    | toonify           | combine         |
/// | `Depth`     | yes   | yes   | scene depth       | outline         |
pub struct FramebufferSet {
    scene: RenderTarget,
    toon_color: RenderTarget,
    depth: RenderTarget,
    width: u32,
    height: u32,
}

impl FramebufferSet {
    /// Allocates all three targets at `width` x `height`.
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidViewport { width, height });
        }

        let [scene, toon_color, depth] =
            TargetId::ALL.map(|id| RenderTarget::new(gpu, id.label(), width, height, id.has_depth()));

        Ok(Self {
            scene,
            toon_color,
            depth,
            width,
            height,
        })
    }

    /// Recreates all three targets at the new size.
    ///
    /// The replacement set is fully built before any target is swapped, so no
    /// caller can observe targets of mixed sizes. Must only be called between
    /// frames.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()> {
        *self = Self::new(gpu, width, height)?;
        log::info!("Framebuffers resized to {width}x{height}");
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn target(&self, id: TargetId) -> &RenderTarget {
        match id {
            TargetId::Scene => &self.scene,
            TargetId::ToonColor => &self.toon_color,
            TargetId::Depth => &self.depth,
        }
    }

    /// The sampleable color view of `id`.
    ///
    /// Sampling a target inside the pass that writes it is forbidden. The
    /// compositor rejects such plans at construction and asserts it per pass.
    pub fn color_texture(&self, id: TargetId) -> &wgpu::TextureView {
        &self.target(id).view
    }
}
