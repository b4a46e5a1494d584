//! Per-frame recording state.
//!
//! A [`FrameContext`] owns the command encoder for one frame and remembers
//! which target is bound for writing. Beginning a pass hands out a
//! [`BoundPass`] that borrows the context mutably, so a second target cannot
//! be bound until the first pass is dropped.

use std::ops::{Deref, DerefMut};

use crate::gpu::GpuContext;

use super::pass::PassTarget;
use super::render_target::{RenderTarget, TargetId};

/// The views a pass renders into.
#[derive(Clone, Copy, Debug)]
pub struct Attachments<'a> {
    pub id: PassTarget,
    pub color: &'a wgpu::TextureView,
    pub depth: Option<&'a wgpu::TextureView>,
}

impl<'a> Attachments<'a> {
    pub fn offscreen(id: TargetId, target: &'a RenderTarget) -> Self {
        Self {
            id: PassTarget::Offscreen(id),
            color: &target.view,
            depth: target.depth_view(),
        }
    }

    /// The output: the surface texture, or a caller-owned target when headless.
    pub fn output(color: &'a wgpu::TextureView) -> Self {
        Self {
            id: PassTarget::Output,
            color,
            depth: None,
        }
    }
}

/// Command encoder plus the currently bound target.
pub struct FrameContext {
    encoder: wgpu::CommandEncoder,
    bound: Option<PassTarget>,
    passes: usize,
}

impl FrameContext {
    pub fn new(gpu: &GpuContext) -> Self {
        let encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        Self {
            encoder,
            bound: None,
            passes: 0,
        }
    }

    /// Binds `target` for writing, clearing color to `clear` and depth to the
    /// far plane.
    ///
    /// The target stays bound until the returned pass is dropped.
    pub fn begin_pass(
        &mut self,
        label: &str,
        target: Attachments<'_>,
        clear: wgpu::Color,
    ) -> BoundPass<'_> {
        assert!(
            self.bound.is_none(),
            "pass '{label}' began while {:?} is still bound",
            self.bound
        );
        self.bound = Some(target.id);
        self.passes += 1;

        let pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: target.depth.map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        BoundPass {
            pass,
            target: target.id,
            bound: &mut self.bound,
        }
    }

    /// The target bound for writing, if a pass is open.
    pub fn bound(&self) -> Option<PassTarget> {
        self.bound
    }

    /// Number of passes recorded so far.
    pub fn pass_count(&self) -> usize {
        self.passes
    }

    pub fn finish(self) -> wgpu::CommandBuffer {
        self.encoder.finish()
    }
}

/// An open render pass. Dropping it unbinds the target.
pub struct BoundPass<'f> {
    pass: wgpu::RenderPass<'f>,
    target: PassTarget,
    bound: &'f mut Option<PassTarget>,
}

impl BoundPass<'_> {
    pub fn target(&self) -> PassTarget {
        self.target
    }
}

impl<'f> Deref for BoundPass<'f> {
    type Target = wgpu::RenderPass<'f>;

    fn deref(&self) -> &Self::Target {
        &self.pass
    }
}

impl DerefMut for BoundPass<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pass
    }
}

impl Drop for BoundPass<'_> {
    fn drop(&mut self) {
        *self.bound = None;
    }
}
