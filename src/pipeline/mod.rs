//! The multi-pass toon + outline render pipeline.
//!
//! Five passes run every frame, handing results between three offscreen
//! targets:
//!
//! ```text
//!            ┌──────────────┐   Scene    ┌──────────┐  ToonColor
//!  model ───▶│ scene-color  │──────────▶ │ toonify  │─────────────┐
//!            └──────────────┘            └──────────┘             ▼
//!            ┌──────────────┐   Depth    ┌──────────┐  Scene  ┌─────────┐
//!  model ───▶│ scene-depth  │──────────▶ │ outline  │────────▶│ combine │──▶ output
//!            └──────────────┘            └──────────┘         └─────────┘
//! ```
//!
//! The `Scene` target is written twice: first with lit color, consumed by
//! toonify, then overwritten by the outline mask.
//!
//! # Pieces
//!
//! - [`FramebufferSet`]: the three targets, created and resized together
//! - [`SceneRenderer`]: the model through the color path or the depth path
//! - [`ShaderStage`]: one post-process program with a reflected binding contract
//! - [`PassPlan`]: the ordered pass list, validated once at construction
//! - [`Compositor`]: owns everything above and records each frame
//!
//! # Example
//!
//! ```no_run
//! use celline::{Compositor, CompositorConfig, GpuContext, ShaderLibrary};
//!
//! # fn demo(mut gpu: GpuContext, scene: celline::Scene) -> celline::Result<()> {
//! let config = CompositorConfig::for_gpu(&gpu);
//! let mut compositor = Compositor::new(&gpu, config, &ShaderLibrary::builtin())?;
//!
//! // In the event loop:
//! compositor.request_resize(1280, 720);
//! compositor.render_frame(&mut gpu, &scene)?;
//! # Ok(())
//! # }
//! ```

mod compositor;
mod frame;
mod pass;
pub mod reflect;
mod render_target;
mod scene_renderer;
mod shader_stage;
pub mod texture_units;

pub use compositor::{Compositor, CompositorConfig};
pub use frame::{Attachments, BoundPass, FrameContext};
pub use pass::{PassDescriptor, PassKind, PassPlan, PassTarget, StageId, UniformSource};
pub use reflect::{StageInterface, UniformKind, UniformValue};
pub use render_target::{FramebufferSet, RenderTarget, TargetId};
pub use scene_renderer::{
    CameraUniforms, LightUniforms, ModelUniforms, SceneRenderer, decode_depth, encode_depth,
};
pub use shader_stage::ShaderStage;
pub use texture_units::{TextureBinding, TextureUnit};
