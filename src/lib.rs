//! # Celline
//!
//! **Toon shading with crisp depth outlines, composited in five passes.**
//!
//! A single model is drawn twice: once lit, once as encoded depth. The lit
//! color is quantized into flat bands, the depth image is edge-detected into
//! an outline mask, and the two are combined on screen.
//!
//! ## Quick Start
//!
//! ```no_run
//! use celline::*;
//!
//! fn main() -> celline::Result<()> {
//!     run(AppConfig::new().title("Toonify"), |gpu| {
//!         let camera = Camera::new().at(5.0, 5.0, 5.0).looking_at(0.0, 0.0, 0.0);
//!         Ok(Scene::new(camera, Model::new(Mesh::cube(gpu))))
//!     })
//! }
//! ```
//!
//! ## Headless
//!
//! ```no_run
//! use celline::*;
//!
//! # fn main() -> celline::Result<()> {
//! let mut gpu = GpuContext::headless(320, 240)?;
//! let camera = Camera::new().at(5.0, 5.0, 5.0).looking_at(0.0, 0.0, 0.0);
//! let scene = Scene::new(camera, Model::new(Mesh::sphere(&gpu, 32, 16)));
//!
//! let mut compositor = Compositor::new(&gpu, CompositorConfig::for_gpu(&gpu), &ShaderLibrary::builtin())?;
//! let output = RenderTarget::new(&gpu, "Output", 320, 240, false);
//! compositor.render_to_target(&mut gpu, &scene, &output)?;
//! let image = Compositor::read_target(&gpu, &output)?;
//! # let _ = image;
//! # Ok(())
//! # }
//! ```
//!
//! See [`pipeline`] for the pass structure.

mod app;
mod camera;
mod error;
mod gpu;
mod mesh;
pub mod pipeline;
mod quad;
mod scene;
mod shader_library;

pub use app::{AppConfig, FpsLogger, SHADER_DIR_ENV, run};
pub use camera::Camera;
pub use error::{PipelineError, Result};
pub use gpu::{GpuContext, OFFSCREEN_FORMAT};
pub use mesh::{Mesh, MeshData, Transform, Vertex3d};
pub use pipeline::{Compositor, CompositorConfig, FramebufferSet, PassPlan, RenderTarget, TargetId};
pub use quad::{FullScreenQuad, QUAD_VERTICES, QuadVertex, fan_indices};
pub use scene::{DirectionalLight, Model, Scene};
pub use shader_library::{SCENE_COLOR, SCENE_DEPTH, ShaderLibrary, ShaderSource};

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
