//! Error types for pipeline construction and frame rendering.
//!
//! Setup failures (device, shaders, uniform resolution, pass plan validation)
//! are reported before the first frame and abort construction. The only
//! per-frame failures are surface acquisition and readback, which propagate
//! to the host loop.

use thiserror::Error;

use crate::pipeline::TargetId;

/// The error type for everything in this crate.
#[derive(Error, Debug)]
pub enum PipelineError {
    // ========================================================================
    // Device & Surface
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// Failed to create a window surface.
    #[error("Failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    /// The surface texture for this frame could not be acquired.
    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// Reading a target back to the CPU failed.
    #[error("Readback failed: {0}")]
    Readback(String),

    /// A viewport or target was requested with a zero dimension.
    #[error("Invalid viewport size {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },

    /// A frame was requested for presentation on a context without a surface.
    #[error("GPU context has no surface to present to")]
    NoSurface,

    /// A caller-supplied output target does not fit the pipeline.
    #[error("Output target mismatch: {0}")]
    OutputMismatch(String),

    /// The window event loop could not be created or run.
    #[error("Event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    /// The window could not be created.
    #[error("Failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    // ========================================================================
    // Shader Programs
    // ========================================================================
    /// A shader source file could not be read.
    #[error("Failed to read shader '{path}': {source}")]
    ShaderIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// WGSL parsing or validation failed.
    #[error("Shader '{program}' failed to compile:\n{message}")]
    ShaderCompile { program: String, message: String },

    /// A required `vs` / `fs` entry point is absent.
    #[error("Shader '{program}' has no {stage} entry point named '{entry}'")]
    MissingEntryPoint {
        program: String,
        stage: &'static str,
        entry: &'static str,
    },

    /// A declared sampler or uniform was not found in the program.
    #[error("Shader '{program}' does not declare uniform '{name}'")]
    MissingUniform { program: String, name: String },

    /// A uniform exists but with a different type than declared.
    #[error("Uniform '{name}' in shader '{program}' is {found}, expected {expected}")]
    UniformTypeMismatch {
        program: String,
        name: String,
        expected: String,
        found: String,
    },

    /// The program declares a texture or sampler the stage never binds.
    #[error("Shader '{program}' declares '{name}', which the stage does not bind")]
    UnboundResource { program: String, name: String },

    // ========================================================================
    // Pass Plan
    // ========================================================================
    /// A pass needs more texture units than the device provides.
    #[error("Pass '{pass}' needs {requested} texture units, device allows {max}")]
    TextureUnitsExhausted {
        pass: &'static str,
        requested: usize,
        max: u32,
    },

    /// A pass samples the target it writes.
    #[error("Pass '{pass}' samples {target:?} while writing it")]
    ReadWriteAlias { pass: &'static str, target: TargetId },

    /// A pass samples a target no earlier pass has written.
    #[error("Pass '{pass}' samples {target:?} before any pass writes it")]
    NonCausalPass { pass: &'static str, target: TargetId },

    /// A pass supplies a different number of inputs than its program samples.
    #[error("Pass '{pass}' binds {supplied} textures, program '{program}' samples {expected}")]
    BindingCountMismatch {
        pass: &'static str,
        program: String,
        supplied: usize,
        expected: usize,
    },

    /// The plan is structurally unusable (empty, or does not end on the output).
    #[error("Invalid pass plan: {0}")]
    InvalidPlan(String),
}

/// Alias for `Result<T, PipelineError>`.
pub type Result<T> = std::result::Result<T, PipelineError>;
