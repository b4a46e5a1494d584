//! Pipeline Integration Tests
//!
//! Tests for:
//! - Framebuffer allocation and resize
//! - Deferred viewport resize through the compositor
//! - Scene color / depth passes and background masking
//! - Toon banding, outline mask and final composition
//! - Frame idempotence and outline independence from lit color
//! - Setup failures (bad shaders, bad plans, mismatched outputs)
//!
//! Every test needs a GPU adapter. Without one (CI without a software
//! rasterizer), the test logs a line and returns, so a green run proves
//! nothing on such a machine. Set `CELLINE_REQUIRE_GPU=1` to make a missing
//! adapter fail every test instead.

use std::collections::HashSet;

use celline::pipeline::{
    Attachments, FrameContext, PassKind, SceneRenderer, TextureUnit, decode_depth,
};
use celline::{
    Camera, Compositor, CompositorConfig, FramebufferSet, GpuContext, Mesh, Model, PassPlan,
    PipelineError, RenderTarget, Scene, ShaderLibrary, TargetId, Transform,
};
use image::RgbaImage;

const WIDTH: u32 = 128;
const HEIGHT: u32 = 128;

/// Camera-space depth of the cube corner nearest the camera, normalized to
/// the clip range: (|(5,5,5)| - |(2,2,2)| - near) / (far - near).
const NEAREST_CORNER_DEPTH: f32 = (8.660_254 - 3.464_102 - 1.0) / 999.0;
const DEPTH_EPSILON: f32 = 1e-3;

/// `OUTLINE_COLOR` in outline.wgsl, as stored in an 8-bit target.
const OUTLINE_RGB: [u8; 3] = [13, 13, 13];

const REQUIRE_GPU_ENV: &str = "CELLINE_REQUIRE_GPU";

fn headless(width: u32, height: u32) -> Option<GpuContext> {
    match GpuContext::headless(width, height) {
        Ok(gpu) => Some(gpu),
        Err(err) if std::env::var_os(REQUIRE_GPU_ENV).is_some() => {
            panic!("{REQUIRE_GPU_ENV} is set but no GPU adapter is available: {err}")
        }
        Err(err) => {
            eprintln!("skipping: no GPU adapter ({err})");
            None
        }
    }
}

fn camera() -> Camera {
    Camera::new()
        .at(5.0, 5.0, 5.0)
        .looking_at(0.0, 0.0, 0.0)
        .with_fov(67.0)
        .with_clip(1.0, 1000.0)
}

/// A cube of side 4 at the origin, large enough to cover the image center.
fn cube_scene(gpu: &GpuContext, color: [f32; 3]) -> Scene {
    let model = Model::new(Mesh::cube(gpu))
        .with_transform(Transform::new().uniform_scale(4.0))
        .with_color(color[0], color[1], color[2]);
    Scene::new(camera(), model)
}

fn sphere_scene(gpu: &GpuContext) -> Scene {
    let model = Model::new(Mesh::sphere(gpu, 48, 24))
        .with_transform(Transform::new().uniform_scale(6.0))
        .with_color(0.9, 0.45, 0.2);
    Scene::new(camera(), model)
}

fn render(gpu: &mut GpuContext, compositor: &mut Compositor, scene: &Scene) -> RgbaImage {
    let (width, height) = compositor.framebuffers().size();
    let output = RenderTarget::new(gpu, "Test Output", width, height, false);
    compositor
        .render_to_target(gpu, scene, &output)
        .expect("frame should render");
    Compositor::read_target(gpu, &output).expect("readback should succeed")
}

fn read(gpu: &GpuContext, compositor: &Compositor, id: TargetId) -> RgbaImage {
    Compositor::read_target(gpu, compositor.framebuffers().target(id))
        .expect("readback should succeed")
}

fn corners(image: &RgbaImage) -> [[u8; 4]; 4] {
    let (w, h) = image.dimensions();
    [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)].map(|(x, y)| image.get_pixel(x, y).0)
}

fn center(image: &RgbaImage) -> [u8; 4] {
    let (w, h) = image.dimensions();
    image.get_pixel(w / 2, h / 2).0
}

fn alpha_mask(image: &RgbaImage) -> Vec<bool> {
    image.pixels().map(|p| p.0[3] > 0).collect()
}

fn near(a: u8, b: u8, tolerance: u8) -> bool {
    a.abs_diff(b) <= tolerance
}

// ============================================================================
// Framebuffers
// ============================================================================

#[test]
fn framebuffers_resize_all_targets_together() {
    let Some(gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };

    let mut framebuffers = FramebufferSet::new(&gpu, 64, 32).unwrap();
    assert_eq!(framebuffers.size(), (64, 32));

    framebuffers.resize(&gpu, 200, 150).unwrap();
    assert_eq!(framebuffers.size(), (200, 150));
    for id in TargetId::ALL {
        let target = framebuffers.target(id);
        assert_eq!(target.size(), (200, 150), "{id:?} was not resized");
        assert_eq!(target.has_depth(), id.has_depth(), "{id:?} depth attachment");
    }
}

#[test]
fn framebuffers_reject_zero_size() {
    let Some(gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };

    let result = FramebufferSet::new(&gpu, 0, 32);
    assert!(
        matches!(result, Err(PipelineError::InvalidViewport { width: 0, height: 32 })),
        "zero width should be rejected, got {:?}",
        result.err()
    );

    let mut framebuffers = FramebufferSet::new(&gpu, 16, 16).unwrap();
    assert!(framebuffers.resize(&gpu, 16, 0).is_err());
    assert_eq!(framebuffers.size(), (16, 16), "failed resize must keep the old size");
}

#[test]
fn resize_is_applied_at_next_frame() {
    let Some(mut gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let mut compositor = Compositor::new(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
    )
    .unwrap();
    let scene = cube_scene(&gpu, [0.9, 0.45, 0.2]);

    compositor.request_resize(96, 48);
    assert_eq!(compositor.pending_resize(), Some((96, 48)));
    assert_eq!(compositor.framebuffers().size(), (WIDTH, HEIGHT), "resize is deferred");

    compositor.request_resize(0, 48);
    assert_eq!(compositor.pending_resize(), Some((96, 48)), "zero size is ignored");

    let output = RenderTarget::new(&gpu, "Resized Output", 96, 48, false);
    compositor.render_to_target(&mut gpu, &scene, &output).unwrap();

    assert_eq!(compositor.pending_resize(), None);
    assert_eq!(compositor.framebuffers().size(), (96, 48));
    for id in TargetId::ALL {
        assert_eq!(compositor.framebuffers().target(id).size(), (96, 48));
    }
    assert_eq!((gpu.width(), gpu.height()), (96, 48));
}

// ============================================================================
// Full Frame
// ============================================================================

#[test]
fn toon_outline_plan_renders_a_frame() {
    let Some(mut gpu) = headless(64, 64) else {
        return;
    };
    let mut compositor = Compositor::with_plan(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
        PassPlan::toon_outline(),
    )
    .unwrap();
    let scene = cube_scene(&gpu, [0.9, 0.45, 0.2]);

    // The outline pass writes `Scene`, which carries a depth attachment.
    let outline = compositor
        .plan()
        .passes()
        .iter()
        .position(|pass| pass.label == "outline")
        .expect("plan has an outline pass");
    assert!(TargetId::Scene.has_depth());

    let output = RenderTarget::new(&gpu, "Frame Output", 64, 64, false);
    compositor
        .render_to_target(&mut gpu, &scene, &output)
        .expect("full frame should render");
    let image = Compositor::read_target(&gpu, &output).unwrap();

    assert_eq!(compositor.units(outline), &[TextureUnit(0)]);
    assert_eq!(center(&image)[3], 255, "model must reach the output");
    assert_eq!(corners(&image)[0][3], 0, "background stays transparent");
}

#[test]
fn texture_units_restart_per_pass() {
    let Some(gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let compositor = Compositor::new(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
    )
    .unwrap();

    for (index, pass) in compositor.plan().passes().iter().enumerate() {
        let units = compositor.units(index);
        assert_eq!(units.len(), pass.inputs.len(), "pass '{}'", pass.label);
        let expected: Vec<TextureUnit> = (0..units.len() as u32).map(TextureUnit).collect();
        assert_eq!(units, expected.as_slice(), "pass '{}'", pass.label);
        if matches!(pass.kind, PassKind::SceneColor | PassKind::SceneDepth) {
            assert!(units.is_empty(), "scene pass '{}' samples nothing", pass.label);
        }
    }
}

// ============================================================================
// Scene Passes
// ============================================================================

#[test]
fn scene_color_masks_background() {
    let Some(gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let shaders = ShaderLibrary::builtin();
    let renderer = SceneRenderer::new(
        &gpu,
        shaders.scene_color().source(),
        shaders.scene_depth().source(),
    )
    .unwrap();
    let scene = cube_scene(&gpu, [0.9, 0.45, 0.2]);
    let target = RenderTarget::new(&gpu, "Scene", WIDTH, HEIGHT, true);

    renderer.prepare(&gpu, &scene, gpu.aspect());
    let mut frame = FrameContext::new(&gpu);
    renderer.render_color(&mut frame, Attachments::offscreen(TargetId::Scene, &target), &scene);
    assert_eq!(frame.pass_count(), 1);
    assert_eq!(frame.bound(), None, "pass must unbind when dropped");
    gpu.queue.submit(std::iter::once(frame.finish()));

    let image = Compositor::read_target(&gpu, &target).unwrap();
    for corner in corners(&image) {
        assert_eq!(corner[3], 0, "background must be transparent, got {corner:?}");
    }
    let lit = center(&image);
    assert_eq!(lit[3], 255, "model pixels are opaque");
    assert!(lit[0] > lit[1] && lit[1] > lit[2], "lit color keeps model hue: {lit:?}");
}

#[test]
fn scene_depth_encodes_linear_depth() {
    let Some(mut gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let mut compositor = Compositor::new(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
    )
    .unwrap();
    let scene = cube_scene(&gpu, [0.9, 0.45, 0.2]);
    render(&mut gpu, &mut compositor, &scene);

    let depth = read(&gpu, &compositor, TargetId::Depth);
    for corner in corners(&depth) {
        assert_eq!(corner[3], 0, "depth background must be transparent");
    }

    let [r, g, b, a] = center(&depth);
    assert_eq!(a, 255);
    let decoded = decode_depth([r, g, b]);
    assert!(
        (decoded - NEAREST_CORNER_DEPTH).abs() < DEPTH_EPSILON,
        "center depth {decoded}, expected about {NEAREST_CORNER_DEPTH}"
    );
}

// ============================================================================
// Post Passes
// ============================================================================

#[test]
fn toonify_quantizes_into_bands() {
    let Some(mut gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let mut compositor = Compositor::new(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
    )
    .unwrap();
    let scene = sphere_scene(&gpu);
    render(&mut gpu, &mut compositor, &scene);

    let toon = read(&gpu, &compositor, TargetId::ToonColor);
    let bands: HashSet<u8> = toon
        .pixels()
        .filter(|p| p.0[3] > 0)
        .map(|p| p.0[0].max(p.0[1]).max(p.0[2]))
        .collect();

    assert!(!bands.is_empty(), "sphere should cover some pixels");
    for value in &bands {
        assert!(
            [64, 128, 191, 255].iter().any(|&band| near(*value, band, 1)),
            "brightness {value} is not on a band"
        );
    }
    assert!(bands.len() <= 8, "too many distinct brightness levels: {bands:?}");
    for corner in corners(&toon) {
        assert_eq!(corner[3], 0, "toonify must keep the background transparent");
    }
}

#[test]
fn outline_marks_silhouette_only() {
    let Some(mut gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let mut compositor = Compositor::new(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
    )
    .unwrap();
    let scene = cube_scene(&gpu, [0.9, 0.45, 0.2]);
    render(&mut gpu, &mut compositor, &scene);

    let outline = read(&gpu, &compositor, TargetId::Scene);
    let depth = read(&gpu, &compositor, TargetId::Depth);

    let mut marked = 0;
    for (x, y, pixel) in outline.enumerate_pixels() {
        if pixel.0[3] == 0 {
            continue;
        }
        marked += 1;
        let [r, g, b, _] = pixel.0;
        assert_eq!([r, g, b], OUTLINE_RGB, "outline color at ({x}, {y})");
        assert_eq!(
            depth.get_pixel(x, y).0[3],
            255,
            "outline at ({x}, {y}) lies outside the model"
        );
    }
    assert!(marked > 0, "silhouette should produce outline pixels");
    assert_eq!(center(&outline)[3], 0, "flat interior must not be outlined");
}

#[test]
fn outline_ignores_lit_color() {
    let Some(mut gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let mut compositor = Compositor::new(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
    )
    .unwrap();

    let orange = cube_scene(&gpu, [0.9, 0.45, 0.2]);
    render(&mut gpu, &mut compositor, &orange);
    let first = read(&gpu, &compositor, TargetId::Scene);

    let blue = cube_scene(&gpu, [0.1, 0.2, 0.8]);
    render(&mut gpu, &mut compositor, &blue);
    let second = read(&gpu, &compositor, TargetId::Scene);

    assert_eq!(
        first.as_raw(),
        second.as_raw(),
        "outline mask must depend on depth alone"
    );
}

// ============================================================================
// Final Composition
// ============================================================================

#[test]
fn combine_overlays_outline_on_toon_color() {
    let Some(mut gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let mut compositor = Compositor::new(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
    )
    .unwrap();
    let scene = cube_scene(&gpu, [0.9, 0.45, 0.2]);
    let image = render(&mut gpu, &mut compositor, &scene);

    let toon = read(&gpu, &compositor, TargetId::ToonColor);
    let outline = read(&gpu, &compositor, TargetId::Scene);

    for (x, y, pixel) in image.enumerate_pixels() {
        let expected = if outline.get_pixel(x, y).0[3] > 0 {
            [OUTLINE_RGB[0], OUTLINE_RGB[1], OUTLINE_RGB[2], 255]
        } else {
            toon.get_pixel(x, y).0
        };
        let close = pixel.0.iter().zip(expected).all(|(&a, b)| near(a, b, 1));
        assert!(close, "({x}, {y}) is {:?}, expected {expected:?}", pixel.0);
    }
    for corner in corners(&image) {
        assert_eq!(corner, [0, 0, 0, 0], "default background is transparent");
    }
    assert_eq!(alpha_mask(&image), alpha_mask(&toon), "coverage follows the model");
}

#[test]
fn background_uses_configured_clear_color() {
    let Some(mut gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let background = wgpu::Color {
        r: 0.2,
        g: 0.4,
        b: 0.6,
        a: 1.0,
    };
    let config = CompositorConfig::for_gpu(&gpu).with_background(background);
    let mut compositor = Compositor::new(&gpu, config, &ShaderLibrary::builtin()).unwrap();
    let scene = cube_scene(&gpu, [0.9, 0.45, 0.2]);
    let image = render(&mut gpu, &mut compositor, &scene);

    for corner in corners(&image) {
        assert_eq!(corner, [51, 102, 153, 255], "background must equal the clear color");
    }
    assert_ne!(center(&image), [51, 102, 153, 255], "model must cover the center");
}

#[test]
fn frames_are_idempotent() {
    let Some(mut gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let mut compositor = Compositor::new(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
    )
    .unwrap();
    let scene = sphere_scene(&gpu);

    let first = render(&mut gpu, &mut compositor, &scene);
    let second = render(&mut gpu, &mut compositor, &scene);
    assert_eq!(first.as_raw(), second.as_raw(), "unchanged scene must render identically");
}

// ============================================================================
// Setup Failures
// ============================================================================

const TOONIFY_WITHOUT_TEXTURE: &str = r#"
@group(0) @binding(0) var u_sampler: sampler;

@vertex
fn vs(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 1.0);
}

@fragment
fn fs() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;

#[test]
fn missing_sampler_aborts_setup() {
    let Some(gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let shaders = ShaderLibrary::builtin().with_source("toonify", TOONIFY_WITHOUT_TEXTURE);

    let result = Compositor::new(&gpu, CompositorConfig::for_gpu(&gpu), &shaders);
    match result {
        Err(PipelineError::MissingUniform { program, name }) => {
            assert_eq!(program, "toonify");
            assert_eq!(name, "u_color_texture");
        }
        other => panic!("expected MissingUniform, got {:?}", other.err()),
    }
}

#[test]
fn invalid_wgsl_aborts_setup() {
    let Some(gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let shaders = ShaderLibrary::builtin().with_source("combine", "fn fs( {");

    let result = Compositor::new(&gpu, CompositorConfig::for_gpu(&gpu), &shaders);
    assert!(
        matches!(result, Err(PipelineError::ShaderCompile { ref program, .. }) if program == "combine"),
        "expected ShaderCompile, got {:?}",
        result.err()
    );
}

#[test]
fn empty_plan_is_rejected() {
    let Some(gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let result = Compositor::with_plan(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
        PassPlan::new(Vec::new()),
    );
    assert!(matches!(result, Err(PipelineError::InvalidPlan(_))));
}

#[test]
fn mismatched_output_is_rejected() {
    let Some(mut gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let mut compositor = Compositor::new(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
    )
    .unwrap();
    let scene = cube_scene(&gpu, [0.9, 0.45, 0.2]);

    let small = RenderTarget::new(&gpu, "Small Output", WIDTH / 2, HEIGHT, false);
    let result = compositor.render_to_target(&mut gpu, &scene, &small);
    assert!(matches!(result, Err(PipelineError::OutputMismatch(_))));
}

#[test]
fn headless_context_has_no_surface() {
    let Some(mut gpu) = headless(WIDTH, HEIGHT) else {
        return;
    };
    let mut compositor = Compositor::new(
        &gpu,
        CompositorConfig::for_gpu(&gpu),
        &ShaderLibrary::builtin(),
    )
    .unwrap();
    let scene = cube_scene(&gpu, [0.9, 0.45, 0.2]);

    let result = compositor.render_frame(&mut gpu, &scene);
    assert!(matches!(result, Err(PipelineError::NoSurface)));
}
