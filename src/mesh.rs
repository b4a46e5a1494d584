//! 3D mesh primitives and spatial transforms for the scene passes.
//!
//! - [`Vertex3d`]: position, normal and UV for every model vertex
//! - [`MeshData`]: CPU-side geometry, with built-in cube, sphere and torus
//! - [`Mesh`]: GPU-resident geometry with vertex and index buffers
//! - [`Transform`]: position, rotation and scale for placing the model
//!
//! All built-in primitives use counter-clockwise winding for front faces, which
//! the depth path relies on for back-face culling.
//!
//! # Vertex Layout
//!
//! | Attribute | Format    | Offset | Shader Location |
//! |-----------|-----------|--------|-----------------|
//! | position  | Float32x3 | 0      | 0               |
//! | normal    | Float32x3 | 12     | 1               |
//! | uv        | Float32x2 | 24     | 2               |

use std::f32::consts::{PI, TAU};

use crate::gpu::GpuContext;
use glam::{Mat4, Quat, Vec3};

/// A vertex with position, normal, and texture coordinates (32 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    /// The 3D position of this vertex in model space.
    pub position: [f32; 3],
    /// The surface normal vector (should be normalized for correct lighting).
    pub normal: [f32; 3],
    /// Texture coordinates, typically in the range [0, 1].
    pub uv: [f32; 2],
}

impl Vertex3d {
    /// The wgpu vertex buffer layout for this vertex type.
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex3d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // normal
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Geometry before GPU upload.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex3d>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex3d>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// A unit cube centered at the origin, four vertices per face for flat normals.
    pub fn cube() -> Self {
        #[rustfmt::skip]
        let vertices = vec![
            // Front face (Z+)
            Vertex3d::new([-0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0], [0.0, 0.0]),
            Vertex3d::new([ 0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0], [1.0, 0.0]),
            Vertex3d::new([ 0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0], [1.0, 1.0]),
            Vertex3d::new([-0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0], [0.0, 1.0]),
            // Back face (Z-)
            Vertex3d::new([ 0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0], [0.0, 0.0]),
            Vertex3d::new([-0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0], [1.0, 0.0]),
            Vertex3d::new([-0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0], [1.0, 1.0]),
            Vertex3d::new([ 0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0], [0.0, 1.0]),
            // Top face (Y+)
            Vertex3d::new([-0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([ 0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([ 0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([-0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0], [0.0, 1.0]),
            // Bottom face (Y-)
            Vertex3d::new([-0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([ 0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([ 0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([-0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0], [0.0, 1.0]),
            // Right face (X+)
            Vertex3d::new([ 0.5, -0.5,  0.5], [ 1.0,  0.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([ 0.5, -0.5, -0.5], [ 1.0,  0.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([ 0.5,  0.5, -0.5], [ 1.0,  0.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([ 0.5,  0.5,  0.5], [ 1.0,  0.0,  0.0], [0.0, 1.0]),
            // Left face (X-)
            Vertex3d::new([-0.5, -0.5, -0.5], [-1.0,  0.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([-0.5, -0.5,  0.5], [-1.0,  0.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([-0.5,  0.5,  0.5], [-1.0,  0.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([-0.5,  0.5, -0.5], [-1.0,  0.0,  0.0], [0.0, 1.0]),
        ];

        #[rustfmt::skip]
        let indices: Vec<u32> = vec![
            0,  1,  2,  2,  3,  0,  // front
            4,  5,  6,  6,  7,  4,  // back
            8,  9,  10, 10, 11, 8,  // top
            12, 13, 14, 14, 15, 12, // bottom
            16, 17, 18, 18, 19, 16, // right
            20, 21, 22, 22, 23, 20, // left
        ];

        Self::new(vertices, indices)
    }

    /// A UV sphere of diameter 1 centered at the origin.
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);

        for ring in 0..=rings {
            let phi = PI * ring as f32 / rings as f32;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for seg in 0..=segments {
                let theta = TAU * seg as f32 / segments as f32;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                vertices.push(Vertex3d::new(
                    [x * 0.5, y * 0.5, z * 0.5],
                    [x, y, z],
                    [seg as f32 / segments as f32, ring as f32 / rings as f32],
                ));
            }
        }

        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * (segments + 1) + seg;
                let next = current + segments + 1;

                indices.extend_from_slice(&[current, current + 1, next]);
                indices.extend_from_slice(&[current + 1, next + 1, next]);
            }
        }

        Self::new(vertices, indices)
    }

    /// A torus around the Y axis. Not convex: its inner rim produces depth
    /// discontinuities away from the silhouette.
    pub fn torus(major_radius: f32, minor_radius: f32, segments: u32, sides: u32) -> Self {
        let segments = segments.max(3);
        let sides = sides.max(3);
        let mut vertices = Vec::with_capacity(((segments + 1) * (sides + 1)) as usize);
        let mut indices = Vec::with_capacity((segments * sides * 6) as usize);

        for seg in 0..=segments {
            let u = TAU * seg as f32 / segments as f32;
            let (sin_u, cos_u) = u.sin_cos();

            for side in 0..=sides {
                let v = TAU * side as f32 / sides as f32;
                let (sin_v, cos_v) = v.sin_cos();
                let ring = major_radius + minor_radius * cos_v;

                vertices.push(Vertex3d::new(
                    [ring * cos_u, minor_radius * sin_v, ring * sin_u],
                    [cos_v * cos_u, sin_v, cos_v * sin_u],
                    [seg as f32 / segments as f32, side as f32 / sides as f32],
                ));
            }
        }

        for seg in 0..segments {
            for side in 0..sides {
                let a = seg * (sides + 1) + side;
                let b = a + sides + 1;

                indices.extend_from_slice(&[a, a + 1, b]);
                indices.extend_from_slice(&[a + 1, b + 1, b]);
            }
        }

        Self::new(vertices, indices)
    }
}

/// GPU-resident mesh geometry.
///
/// A mesh owns a vertex buffer of [`Vertex3d`] and a `u32` index buffer. It is
/// immutable after creation.
#[derive(Debug)]
pub struct Mesh {
    pub(crate) vertex_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl Mesh {
    /// Uploads raw vertex and index data to GPU buffers.
    pub fn new(gpu: &GpuContext, vertices: &[Vertex3d], indices: &[u32]) -> Self {
        use wgpu::util::DeviceExt;

        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    pub fn from_data(gpu: &GpuContext, data: &MeshData) -> Self {
        Self::new(gpu, &data.vertices, &data.indices)
    }

    pub fn cube(gpu: &GpuContext) -> Self {
        Self::from_data(gpu, &MeshData::cube())
    }

    pub fn sphere(gpu: &GpuContext, segments: u32, rings: u32) -> Self {
        Self::from_data(gpu, &MeshData::sphere(segments, rings))
    }

    pub fn torus(gpu: &GpuContext, major_radius: f32, minor_radius: f32) -> Self {
        Self::from_data(gpu, &MeshData::torus(major_radius, minor_radius, 48, 24))
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Position, rotation and scale of a model instance.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every non-degenerate triangle must wind counter-clockwise when seen
    /// from the side its vertex normals point to.
    fn assert_outward_ccw(data: &MeshData) {
        assert_eq!(data.indices.len() % 3, 0);
        for tri in data.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| data.vertices[i as usize]);
            let pa = Vec3::from(a.position);
            let face = (Vec3::from(b.position) - pa).cross(Vec3::from(c.position) - pa);
            if face.length() < 1e-7 {
                continue;
            }
            let normal = Vec3::from(a.normal) + Vec3::from(b.normal) + Vec3::from(c.normal);
            assert!(
                face.dot(normal) > 0.0,
                "triangle {tri:?} winds clockwise from outside"
            );
        }
    }

    #[test]
    fn cube_faces_wind_outward() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert_outward_ccw(&cube);
    }

    #[test]
    fn sphere_faces_wind_outward() {
        let sphere = MeshData::sphere(16, 8);
        assert_eq!(sphere.vertices.len(), 17 * 9);
        assert_outward_ccw(&sphere);
        for v in &sphere.vertices {
            assert!((Vec3::from(v.position).length() - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn torus_faces_wind_outward() {
        assert_outward_ccw(&MeshData::torus(1.0, 0.3, 24, 12));
    }

    #[test]
    fn transform_applies_scale_then_translation() {
        let t = Transform::new()
            .position(Vec3::new(1.0, 2.0, 3.0))
            .uniform_scale(2.0);
        let p = t.matrix().transform_point3(Vec3::ONE);
        assert_eq!(p, Vec3::new(3.0, 4.0, 5.0));
    }
}
