//! The full-screen quad shared by every post-process stage.
//!
//! Four vertices in normalized device coordinates, listed in triangle-fan
//! order (bottom-left, bottom-right, top-right, top-left). wgpu has no fan
//! topology, so the fan is expanded once into a six-entry index buffer and the
//! quad is drawn as an indexed triangle list.
//!
//! Texture coordinates follow wgpu's convention (origin at the top-left of the
//! texture), so `uv.y` is flipped relative to clip-space `y`.

use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;

/// Vertex of the full-screen quad: clip-space position and texture coordinate.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl QuadVertex {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };
}

/// Quad corners in fan order.
#[rustfmt::skip]
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, -1.0, 0.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0, -1.0, 0.0], uv: [1.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0, 0.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0,  1.0, 0.0], uv: [0.0, 0.0] },
];

/// Expands a triangle fan of `vertex_count` vertices into triangle-list indices.
pub fn fan_indices(vertex_count: u16) -> Vec<u16> {
    (1..vertex_count.saturating_sub(1))
        .flat_map(|i| [0, i, i + 1])
        .collect()
}

/// Static quad geometry, created once and never mutated.
pub struct FullScreenQuad {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl FullScreenQuad {
    pub fn new(gpu: &GpuContext) -> Self {
        let indices = fan_indices(QUAD_VERTICES.len() as u16);

        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("FullScreenQuad Vertices"),
                contents: bytemuck::cast_slice(&QUAD_VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("FullScreenQuad Fan Indices"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    /// Issues one draw of the quad (4 vertices, 2 triangles) into `render_pass`.
    ///
    /// The pipeline and bind groups must already be set.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        render_pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_fan_is_two_triangles() {
        assert_eq!(fan_indices(4), vec![0, 1, 2, 0, 2, 3]);
        assert!(fan_indices(2).is_empty());
    }

    #[test]
    fn quad_covers_clip_space() {
        let xs: Vec<f32> = QUAD_VERTICES.iter().map(|v| v.position[0]).collect();
        let ys: Vec<f32> = QUAD_VERTICES.iter().map(|v| v.position[1]).collect();
        assert_eq!(xs.iter().cloned().fold(f32::MAX, f32::min), -1.0);
        assert_eq!(xs.iter().cloned().fold(f32::MIN, f32::max), 1.0);
        assert_eq!(ys.iter().cloned().fold(f32::MAX, f32::min), -1.0);
        assert_eq!(ys.iter().cloned().fold(f32::MIN, f32::max), 1.0);
        assert!(QUAD_VERTICES.iter().all(|v| v.position[2] == 0.0));
    }

    #[test]
    fn top_of_clip_space_samples_top_of_texture() {
        for v in QUAD_VERTICES {
            let expected_v = (1.0 - v.position[1]) * 0.5;
            let expected_u = (v.position[0] + 1.0) * 0.5;
            assert_eq!(v.uv, [expected_u, expected_v]);
        }
    }

    #[test]
    fn fan_triangles_wind_counter_clockwise() {
        let indices = fan_indices(4);
        for tri in indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| QUAD_VERTICES[i as usize].position);
            let area = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
            assert!(area > 0.0);
        }
    }
}
