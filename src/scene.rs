//! The per-frame scene snapshot consumed by the scene passes.
//!
//! A [`Scene`] holds exactly one camera, one directional light (plus an ambient
//! term) and one model instance. The host updates its fields in place between
//! frames; the compositor only reads it.

use glam::{Vec3, Vec4};

use crate::camera::Camera;
use crate::mesh::{Mesh, Transform};

/// A directional light: color and the direction light travels in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub direction: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(0.8, 0.8, 0.8, -0.5, -1.0, -0.8)
    }
}

impl DirectionalLight {
    pub fn new(r: f32, g: f32, b: f32, dir_x: f32, dir_y: f32, dir_z: f32) -> Self {
        Self {
            color: Vec3::new(r, g, b),
            direction: Vec3::new(dir_x, dir_y, dir_z).normalize_or_zero(),
        }
    }
}

/// The single model instance: geometry, placement and base color.
#[derive(Debug)]
pub struct Model {
    pub mesh: Mesh,
    pub transform: Transform,
    pub color: Vec4,
}

impl Model {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            transform: Transform::default(),
            color: Vec4::ONE,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_color(mut self, r: f32, g: f32, b: f32) -> Self {
        self.color = Vec4::new(r, g, b, 1.0);
        self
    }
}

/// Camera, lighting and model for one frame.
#[derive(Debug)]
pub struct Scene {
    pub camera: Camera,
    pub light: DirectionalLight,
    pub ambient: Vec3,
    pub model: Model,
}

impl Scene {
    /// A scene with the default light and an ambient term of 0.4.
    pub fn new(camera: Camera, model: Model) -> Self {
        Self {
            camera,
            light: DirectionalLight::default(),
            ambient: Vec3::splat(0.4),
            model,
        }
    }

    pub fn with_light(mut self, light: DirectionalLight) -> Self {
        self.light = light;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_direction_is_normalized() {
        let light = DirectionalLight::default();
        assert!((light.direction.length() - 1.0).abs() < 1e-6);
        assert!(light.direction.y < 0.0);
        assert_eq!(light.color, Vec3::splat(0.8));
    }
}
