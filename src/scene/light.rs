//! Light types that cast shadows

use glam::{Mat4, Vec3};

/// Caller-assigned id of a light in the host scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightId(pub u32);

/// Up vector for a light view that is never parallel to `direction`
fn up_for(direction: Vec3) -> Vec3 {
    if direction.normalize().dot(Vec3::Y).abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// Spot light
#[derive(Debug, Clone)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    pub inner_angle: f32, // radians
    pub outer_angle: f32, // radians
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 5.0, 0.0),
            direction: -Vec3::Y,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            inner_angle: 0.3,
            outer_angle: 0.5,
        }
    }
}

impl SpotLight {
    pub fn new(
        position: Vec3,
        direction: Vec3,
        radius: f32,
        inner_angle: f32,
        outer_angle: f32,
    ) -> Self {
        Self {
            position,
            direction: direction.normalize(),
            radius,
            inner_angle,
            outer_angle,
            ..Default::default()
        }
    }

    pub fn shadow_view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, up_for(self.direction))
    }

    /// Perspective covering the outer cone up to the light radius
    pub fn shadow_projection(&self, near: f32) -> Mat4 {
        Mat4::perspective_rh(self.outer_angle * 2.0, 1.0, near, self.radius)
    }
}

/// Directional light (like the sun)
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize(),
            color,
            intensity,
        }
    }

    /// View looking along the light at `center` from `distance` away
    pub fn shadow_view(&self, center: Vec3, distance: f32) -> Mat4 {
        let eye = center - self.direction * distance;
        Mat4::look_at_rh(eye, center, up_for(self.direction))
    }

    /// Orthographic box `2 * half_extent` wide, from `near` to `far` along the light
    pub fn shadow_projection(&self, half_extent: f32, near: f32, far: f32) -> Mat4 {
        Mat4::orthographic_rh(-half_extent, half_extent, -half_extent, half_extent, near, far)
    }
}
