use glam::{Mat4, Quat, Vec3};

use super::math::{BoundingBox, Frustum, FrustumPoints, Ray};
use super::memo::Memo;

#[derive(Clone, Copy, Debug, Default)]
pub struct Matrices {
    pub projection: Mat4,
    pub view: Mat4,
    pub view_projection: Mat4,
    pub view_projection_inverse: Mat4,
}

/// Perspective camera in a Y-up, right-handed world. Derived matrices and frustum data are
/// memoized and recomputed after any input changes.
pub struct Camera {
    position: Vec3,
    rotation: Quat,
    fov: f32,
    aspect_ratio: f32,
    near: f32,
    far: f32,

    matrices: Memo<Matrices>,
    frustum: Memo<Frustum>,
    frustum_points: Memo<FrustumPoints>,
}

impl Camera {
    pub const FORWARD: Vec3 = Vec3::NEG_Z;
    pub const RIGHT: Vec3 = Vec3::X;
    pub const UP: Vec3 = Vec3::Y;

    pub fn new(
        position: Vec3,
        rotation: Quat,
        fov: f32,
        aspect_ratio: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            rotation,
            fov,
            aspect_ratio,
            near,
            far,
            matrices: Memo::new(),
            frustum: Memo::new(),
            frustum_points: Memo::new(),
        }
    }

    fn invalidate(&self) {
        self.matrices.invalidate();
        self.frustum.invalidate();
        self.frustum_points.invalidate();
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[inline]
    pub fn near(&self) -> f32 {
        self.near
    }

    #[inline]
    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.invalidate();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.invalidate();
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.invalidate();
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.invalidate();
    }

    pub fn look_at(&mut self, target: Vec3) {
        let view = Mat4::look_at_rh(self.position, target, Self::UP);
        self.rotation = Quat::from_mat4(&view.inverse());
        self.invalidate();
    }

    pub fn matrices(&self) -> Matrices {
        self.matrices.get_or(|| {
            let projection = Mat4::perspective_rh(self.fov, self.aspect_ratio, self.near, self.far);
            let view = Mat4::look_at_rh(
                self.position,
                self.position + self.rotation * Self::FORWARD,
                self.rotation * Self::UP,
            );
            let view_projection = projection * view;
            Matrices {
                projection,
                view,
                view_projection,
                view_projection_inverse: view_projection.inverse(),
            }
        })
    }

    pub fn frustum(&self) -> Frustum {
        self.frustum
            .get_or(|| Frustum::from_view_projection(self.matrices().view_projection))
    }

    pub fn frustum_points(&self) -> FrustumPoints {
        self.frustum_points.get_or(|| {
            FrustumPoints::from_view_proj_inverse(self.matrices().view_projection_inverse)
        })
    }

    pub fn frustum_bounding_box(&self) -> BoundingBox {
        self.frustum_points().bounding_box()
    }

    /// Ray from the eye through a point in normalized device coordinates.
    pub fn generate_ray(&self, ndc_x: f32, ndc_y: f32) -> Ray {
        let far_point = self
            .matrices()
            .view_projection_inverse
            .project_point3(Vec3::new(ndc_x, ndc_y, 1.0));
        Ray::new(self.position, (far_point - self.position).normalize())
    }
}
