use glam::{Mat4, Vec3, Vec4};

/// Plane in the form `dot(normal, p) + distance = 0`. Points with a positive signed distance are
/// on the side the normal points to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// Plane from the coefficients `(a, b, c, d)` of `ax + by + cz + d = 0`, scaled to a unit
    /// normal. Coefficients without a usable normal give the XZ plane.
    fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.truncate();
        let length = normal.length();

        if !length.is_finite() || length <= f32::EPSILON {
            return Self {
                normal: Vec3::Y,
                distance: 0.0,
            };
        }

        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Clip planes of a view volume with their normals pointing inside: left, right, bottom, top,
/// near and far.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes from a view-projection matrix with a `0..1` clip depth range.
    pub fn from_view_projection(view_projection: Mat4) -> Self {
        // Columns of the transpose are the rows of the matrix.
        let rows = view_projection.transpose();
        let (x, y, z, w) = (rows.x_axis, rows.y_axis, rows.z_axis, rows.w_axis);

        Self {
            planes: [w + x, w - x, w + y, w - y, z, w - z].map(Plane::from_coefficients),
        }
    }

    /// True unless the box lies completely outside one of the planes. Boxes outside the frustum
    /// but near its edges can pass.
    pub fn intersects_bounding_box(&self, bounds: &BoundingBox) -> bool {
        const TOLERANCE: f32 = 1e-5;

        let center = bounds.center();
        let half_extents = bounds.half_extents();

        self.planes.iter().all(|plane| {
            let radius = half_extents.dot(plane.normal.abs());
            plane.signed_distance(center) >= -radius - TOLERANCE
        })
    }
}

/// World space corners of a view volume: the near rectangle, then the far rectangle, each
/// counter-clockwise from the bottom left.
#[derive(Clone, Copy, Debug)]
pub struct FrustumPoints(pub [Vec3; 8]);

impl FrustumPoints {
    pub fn from_view_proj_inverse(view_proj_inverse: Mat4) -> Self {
        const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        Self(std::array::from_fn(|i| {
            let (x, y) = CORNERS[i % 4];
            let depth = if i < 4 { 0.0 } else { 1.0 };
            view_proj_inverse.project_point3(Vec3::new(x, y, depth))
        }))
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bounds = Self::new(Vec3::INFINITY, Vec3::NEG_INFINITY);
        for point in points {
            bounds.min = bounds.min.min(point);
            bounds.max = bounds.max.max(point);
        }
        bounds
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Möller-Trumbore ray/triangle intersection. Returns the ray parameter of the hit, which may
/// be negative if the triangle is behind the origin. With `cull_back_faces`, triangles whose
/// counter-clockwise side (as seen against the ray) faces away from the ray are ignored.
pub fn ray_triangle_intersect(
    ray: &Ray,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    cull_back_faces: bool,
) -> Option<f32> {
    const EPS: f32 = 1e-7;

    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);

    if cull_back_faces {
        if det < EPS {
            return None;
        }
    } else if det.abs() < EPS {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = ray.origin - v0;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    Some(edge2.dot(q) * inv_det)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frustum_culls_boxes_behind_planes() {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let frustum = Frustum::from_view_projection(proj * view);

        let in_front = BoundingBox::new(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
        let behind = BoundingBox::new(Vec3::new(-1.0, -1.0, 9.0), Vec3::new(1.0, 1.0, 11.0));
        let too_far = BoundingBox::new(Vec3::new(-1.0, -1.0, -210.0), Vec3::new(1.0, 1.0, -200.0));

        assert!(frustum.intersects_bounding_box(&in_front));
        assert!(!frustum.intersects_bounding_box(&behind));
        assert!(!frustum.intersects_bounding_box(&too_far));
    }

    #[test]
    fn frustum_points_bound_the_view_volume() {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1.0, 10.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let points = FrustumPoints::from_view_proj_inverse((proj * view).inverse());
        let bounds = points.bounding_box();

        assert!((bounds.min.z + 10.0).abs() < 1e-3);
        assert!((bounds.max.z + 1.0).abs() < 1e-3);
        assert!((bounds.max.x - 10.0).abs() < 1e-3);
    }

    #[test]
    fn ray_hits_up_facing_triangle_from_above_only() {
        let v0 = Vec3::new(0.0, 0.0, 0.0);
        let v1 = Vec3::new(0.0, 0.0, 1.0);
        let v2 = Vec3::new(1.0, 0.0, 1.0);

        let down = Ray::new(Vec3::new(0.25, 3.0, 0.75), Vec3::NEG_Y);
        let t = ray_triangle_intersect(&down, v0, v1, v2, true).unwrap();
        assert!((t - 3.0).abs() < 1e-5);

        let up = Ray::new(Vec3::new(0.25, -3.0, 0.75), Vec3::Y);
        assert!(ray_triangle_intersect(&up, v0, v1, v2, true).is_none());
        assert!(ray_triangle_intersect(&up, v0, v1, v2, false).is_some());
    }
}
