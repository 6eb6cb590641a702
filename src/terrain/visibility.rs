use glam::{IVec2, UVec2, Vec2, Vec3};

use super::patch::{PATCH_SIZE, Patch};
use crate::engine::math::{BoundingBox, Frustum};

/// World space box around the patch at `cell` of the patch grid.
pub fn patch_bounding_box(patch: &Patch, cell: UVec2, vertex_distance: f32) -> BoundingBox {
    let size = PATCH_SIZE as f32 * vertex_distance;
    let min = cell.as_vec2() * size;
    let max = min + size;
    BoundingBox::new(
        Vec3::new(min.x, patch.min_y, min.y),
        Vec3::new(max.x, patch.max_y, max.y),
    )
}

/// Indices of the patches that may be inside `frustum`, in row-major order.
///
/// Only patches under `frustum_box`, the bounding box of the frustum corners, are tested against
/// the planes. Patches partly inside the frustum are always returned, and some just outside it
/// may be too.
pub fn visible_patches(
    frustum: &Frustum,
    frustum_box: &BoundingBox,
    patches: &[Patch],
    grid: UVec2,
    vertex_distance: f32,
) -> Vec<usize> {
    if grid.x == 0 || grid.y == 0 {
        return vec![];
    }

    let size = PATCH_SIZE as f32 * vertex_distance;
    let last = grid.as_ivec2() - 1;

    let first_cell = (Vec2::new(frustum_box.min.x, frustum_box.min.z) / size)
        .floor()
        .as_ivec2()
        .clamp(IVec2::ZERO, last);
    let last_cell = (Vec2::new(frustum_box.max.x, frustum_box.max.z) / size)
        .ceil()
        .as_ivec2()
        .clamp(IVec2::ZERO, last);

    let mut visible = vec![];
    for z in first_cell.y..=last_cell.y {
        for x in first_cell.x..=last_cell.x {
            let index = (z * grid.x as i32 + x) as usize;
            let cell = UVec2::new(x as u32, z as u32);
            let bounds = patch_bounding_box(&patches[index], cell, vertex_distance);
            if frustum.intersects_bounding_box(&bounds) {
                visible.push(index);
            }
        }
    }

    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::camera::Camera;
    use glam::Quat;

    fn flat_patches(grid: UVec2) -> Vec<Patch> {
        (0..grid.x * grid.y)
            .map(|_| Patch {
                min_y: 0.0,
                max_y: 0.0,
                forms: Default::default(),
                vertices: Vec::new().into_boxed_slice(),
            })
            .collect()
    }

    fn visible_from(camera: &Camera) -> Vec<usize> {
        let grid = UVec2::splat(4);
        visible_patches(
            &camera.frustum(),
            &camera.frustum_bounding_box(),
            &flat_patches(grid),
            grid,
            1.0,
        )
    }

    #[test]
    fn bounding_box_covers_the_patch() {
        let patch = Patch {
            min_y: -2.0,
            max_y: 5.0,
            ..flat_patches(UVec2::ONE).remove(0)
        };
        let bounds = patch_bounding_box(&patch, UVec2::new(1, 2), 2.0);
        assert_eq!(bounds.min, Vec3::new(64.0, -2.0, 128.0));
        assert_eq!(bounds.max, Vec3::new(128.0, 5.0, 192.0));
    }

    #[test]
    fn only_patches_in_front_of_the_camera_are_visible() {
        // Looking down -Z from just past the far edge, seeing 30 units ahead.
        let camera = Camera::new(
            Vec3::new(16.0, 10.0, 140.0),
            Quat::IDENTITY,
            std::f32::consts::FRAC_PI_2,
            1.0,
            1.0,
            30.0,
        );
        assert_eq!(visible_from(&camera), [12, 13]);
    }

    #[test]
    fn nothing_is_visible_when_looking_away() {
        let camera = Camera::new(
            Vec3::new(16.0, 10.0, 200.0),
            Quat::from_rotation_y(std::f32::consts::PI),
            std::f32::consts::FRAC_PI_2,
            1.0,
            1.0,
            30.0,
        );
        assert!(visible_from(&camera).is_empty());
    }
}
