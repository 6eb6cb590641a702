//! Level of detail for patches. All patches share one index buffer holding every level: level `l`
//! samples every `2^l`-th vertex of the patch grid and its skirts.

use std::ops::Range;

use glam::{Vec2, Vec3};

use super::patch::{PATCH_SIDE_VERTEX_COUNT, PATCH_SIZE, SKIRT_VERTEX_START};

pub const LEVEL_COUNT: usize = 3;

const _: () = assert!(PATCH_SIZE >> (LEVEL_COUNT - 1) >= 1);

/// Quads along one side of a patch at `level`.
pub const fn level_size(level: usize) -> u32 {
    PATCH_SIZE >> level
}

/// Grid triangles plus 4 skirt strips of the same resolution.
pub const fn level_index_count(level: usize) -> u32 {
    let size = level_size(level);
    size * size * 6 + size * 4 * 6
}

/// Offset of each level's first index inside the shared index buffer.
pub const LEVEL_INDEX_OFFSETS: [u32; LEVEL_COUNT] = {
    let mut offsets = [0; LEVEL_COUNT];
    let mut level = 1;
    while level < LEVEL_COUNT {
        offsets[level] = offsets[level - 1] + level_index_count(level - 1);
        level += 1;
    }
    offsets
};

pub const PATCH_INDEX_COUNT: u32 =
    LEVEL_INDEX_OFFSETS[LEVEL_COUNT - 1] + level_index_count(LEVEL_COUNT - 1);

const _: () = assert!(SKIRT_VERTEX_START + PATCH_SIDE_VERTEX_COUNT * 4 <= u16::MAX as u32 + 1);

/// Range of indices to draw for `level`.
pub fn level_range(level: usize) -> Range<u32> {
    let start = LEVEL_INDEX_OFFSETS[level];
    start..start + level_index_count(level)
}

/// Build the shared index buffer with all levels.
pub fn generate_indices() -> Vec<u16> {
    const SIDE: u32 = PATCH_SIDE_VERTEX_COUNT;
    const LAST_ROW: u32 = SIDE * PATCH_SIZE;

    let mut indices: Vec<u32> = Vec::with_capacity(PATCH_INDEX_COUNT as usize);

    for level in 0..LEVEL_COUNT {
        let step = 1 << level;

        for z in (0..PATCH_SIZE).step_by(step as usize) {
            for x in (0..PATCH_SIZE).step_by(step as usize) {
                let i0 = z * SIDE + x;
                let i1 = (z + step) * SIDE + x;
                let i2 = (z + step) * SIDE + x + step;
                let i3 = z * SIDE + x + step;
                indices.extend_from_slice(&[i0, i1, i2, i0, i2, i3]);
            }
        }

        let left = SKIRT_VERTEX_START;
        for z in (0..PATCH_SIZE).step_by(step as usize) {
            let (s0, s1) = (left + z, left + z + step);
            let (g0, g1) = (z * SIDE, (z + step) * SIDE);
            indices.extend_from_slice(&[s0, s1, g1, s0, g1, g0]);
        }

        let right = left + SIDE;
        for z in (0..PATCH_SIZE).step_by(step as usize) {
            let (s0, s1) = (right + z, right + z + step);
            let (g0, g1) = (z * SIDE + PATCH_SIZE, (z + step) * SIDE + PATCH_SIZE);
            indices.extend_from_slice(&[g0, g1, s1, g0, s1, s0]);
        }

        let near = right + SIDE;
        for x in (0..PATCH_SIZE).step_by(step as usize) {
            let (s0, s1) = (near + x, near + x + step);
            indices.extend_from_slice(&[s0, x, x + step, s0, x + step, s1]);
        }

        let far = near + SIDE;
        for x in (0..PATCH_SIZE).step_by(step as usize) {
            let (s0, s1) = (far + x, far + x + step);
            let (g0, g1) = (LAST_ROW + x, LAST_ROW + x + step);
            indices.extend_from_slice(&[g0, s0, s1, g0, s1, g1]);
        }

        debug_assert_eq!(
            indices.len() as u32,
            LEVEL_INDEX_OFFSETS[level] + level_index_count(level)
        );
    }

    indices.into_iter().map(|i| i as u16).collect()
}

/// Pick the level for a patch covering `patch_min..patch_max` on XZ.
///
/// The squared XZ distance from the eye to the nearest point of the patch, relative to the
/// squared far plane distance, is split into `LEVEL_COUNT` equal buckets rounding to the nearest
/// bucket.
pub fn select_level(patch_min: Vec2, patch_max: Vec2, eye: Vec3, far: f32) -> usize {
    let eye = Vec2::new(eye.x, eye.z);
    let nearest = eye.clamp(patch_min, patch_max);
    let far_squared = (far * far).max(f32::EPSILON);
    let ratio = eye.distance_squared(nearest) / far_squared;

    level_for_ratio(ratio)
}

fn level_for_ratio(ratio: f32) -> usize {
    let level = (ratio * LEVEL_COUNT as f32 - 0.5).round();
    level.clamp(0.0, (LEVEL_COUNT - 1) as f32) as usize
}
