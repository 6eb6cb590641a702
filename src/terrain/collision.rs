//! Ray intersection with the terrain surface.
//!
//! The ray is walked over the patch grid first, skipping patches whose height range the ray
//! passes above or below, and then over the quads of each remaining patch, where the two
//! triangles of every quad the ray could touch are tested.

use glam::{IVec2, UVec2, Vec2};

use super::height_map::HeightMap;
use super::patch::{PATCH_SIZE, Patch};
use crate::engine::math::{Ray, ray_triangle_intersect};

/// Directions with both horizontal components below this are treated as vertical.
const VERTICAL_EPSILON: f32 = 1e-6;

/// Cells of a square grid crossed by a ray on the XZ plane, in the order the ray enters them.
/// Yields each cell with the ray parameters where the ray enters and leaves it.
struct GridWalk {
    cell: IVec2,
    cell_size: f32,
    origin: Vec2,
    direction: Vec2,
    t: f32,
    done: bool,
}

impl GridWalk {
    /// Start in the cell containing the ray at `t`.
    fn new(ray: &Ray, cell_size: f32, t: f32) -> Self {
        let start = ray.at(t);
        Self::from_cell(
            ray,
            cell_size,
            t,
            (Vec2::new(start.x, start.z) / cell_size).floor().as_ivec2(),
        )
    }

    fn from_cell(ray: &Ray, cell_size: f32, t: f32, cell: IVec2) -> Self {
        Self {
            cell,
            cell_size,
            origin: Vec2::new(ray.origin.x, ray.origin.z),
            direction: Vec2::new(ray.direction.x, ray.direction.z),
            t,
            done: false,
        }
    }

    /// Ray parameter where the ray crosses the next cell boundary on one axis.
    fn boundary(cell: i32, cell_size: f32, origin: f32, direction: f32) -> f32 {
        if direction > 0.0 {
            ((cell + 1) as f32 * cell_size - origin) / direction
        } else if direction < 0.0 {
            (cell as f32 * cell_size - origin) / direction
        } else {
            f32::INFINITY
        }
    }
}

impl Iterator for GridWalk {
    type Item = (IVec2, f32, f32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let tx = Self::boundary(self.cell.x, self.cell_size, self.origin.x, self.direction.x);
        let tz = Self::boundary(self.cell.y, self.cell_size, self.origin.y, self.direction.y);
        let exit = tx.min(tz).max(self.t);

        let item = (self.cell, self.t, exit);

        if !exit.is_finite() {
            self.done = true;
            return Some(item);
        }

        let step = self.direction.signum().as_ivec2();
        if tx <= tz {
            self.cell.x += step.x;
        }
        if tz <= tx {
            self.cell.y += step.y;
        }
        self.t = exit;

        Some(item)
    }
}

/// True if a walk in `cell` has left `0..count` on some axis and is moving further away.
fn walked_out(cell: IVec2, direction: Vec2, count: IVec2) -> bool {
    (cell.x < 0 && direction.x <= 0.0)
        || (cell.y < 0 && direction.y <= 0.0)
        || (cell.x >= count.x && direction.x >= 0.0)
        || (cell.y >= count.y && direction.y >= 0.0)
}

/// True if the ray's height between `t1` and `t2` stays entirely below `min_y` or above `max_y`.
fn misses_height_range(ray: &Ray, t1: f32, t2: f32, min_y: f32, max_y: f32) -> bool {
    let y1 = ray.origin.y + ray.direction.y * t1;
    let y2 = ray.origin.y + ray.direction.y * t2;
    (y1 < min_y && y2 < min_y) || (y1 > max_y && y2 > max_y)
}

/// Find the nearest point where `ray` hits the terrain within `0..=max_t`.
///
/// `patches` holds the patches of a `grid` in row-major order. Only surfaces facing the ray are
/// hit.
pub fn ray_collision(
    height_map: &HeightMap,
    patches: &[Patch],
    grid: UVec2,
    ray: &Ray,
    max_t: f32,
) -> Option<f32> {
    debug_assert_eq!(patches.len(), (grid.x * grid.y) as usize);

    if grid.x == 0 || grid.y == 0 {
        return None;
    }

    if ray.direction.x.abs() < VERTICAL_EPSILON && ray.direction.z.abs() < VERTICAL_EPSILON {
        return vertical_collision(height_map, patches, grid, ray, max_t);
    }

    let patch_world_size = PATCH_SIZE as f32 * height_map.vertex_distance();
    let direction = Vec2::new(ray.direction.x, ray.direction.z);
    let count = grid.as_ivec2();

    for (cell, t1, t2) in GridWalk::new(ray, patch_world_size, 0.0) {
        if t1 >= max_t || walked_out(cell, direction, count) {
            break;
        }

        if cell.x < 0 || cell.y < 0 || cell.x >= count.x || cell.y >= count.y {
            continue;
        }

        let patch = &patches[(cell.y * count.x + cell.x) as usize];
        if misses_height_range(ray, t1, t2, patch.min_y, patch.max_y) {
            continue;
        }

        if let Some(t) = patch_collision(height_map, cell, ray, t1, max_t) {
            return Some(t);
        }
    }

    None
}

/// Walk the quads of the patch at `patch` starting where the ray enters it at `start_t`.
fn patch_collision(
    height_map: &HeightMap,
    patch: IVec2,
    ray: &Ray,
    start_t: f32,
    max_t: f32,
) -> Option<f32> {
    let vertex_distance = height_map.vertex_distance();
    let first = patch * PATCH_SIZE as i32;
    let last = first + IVec2::splat(PATCH_SIZE as i32 - 1);
    let cells = height_map.cells().as_ivec2();

    // The entry point can round into the neighbor patch.
    let start = ray.at(start_t);
    let start_cell = (Vec2::new(start.x, start.z) / vertex_distance)
        .floor()
        .as_ivec2()
        .clamp(first, last);

    for (cell, t1, t2) in GridWalk::from_cell(ray, vertex_distance, start_t, start_cell) {
        if t1 >= max_t || cell.cmplt(first).any() || cell.cmpgt(last).any() {
            break;
        }

        // Quads past the edge of a terrain that is not a whole number of patches.
        if cell.x >= cells.x || cell.y >= cells.y {
            continue;
        }

        if let Some(t) = quad_collision(height_map, cell, ray, t1, t2) {
            return (t <= max_t).then_some(t);
        }
    }

    None
}

fn quad_collision(height_map: &HeightMap, cell: IVec2, ray: &Ray, t1: f32, t2: f32) -> Option<f32> {
    let v00 = height_map.position_at(cell);
    let v01 = height_map.position_at(cell + IVec2::new(0, 1));
    let v11 = height_map.position_at(cell + IVec2::new(1, 1));
    let v10 = height_map.position_at(cell + IVec2::new(1, 0));

    let min_y = v00.y.min(v01.y).min(v11.y).min(v10.y);
    let max_y = v00.y.max(v01.y).max(v11.y).max(v10.y);
    if misses_height_range(ray, t1, t2, min_y, max_y) {
        return None;
    }

    [
        ray_triangle_intersect(ray, v00, v01, v11, true),
        ray_triangle_intersect(ray, v00, v11, v10, true),
    ]
    .into_iter()
    .flatten()
    .filter(|&t| t >= 0.0)
    .min_by(f32::total_cmp)
}

/// A ray going straight up or down can only hit the surface right below or above its origin.
fn vertical_collision(
    height_map: &HeightMap,
    patches: &[Patch],
    grid: UVec2,
    ray: &Ray,
    max_t: f32,
) -> Option<f32> {
    let extent = height_map.extent();
    let (x, z) = (ray.origin.x, ray.origin.z);
    if x < 0.0 || z < 0.0 || x > extent.x || z > extent.y {
        return None;
    }

    let patch_world_size = PATCH_SIZE as f32 * height_map.vertex_distance();
    let cell = (Vec2::new(x, z) / patch_world_size)
        .floor()
        .as_uvec2()
        .min(grid - UVec2::ONE);
    let patch = &patches[(cell.y * grid.x + cell.x) as usize];

    if (ray.direction.y > 0.0 && ray.origin.y > patch.max_y)
        || (ray.direction.y < 0.0 && ray.origin.y < patch.min_y)
    {
        return None;
    }

    let height = height_map.world_height_at(x, z);
    let t = (height - ray.origin.y) / ray.direction.y;
    (0.0..=max_t).contains(&t).then_some(t)
}
