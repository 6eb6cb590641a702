use glam::{UVec2, Vec3};

use super::form_weights::FormWeights;
use super::height_map::HeightMap;

/// Number of quads along each side of a patch.
pub const PATCH_SIZE: u32 = 32;

/// Number of forms blended inside a single patch.
pub const TERRAIN_FORMS_PER_PATCH: usize = 4;

const _: () = assert!(PATCH_SIZE.is_power_of_two());
const _: () = assert!(TERRAIN_FORMS_PER_PATCH >= 2 && TERRAIN_FORMS_PER_PATCH <= 5);

/// Vertices on one side of a patch.
pub const PATCH_SIDE_VERTEX_COUNT: u32 = PATCH_SIZE + 1;

/// Grid vertices followed by 4 skirt rows: left, right, near and far.
pub const PATCH_VERTEX_COUNT: u32 =
    PATCH_SIDE_VERTEX_COUNT * PATCH_SIDE_VERTEX_COUNT + PATCH_SIDE_VERTEX_COUNT * 4;

/// Index of the first skirt vertex inside a patch.
pub const SKIRT_VERTEX_START: u32 = PATCH_SIDE_VERTEX_COUNT * PATCH_SIDE_VERTEX_COUNT;

#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct TerrainVertex {
    pub position: Vec3,
    pub normal: Vec3,
    /// Blend weights of the patch forms 1.. packed from the high byte down. Form 0 is implicit.
    pub color: u32,
}

impl renderer::AsVertexLayout for TerrainVertex {
    fn vertex_buffer_layout() -> renderer::VertexBufferLayout {
        use renderer::{VertexAttribute, VertexFormat};

        const ATTRIBUTES: &[VertexAttribute] = &[
            VertexAttribute {
                format: VertexFormat::Float32x3,
                offset: 0,
                shader_location: 0,
            },
            VertexAttribute {
                format: VertexFormat::Float32x3,
                offset: 12,
                shader_location: 1,
            },
            VertexAttribute {
                format: VertexFormat::Unorm8x4,
                offset: 24,
                shader_location: 2,
            },
        ];

        renderer::VertexBufferLayout {
            array_stride: std::mem::size_of::<TerrainVertex>() as u64,
            attributes: ATTRIBUTES,
        }
    }
}

/// A square piece of the terrain with its vertices ready for the GPU.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    pub min_y: f32,
    pub max_y: f32,
    /// Form indices blended in this patch, ascending.
    pub forms: [u32; TERRAIN_FORMS_PER_PATCH],
    /// Always [`PATCH_VERTEX_COUNT`] long.
    pub vertices: Box<[TerrainVertex]>,
}

/// Number of patches on X and Z for a terrain of `cells` quads.
pub fn patch_grid_size(cells: UVec2) -> UVec2 {
    (cells + UVec2::splat(PATCH_SIZE - 1)) / PATCH_SIZE
}

/// Select the forms blended in the patch starting at `start`: the ones with the highest summed
/// weight, ordered by form index.
fn dominant_forms(
    weights: &FormWeights,
    start: UVec2,
    end: UVec2,
) -> [u32; TERRAIN_FORMS_PER_PATCH] {
    let form_count = weights.form_count();

    let mut sums: Vec<(u32, u32)> = (0..form_count as u32).map(|form| (form, 0)).collect();
    for z in start.y..end.y {
        for x in start.x..end.x {
            for (sum, &weight) in sums.iter_mut().zip(weights.weights_at(x, z)) {
                sum.1 += weight as u32;
            }
        }
    }

    sums.sort_by(|a, b| b.1.cmp(&a.1));

    if sums.len() > TERRAIN_FORMS_PER_PATCH && sums[TERRAIN_FORMS_PER_PATCH].1 > 0 {
        tracing::warn!(
            "Too many terrain forms in patch starting at {},{}, only {} are used",
            start.x,
            start.y,
            TERRAIN_FORMS_PER_PATCH
        );
    }

    let used = sums.len().min(TERRAIN_FORMS_PER_PATCH);
    sums[..used].sort_by_key(|&(form, _)| form);

    std::array::from_fn(|i| sums[i.min(used - 1)].0)
}

/// Pack the weights of forms `1..` of the patch, renormalized against the sum of all the patch
/// forms, into a color. Form 1 of the patch sits in bits 24..32.
fn pack_weights(node_weights: &[u8], forms: &[u32; TERRAIN_FORMS_PER_PATCH]) -> u32 {
    let used = TERRAIN_FORMS_PER_PATCH.min(node_weights.len());

    let sum: u32 = forms[..used]
        .iter()
        .map(|&form| node_weights[form as usize] as u32)
        .sum();
    if sum == 0 {
        return 0;
    }

    let mut color = 0;
    let mut shift = 24;
    for &form in &forms[1..used] {
        let weight = node_weights[form as usize] as f32 / sum as f32 * 255.0;
        color |= (weight as u32) << shift;
        shift -= 8;
    }
    color
}

impl Patch {
    /// Build the patch whose first vertex is node `start`.
    pub fn generate(height_map: &HeightMap, weights: &FormWeights, start: UVec2) -> Self {
        let cells = height_map.cells();
        debug_assert!(start.x < cells.x && start.y < cells.y);

        const SIDE: u32 = PATCH_SIDE_VERTEX_COUNT;

        // One past the last real node covered by the patch.
        let end = (start + UVec2::splat(SIDE)).min(cells + UVec2::ONE);
        // Local index of the last real node on each axis.
        let last = end - start - UVec2::ONE;

        let forms = dominant_forms(weights, start, end);

        let mut vertices = Vec::with_capacity(PATCH_VERTEX_COUNT as usize);
        let mut min_y = f32::INFINITY;
        let mut max_y = f32::NEG_INFINITY;

        for z in 0..SIDE {
            for x in 0..SIDE {
                // Nodes past the edge of the terrain repeat the last real node of their row,
                // column or corner.
                if x > last.x || z > last.y {
                    let source = z.min(last.y) * SIDE + x.min(last.x);
                    vertices.push(vertices[source as usize]);
                    continue;
                }

                let node = start + UVec2::new(x, z);
                let position = height_map.position_at(node.as_ivec2());
                min_y = min_y.min(position.y);
                max_y = max_y.max(position.y);

                vertices.push(TerrainVertex {
                    position,
                    normal: height_map.normal_at(node.as_ivec2()),
                    color: pack_weights(weights.weights_at(node.x, node.y), &forms),
                });
            }
        }

        // Skirts hang down to the lowest point of the patch, except on the outer border of the
        // terrain where they collapse onto the edge itself.
        let skirts: [(bool, fn(u32) -> u32); 4] = [
            (start.x > 0, |i| i * SIDE),
            (start.x + PATCH_SIZE < cells.x, |i| i * SIDE + PATCH_SIZE),
            (start.y > 0, |i| i),
            (start.y + PATCH_SIZE < cells.y, |i| PATCH_SIZE * SIDE + i),
        ];
        for (drop, source) in skirts {
            for i in 0..SIDE {
                let mut vertex = vertices[source(i) as usize];
                if drop {
                    vertex.position.y = min_y;
                }
                vertices.push(vertex);
            }
        }

        debug_assert_eq!(vertices.len(), PATCH_VERTEX_COUNT as usize);

        Self {
            min_y,
            max_y,
            forms,
            vertices: vertices.into_boxed_slice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_vertex(patch: &Patch, x: u32, z: u32) -> &TerrainVertex {
        &patch.vertices[(z * PATCH_SIDE_VERTEX_COUNT + x) as usize]
    }

    /// 40x40 quads; heights rise with z, the form map is form 0 for x < 20 and form 1 otherwise.
    fn fixture() -> (HeightMap, FormWeights) {
        let cells = UVec2::new(40, 40);
        let size = cells + UVec2::ONE;
        let elevations = (0..size.y)
            .flat_map(|z| (0..size.x).map(move |_| (z * 4) as u8))
            .collect();
        let height_map = HeightMap::new(cells, 1.0, 0.0, 256.0, elevations);

        let form_map: Vec<u8> = (0..size.y)
            .flat_map(|_| (0..size.x).map(|x| if x < 20 { 0 } else { 1 }))
            .collect();
        let weights = FormWeights::one_hot(size, 2, &form_map);

        (height_map, weights)
    }

    #[test]
    fn grid_size_rounds_up() {
        assert_eq!(patch_grid_size(UVec2::new(100, 100)), UVec2::new(4, 4));
        assert_eq!(patch_grid_size(UVec2::new(32, 33)), UVec2::new(1, 2));
    }

    #[test]
    fn vertex_layout_matches_struct() {
        use renderer::AsVertexLayout;
        let layout = TerrainVertex::vertex_buffer_layout();
        assert_eq!(layout.array_stride, 28);
        assert_eq!(PATCH_VERTEX_COUNT, 1221);
    }

    #[test]
    fn interior_patch() {
        let (height_map, weights) = fixture();
        let patch = Patch::generate(&height_map, &weights, UVec2::ZERO);

        assert_eq!(patch.vertices.len(), PATCH_VERTEX_COUNT as usize);
        assert_eq!(patch.min_y, 0.0);
        assert_eq!(patch.max_y, 128.0);
        assert_eq!(patch.forms, [0, 1, 1, 1]);

        let v = grid_vertex(&patch, 3, 5);
        assert_eq!(v.position, Vec3::new(3.0, 20.0, 5.0));
        assert_eq!(v.color, 0);
        let v = grid_vertex(&patch, 25, 5);
        assert_eq!(v.color, 0xFF00_0000);

        // The patch starts on the terrain border on left and near, so only right and far drop.
        let skirt = |edge: u32, i: u32| {
            patch.vertices[(SKIRT_VERTEX_START + edge * PATCH_SIDE_VERTEX_COUNT + i) as usize]
        };
        assert_eq!(skirt(0, 7).position, Vec3::new(0.0, 28.0, 7.0));
        assert_eq!(skirt(1, 7).position, Vec3::new(32.0, 0.0, 7.0));
        assert_eq!(skirt(2, 7).position, Vec3::new(7.0, 0.0, 0.0));
        assert_eq!(skirt(3, 7).position, Vec3::new(7.0, 0.0, 32.0));
    }

    #[test]
    fn edge_patch_repeats_last_real_vertices() {
        let (height_map, weights) = fixture();
        let patch = Patch::generate(&height_map, &weights, UVec2::new(32, 32));

        // Real nodes 32..=40 map to local 0..=8.
        assert_eq!(patch.min_y, 128.0);
        assert_eq!(patch.max_y, 160.0);
        // Forms without weight still fill the free slots.
        assert_eq!(patch.forms, [0, 1, 1, 1]);

        let corner = *grid_vertex(&patch, 8, 8);
        assert_eq!(corner.position, Vec3::new(40.0, 160.0, 40.0));
        assert_eq!(*grid_vertex(&patch, 32, 32), corner);
        assert_eq!(
            grid_vertex(&patch, 20, 3).position,
            Vec3::new(40.0, 140.0, 35.0)
        );
        assert_eq!(
            grid_vertex(&patch, 3, 20).position,
            Vec3::new(35.0, 160.0, 40.0)
        );

        // Left and near skirts drop to the patch minimum.
        let left = patch.vertices[(SKIRT_VERTEX_START + 3) as usize];
        assert_eq!(left.position, Vec3::new(32.0, 128.0, 35.0));
        let near = patch.vertices[(SKIRT_VERTEX_START + 2 * PATCH_SIDE_VERTEX_COUNT + 3) as usize];
        assert_eq!(near.position, Vec3::new(35.0, 128.0, 32.0));
        // Far skirt sits on the terrain border and keeps its height.
        let far = patch.vertices[(SKIRT_VERTEX_START + 3 * PATCH_SIDE_VERTEX_COUNT + 3) as usize];
        assert_eq!(far.position, Vec3::new(35.0, 160.0, 40.0));
    }

    #[test]
    fn packed_weights_are_renormalized() {
        let forms = [0, 1, 2, 3];
        assert_eq!(pack_weights(&[0, 0, 0, 0], &forms), 0);
        assert_eq!(pack_weights(&[255, 0, 0, 0], &forms), 0);
        assert_eq!(pack_weights(&[0, 0, 0, 100], &forms), 0x0000_FF00);
        assert_eq!(pack_weights(&[50, 50, 0, 0, 100], &forms), 0x7F00_0000);
    }
}
