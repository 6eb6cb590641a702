//! GPU side of the terrain: the shared index buffer with every level of detail and a vertex
//! buffer streaming the patches being drawn.

use renderer::{BufferDescriptor, BufferId, BufferUsages, Renderer, RendererError};

use super::lod::{self, LEVEL_COUNT};
use super::patch::{PATCH_VERTEX_COUNT, Patch, TerrainVertex};
use super::streaming::{PatchSlots, SlotStorage, VB_PATCH_COUNT};

const SLOT_SIZE: u64 = PATCH_VERTEX_COUNT as u64 * std::mem::size_of::<TerrainVertex>() as u64;

/// Uploads patch vertices into one region of the vertex buffer.
struct GpuSlotStorage<'a> {
    renderer: &'a Renderer,
    vertex_buffer: BufferId,
}

impl SlotStorage for GpuSlotStorage<'_> {
    fn write_slot(&mut self, slot: usize, vertices: &[TerrainVertex]) -> Result<(), RendererError> {
        self.renderer.write_buffer(
            self.vertex_buffer,
            slot as u64 * SLOT_SIZE,
            bytemuck::cast_slice(vertices),
        )
    }
}

/// Totals of a [`TerrainGeometry::draw_patches`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub patches: usize,
    pub triangles: usize,
    /// Number of command buffers submitted.
    pub batches: usize,
}

pub struct TerrainGeometry {
    index_buffer: BufferId,
    vertex_buffer: BufferId,
    slots: PatchSlots<VB_PATCH_COUNT>,
}

impl TerrainGeometry {
    pub fn new(renderer: &mut Renderer) -> Result<Self, RendererError> {
        let indices = lod::generate_indices();
        let index_buffer = renderer.create_buffer_init(
            "terrain_indices",
            BufferUsages::INDEX,
            bytemuck::cast_slice(&indices),
        )?;

        let vertex_buffer = match renderer.create_buffer(BufferDescriptor {
            label: "terrain_vertices".to_string(),
            size: SLOT_SIZE * VB_PATCH_COUNT as u64,
            usages: BufferUsages::VERTEX | BufferUsages::COPY_DST,
        }) {
            Ok(id) => id,
            Err(err) => {
                renderer.destroy_buffer(index_buffer);
                return Err(err);
            }
        };

        tracing::info!(
            "Created terrain geometry: {} indices, {} vertex slots",
            indices.len(),
            VB_PATCH_COUNT
        );

        Ok(Self {
            index_buffer,
            vertex_buffer,
            slots: PatchSlots::new(),
        })
    }

    /// Start a new batch of draws. Every draw recorded with [`TerrainGeometry::draw_patch`]
    /// before this call must have been submitted.
    pub fn begin_frame(&mut self) {
        self.slots.begin_frame();
    }

    /// Bind the vertex and index buffers to `slot` 0 of the render pass.
    pub fn bind(
        &self,
        renderer: &Renderer,
        render_pass: &mut wgpu::RenderPass,
    ) -> Result<(), RendererError> {
        let vertices = renderer
            .buffer(self.vertex_buffer)
            .ok_or(RendererError::InvalidBuffer)?;
        let indices = renderer
            .buffer(self.index_buffer)
            .ok_or(RendererError::InvalidBuffer)?;

        render_pass.set_vertex_buffer(0, vertices.slice(..));
        render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
        Ok(())
    }

    /// Upload the vertices of `patch_index` if they are not in the vertex buffer yet and return
    /// the index of its first vertex. `None` if the batch is full, see
    /// [`PatchSlots::ensure_resident`].
    pub fn ensure_resident(
        &mut self,
        renderer: &Renderer,
        patches: &[Patch],
        patch_index: usize,
    ) -> Result<Option<u32>, RendererError> {
        let mut storage = GpuSlotStorage {
            renderer,
            vertex_buffer: self.vertex_buffer,
        };
        self.slots.ensure_resident(patch_index, patches, &mut storage)
    }

    /// Draw one patch at `level`. The buffers must be bound with [`TerrainGeometry::bind`].
    /// Returns the number of triangles drawn, or `None` without drawing if every slot is taken
    /// by a patch drawn in this batch. Submit the pass and call
    /// [`TerrainGeometry::begin_frame`] before trying again.
    pub fn draw_patch(
        &mut self,
        renderer: &Renderer,
        render_pass: &mut wgpu::RenderPass,
        patches: &[Patch],
        patch_index: usize,
        level: usize,
    ) -> Result<Option<u32>, RendererError> {
        let level = level.min(LEVEL_COUNT - 1);
        let Some(base_vertex) = self.ensure_resident(renderer, patches, patch_index)? else {
            return Ok(None);
        };

        let range = lod::level_range(level);
        let triangles = range.len() as u32 / 3;
        render_pass.draw_indexed(range, base_vertex as i32, 0..1);

        Ok(Some(triangles))
    }

    /// Draw `(patch index, level)` pairs, submitting a command buffer whenever the vertex buffer
    /// runs out of slots. `begin_pass` is called with the batch number for every command
    /// buffer and must return a render pass with the pipeline and bind groups set. Work
    /// recorded before this call must have been submitted.
    pub fn draw_patches<F>(
        &mut self,
        renderer: &Renderer,
        patches: &[Patch],
        draws: &[(usize, usize)],
        mut begin_pass: F,
    ) -> Result<DrawStats, RendererError>
    where
        F: FnMut(&mut wgpu::CommandEncoder, usize) -> wgpu::RenderPass<'_>,
    {
        let mut stats = DrawStats::default();
        let mut remaining = draws;

        while !remaining.is_empty() {
            self.slots.begin_frame();

            let mut encoder =
                renderer
                    .device()
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("terrain_command_encoder"),
                    });

            let mut drawn = 0;
            {
                let mut render_pass = begin_pass(&mut encoder, stats.batches);
                self.bind(renderer, &mut render_pass)?;

                for &(patch_index, level) in remaining {
                    let Some(triangles) =
                        self.draw_patch(renderer, &mut render_pass, patches, patch_index, level)?
                    else {
                        break;
                    };
                    stats.triangles += triangles as usize;
                    drawn += 1;
                }
            }

            renderer.queue().submit(std::iter::once(encoder.finish()));
            stats.batches += 1;

            // A fresh batch always has a free slot.
            if drawn == 0 {
                return Err(RendererError::InvalidBuffer);
            }
            stats.patches += drawn;
            remaining = &remaining[drawn..];
        }

        Ok(stats)
    }

    pub fn destroy(self, renderer: &mut Renderer) {
        renderer.destroy_buffer(self.index_buffer);
        renderer.destroy_buffer(self.vertex_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_copy_aligned() {
        assert_eq!(SLOT_SIZE % wgpu::COPY_BUFFER_ALIGNMENT, 0);
    }

    #[test]
    fn creates_buffers_on_a_headless_device() {
        // Machines without an adapter can't run this.
        let Ok(mut renderer) = Renderer::headless() else {
            return;
        };

        let geometry = TerrainGeometry::new(&mut renderer).unwrap();
        let vertices = renderer.buffer_descriptor(geometry.vertex_buffer).unwrap();
        assert_eq!(vertices.size, SLOT_SIZE * VB_PATCH_COUNT as u64);
        let indices = renderer.buffer_descriptor(geometry.index_buffer).unwrap();
        assert_eq!(indices.size, lod::PATCH_INDEX_COUNT as u64 * 2);

        geometry.destroy(&mut renderer);
    }
}
