//! A fixed pool of vertex buffer slots, each holding the vertices of one patch. Patches are
//! copied in on demand, replacing the least recently used one.

use super::patch::{PATCH_VERTEX_COUNT, Patch, TerrainVertex};

/// Number of patches that fit in the terrain vertex buffer.
pub const VB_PATCH_COUNT: usize = 16;

/// Destination of patch vertex uploads.
pub trait SlotStorage {
    /// Replace the vertices of `slot`. `vertices` is always [`PATCH_VERTEX_COUNT`] long.
    fn write_slot(
        &mut self,
        slot: usize,
        vertices: &[TerrainVertex],
    ) -> Result<(), renderer::RendererError>;
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    patch: Option<usize>,
    /// Frame the slot was last drawn in, `None` if it never was.
    last_used: Option<u64>,
}

pub struct PatchSlots<const N: usize> {
    slots: [Slot; N],
    frame: u64,
}

impl<const N: usize> Default for PatchSlots<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PatchSlots<N> {
    pub fn new() -> Self {
        const { assert!(N > 0, "at least one patch slot is required") };
        Self {
            slots: [Slot::default(); N],
            frame: 0,
        }
    }

    /// Start a new batch. Every draw issued so far must have been submitted, so slots used
    /// before become candidates for eviction.
    pub fn begin_frame(&mut self) {
        self.frame += 1;
    }

    /// Slot currently holding `patch_index`, if any.
    pub fn slot_of(&self, patch_index: usize) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.patch == Some(patch_index))
    }

    /// Make sure the vertices of `patch_index` are in a slot and return the index of its first
    /// vertex in the storage.
    ///
    /// Returns `None` if every slot already holds a patch drawn in the current batch. Those
    /// draws have not been submitted yet, so the batch has to be submitted and a new one started
    /// with [`PatchSlots::begin_frame`] before `patch_index` can be uploaded.
    pub fn ensure_resident(
        &mut self,
        patch_index: usize,
        patches: &[Patch],
        storage: &mut impl SlotStorage,
    ) -> Result<Option<u32>, renderer::RendererError> {
        if let Some(slot) = self.slot_of(patch_index) {
            self.slots[slot].last_used = Some(self.frame);
            return Ok(Some(slot as u32 * PATCH_VERTEX_COUNT));
        }

        let Some(slot) = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.last_used != Some(self.frame))
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(i, _)| i)
        else {
            return Ok(None);
        };

        storage.write_slot(slot, &patches[patch_index].vertices)?;

        self.slots[slot] = Slot {
            patch: Some(patch_index),
            last_used: Some(self.frame),
        };

        Ok(Some(slot as u32 * PATCH_VERTEX_COUNT))
    }
}

/// Slot storage kept in system memory.
pub struct CpuSlotStorage {
    vertices: Vec<TerrainVertex>,
    writes: usize,
}

impl CpuSlotStorage {
    pub fn new(slot_count: usize) -> Self {
        Self {
            vertices: vec![TerrainVertex::default(); slot_count * PATCH_VERTEX_COUNT as usize],
            writes: 0,
        }
    }

    pub fn slot(&self, slot: usize) -> &[TerrainVertex] {
        let start = slot * PATCH_VERTEX_COUNT as usize;
        &self.vertices[start..start + PATCH_VERTEX_COUNT as usize]
    }

    /// Number of slot uploads so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl SlotStorage for CpuSlotStorage {
    fn write_slot(
        &mut self,
        slot: usize,
        vertices: &[TerrainVertex],
    ) -> Result<(), renderer::RendererError> {
        let start = slot * PATCH_VERTEX_COUNT as usize;
        let end = start + vertices.len();
        if end > self.vertices.len() {
            return Err(renderer::RendererError::OutOfBounds {
                label: "cpu_patch_slots".to_string(),
                offset: start as u64,
                len: vertices.len() as u64,
                size: self.vertices.len() as u64,
            });
        }

        self.vertices[start..end].copy_from_slice(vertices);
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn patches(count: usize) -> Vec<Patch> {
        (0..count)
            .map(|i| Patch {
                min_y: 0.0,
                max_y: 0.0,
                forms: Default::default(),
                vertices: vec![
                    TerrainVertex {
                        position: Vec3::splat(i as f32),
                        normal: Vec3::Y,
                        color: i as u32,
                    };
                    PATCH_VERTEX_COUNT as usize
                ]
                .into_boxed_slice(),
            })
            .collect()
    }

    #[test]
    fn evicts_least_recently_used() {
        const A: usize = 0;
        const B: usize = 1;
        const C: usize = 2;

        let patches = patches(3);
        let mut storage = CpuSlotStorage::new(2);
        let mut slots = PatchSlots::<2>::new();

        let mut draw = |slots: &mut PatchSlots<2>, patch| {
            slots.begin_frame();
            slots
                .ensure_resident(patch, &patches, &mut storage)
                .unwrap()
                .unwrap()
        };

        assert_eq!(draw(&mut slots, A), 0);
        assert_eq!(draw(&mut slots, B), PATCH_VERTEX_COUNT);
        assert_eq!(draw(&mut slots, A), 0);
        assert_eq!(draw(&mut slots, C), PATCH_VERTEX_COUNT);

        assert_eq!(slots.slot_of(A), Some(0));
        assert_eq!(slots.slot_of(B), None);
        assert_eq!(slots.slot_of(C), Some(1));

        assert_eq!(storage.writes(), 3);
        assert_eq!(storage.slot(1), &patches[C].vertices[..]);
        assert_eq!(storage.slot(0), &patches[A].vertices[..]);
    }

    #[test]
    fn hits_do_not_upload() {
        let patches = patches(1);
        let mut storage = CpuSlotStorage::new(VB_PATCH_COUNT);
        let mut slots = PatchSlots::<VB_PATCH_COUNT>::new();

        for _ in 0..5 {
            slots.begin_frame();
            assert_eq!(
                slots.ensure_resident(0, &patches, &mut storage).unwrap(),
                Some(0)
            );
        }
        assert_eq!(storage.writes(), 1);
    }

    #[test]
    fn unused_slots_fill_first() {
        let patches = patches(4);
        let mut storage = CpuSlotStorage::new(4);
        let mut slots = PatchSlots::<4>::new();

        slots.begin_frame();
        for patch in 0..4 {
            let base = slots.ensure_resident(patch, &patches, &mut storage).unwrap();
            assert_eq!(base, Some(patch as u32 * PATCH_VERTEX_COUNT));
        }
        for patch in 0..4 {
            assert_eq!(storage.slot(patch)[0].color, patch as u32);
        }
    }

    #[test]
    fn full_batch_does_not_overwrite_drawn_slots() {
        let patches = patches(VB_PATCH_COUNT + 1);
        let mut storage = CpuSlotStorage::new(VB_PATCH_COUNT);
        let mut slots = PatchSlots::<VB_PATCH_COUNT>::new();

        slots.begin_frame();
        for patch in 0..VB_PATCH_COUNT {
            assert!(
                slots
                    .ensure_resident(patch, &patches, &mut storage)
                    .unwrap()
                    .is_some()
            );
        }

        let last = VB_PATCH_COUNT;
        assert_eq!(
            slots.ensure_resident(last, &patches, &mut storage).unwrap(),
            None
        );
        assert_eq!(storage.writes(), VB_PATCH_COUNT);
        assert_eq!(storage.slot(0), &patches[0].vertices[..]);

        // Patches already in the batch can still be drawn again.
        assert_eq!(
            slots.ensure_resident(3, &patches, &mut storage).unwrap(),
            Some(3 * PATCH_VERTEX_COUNT)
        );

        slots.begin_frame();
        assert_eq!(
            slots.ensure_resident(last, &patches, &mut storage).unwrap(),
            Some(0)
        );
        assert_eq!(storage.slot(0), &patches[last].vertices[..]);
    }

    #[test]
    fn every_draw_reads_its_own_patch() {
        let patches = patches(20);
        let mut storage = CpuSlotStorage::new(VB_PATCH_COUNT);
        let mut slots = PatchSlots::<VB_PATCH_COUNT>::new();

        // Draws recorded in the current batch, checked against the storage when it is submitted.
        let mut pending: Vec<(usize, u32)> = Vec::new();
        let mut batches = 0;
        let submit = |pending: &mut Vec<(usize, u32)>, storage: &CpuSlotStorage| {
            for &(patch, base_vertex) in pending.iter() {
                let slot = (base_vertex / PATCH_VERTEX_COUNT) as usize;
                assert_eq!(storage.slot(slot), &patches[patch].vertices[..]);
            }
            pending.clear();
        };

        slots.begin_frame();
        for patch in 0..patches.len() {
            let base_vertex = match slots.ensure_resident(patch, &patches, &mut storage).unwrap() {
                Some(base_vertex) => base_vertex,
                None => {
                    submit(&mut pending, &storage);
                    batches += 1;
                    slots.begin_frame();
                    slots
                        .ensure_resident(patch, &patches, &mut storage)
                        .unwrap()
                        .unwrap()
                }
            };
            pending.push((patch, base_vertex));
        }
        submit(&mut pending, &storage);
        batches += 1;

        assert_eq!(batches, 2);
        assert_eq!(storage.writes(), 20);
    }
}
