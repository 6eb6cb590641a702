//! Binary cache of generated patches.
//!
//! Layout: [`CACHE_HEADER`], the [`CacheKey`] (`cells: [u32; 2]`, `vertex_distance`, `min_y`,
//! `max_y` as `f32`), then for every patch in row-major order `min_y: f32`, `max_y: f32`,
//! `forms: [u32; TERRAIN_FORMS_PER_PATCH]` and the raw patch vertices. Everything is little
//! endian and nothing may follow the last patch.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use glam::UVec2;

use super::error::LoadError;
use super::patch::{
    PATCH_VERTEX_COUNT, Patch, TERRAIN_FORMS_PER_PATCH, TerrainVertex, patch_grid_size,
};

pub const CACHE_HEADER: &[u8] = b"LODTERRAIN_02";

/// Terrain parameters the cached patches were generated with. A cache written with a
/// different key is stale even if it is newer than the source files.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CacheKey {
    pub cells: UVec2,
    pub vertex_distance: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl CacheKey {
    pub fn patch_count(&self) -> usize {
        let grid = patch_grid_size(self.cells);
        (grid.x * grid.y) as usize
    }

    fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LE>(self.cells.x)?;
        w.write_u32::<LE>(self.cells.y)?;
        w.write_f32::<LE>(self.vertex_distance)?;
        w.write_f32::<LE>(self.min_y)?;
        w.write_f32::<LE>(self.max_y)
    }

    fn read<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            cells: UVec2::new(r.read_u32::<LE>()?, r.read_u32::<LE>()?),
            vertex_distance: r.read_f32::<LE>()?,
            min_y: r.read_f32::<LE>()?,
            max_y: r.read_f32::<LE>()?,
        })
    }
}

/// True if the cache exists and was modified after every one of the sources.
pub fn is_fresh(cache: &Path, sources: &[&Path]) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|m| m.modified()).ok();

    let Some(cache_time) = modified(cache) else {
        return false;
    };

    sources.iter().all(|&source| match modified(source) {
        Some(source_time) => source_time < cache_time,
        None => false,
    })
}

pub fn write_patches<W: Write>(
    w: &mut W,
    key: &CacheKey,
    patches: &[Patch],
) -> std::io::Result<()> {
    w.write_all(CACHE_HEADER)?;
    key.write(w)?;
    for patch in patches {
        w.write_f32::<LE>(patch.min_y)?;
        w.write_f32::<LE>(patch.max_y)?;
        for form in patch.forms {
            w.write_u32::<LE>(form)?;
        }
        w.write_all(bytemuck::cast_slice(&patch.vertices[..]))?;
    }
    Ok(())
}

fn read_patch<R: Read>(r: &mut R) -> std::io::Result<Patch> {
    let min_y = r.read_f32::<LE>()?;
    let max_y = r.read_f32::<LE>()?;

    let mut forms = [0_u32; TERRAIN_FORMS_PER_PATCH];
    r.read_u32_into::<LE>(&mut forms)?;

    let mut vertices = vec![TerrainVertex::default(); PATCH_VERTEX_COUNT as usize];
    r.read_exact(bytemuck::cast_slice_mut(&mut vertices[..]))?;

    Ok(Patch {
        min_y,
        max_y,
        forms,
        vertices: vertices.into_boxed_slice(),
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write a new file next to `path` and move it over `path` once it is complete. On failure
/// `path` is left as it was and the partial file is removed.
fn replace_file(
    path: &Path,
    contents: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let temp = temp_path(path);

    let result = File::create(&temp).and_then(|file| {
        let mut writer = BufWriter::new(file);
        contents(&mut writer)?;
        writer
            .into_inner()
            .map_err(|err| err.into_error())?
            .sync_all()?;
        std::fs::rename(&temp, path)
    });

    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    result
}

pub fn write(path: &Path, key: &CacheKey, patches: &[Patch]) -> Result<(), LoadError> {
    tracing::info!("Writing terrain cache: {}", path.display());

    replace_file(path, |writer| write_patches(writer, key, patches))
        .map_err(|err| LoadError::io(path, err))
}

/// Read the cached patches. `Ok(None)` if the cache was written for a different `key`.
pub fn read(path: &Path, key: &CacheKey) -> Result<Option<Vec<Patch>>, LoadError> {
    tracing::info!("Loading terrain patches from cache: {}", path.display());

    let io = |err| LoadError::io(path, err);

    let file = File::open(path).map_err(io)?;
    let mut reader = BufReader::new(file);

    let mut header = [0_u8; CACHE_HEADER.len()];
    reader.read_exact(&mut header).map_err(io)?;
    if header[..] != *CACHE_HEADER {
        return Err(LoadError::content(path, "invalid cache header or version"));
    }

    let cached_key = CacheKey::read(&mut reader).map_err(io)?;
    if cached_key != *key {
        tracing::info!(
            "Terrain cache was written for {:?}, expected {:?}",
            cached_key,
            key
        );
        return Ok(None);
    }

    let patches = (0..key.patch_count())
        .map(|_| read_patch(&mut reader).map_err(io))
        .collect::<Result<Vec<_>, _>>()?;

    let mut trailing = [0_u8; 1];
    if reader.read(&mut trailing).map_err(io)? != 0 {
        return Err(LoadError::content(path, "unexpected data after the last patch"));
    }

    Ok(Some(patches))
}
