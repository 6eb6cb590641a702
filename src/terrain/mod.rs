//! A level of detail heightfield terrain.
//!
//! Loading reads the heightmap, the form descriptor and the form map, then either restores the
//! patches from the disk cache or generates them from the blended form weights and writes a new
//! cache. The loaded [`Terrain`] is immutable and answers height, form and collision queries.
//! Drawing goes through a [`TerrainGeometry`], which streams patch vertices to the GPU.

mod cache;
mod collision;
mod error;
mod form_weights;
mod forms;
mod geometry;
mod height_map;
mod lod;
mod patch;
mod preview;
mod streaming;
mod visibility;

use std::path::{Path, PathBuf};

use glam::{IVec2, UVec2, Vec2, Vec3};

use crate::config::TerrainDesc;
use crate::engine::math::{BoundingBox, Frustum, Ray};

pub use error::{LoadError, TerrainError};
pub use form_weights::{BLUR_PASSES, FormWeights};
pub use forms::{FormBand, FormData, FormDescError, FormDescriptor, FormItem, FormItemKind};
pub use geometry::{DrawStats, TerrainGeometry};
pub use height_map::HeightMap;
pub use lod::{LEVEL_COUNT, PATCH_INDEX_COUNT, generate_indices, level_range, select_level};
pub use patch::{
    PATCH_SIZE, PATCH_VERTEX_COUNT, Patch, TERRAIN_FORMS_PER_PATCH, TerrainVertex,
    patch_grid_size,
};
pub use preview::TerrainPreview;
pub use streaming::{CpuSlotStorage, PatchSlots, SlotStorage, VB_PATCH_COUNT};

pub struct Terrain {
    name: String,
    height_map: HeightMap,
    heightmap_path: PathBuf,
    forms: FormDescriptor,
    /// Form index of every heightmap node.
    form_map: Vec<u8>,
    patch_grid: UVec2,
    patches: Vec<Patch>,
    loaded_from_cache: bool,
}

impl Terrain {
    /// Read the config file at `path` and load the terrain it describes.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TerrainError> {
        let desc = TerrainDesc::from_file(path)?;
        Self::load(&desc)
    }

    pub fn load(desc: &TerrainDesc) -> Result<Self, TerrainError> {
        let fail = |err: LoadError| TerrainError::load(&desc.name, err);

        tracing::info!("Loading terrain \"{}\"", desc.name);

        let height_map = HeightMap::load(
            &desc.heightmap_path,
            desc.cells,
            desc.vertex_distance,
            desc.min_y,
            desc.max_y,
        )
        .map_err(fail)?;

        let forms = FormDescriptor::load(&desc.form_desc_path).map_err(fail)?;
        let form_map = forms
            .classify_file(&desc.form_map_path, &height_map)
            .map_err(fail)?;

        let patch_grid = patch_grid_size(desc.cells);
        let key = cache::CacheKey {
            cells: desc.cells,
            vertex_distance: desc.vertex_distance,
            min_y: desc.min_y,
            max_y: desc.max_y,
        };

        let sources = [
            desc.heightmap_path.as_path(),
            desc.form_desc_path.as_path(),
            desc.form_map_path.as_path(),
        ];

        let cached = if cache::is_fresh(&desc.cache_path, &sources) {
            cache::read(&desc.cache_path, &key).map_err(fail)?
        } else {
            None
        };

        let loaded_from_cache = cached.is_some();
        let patches = match cached {
            Some(patches) => patches,
            None => {
                let weights =
                    FormWeights::from_form_map(height_map.size(), forms.form_count(), &form_map);
                let patches = generate_patches(&height_map, &weights, patch_grid);

                if let Err(err) = cache::write(&desc.cache_path, &key, &patches) {
                    tracing::warn!("Could not write terrain cache: {err}");
                }

                patches
            }
        };

        tracing::info!(
            "Terrain \"{}\" ready: {}x{} cells, {} patches, {} forms",
            desc.name,
            desc.cells.x,
            desc.cells.y,
            patches.len(),
            forms.form_count()
        );

        Ok(Self {
            name: desc.name.clone(),
            height_map,
            heightmap_path: desc.heightmap_path.clone(),
            forms,
            form_map,
            patch_grid,
            patches,
            loaded_from_cache,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cells(&self) -> UVec2 {
        self.height_map.cells()
    }

    pub fn vertex_distance(&self) -> f32 {
        self.height_map.vertex_distance()
    }

    pub fn min_y(&self) -> f32 {
        self.height_map.min_y()
    }

    pub fn max_y(&self) -> f32 {
        self.height_map.max_y()
    }

    pub fn heightmap_path(&self) -> &Path {
        &self.heightmap_path
    }

    pub fn height_map(&self) -> &HeightMap {
        &self.height_map
    }

    pub fn forms(&self) -> &FormDescriptor {
        &self.forms
    }

    /// True if the patches were restored from the disk cache instead of being generated.
    pub fn loaded_from_cache(&self) -> bool {
        self.loaded_from_cache
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let extent = self.height_map.extent();
        BoundingBox::new(
            Vec3::new(0.0, self.min_y(), 0.0),
            Vec3::new(extent.x, self.max_y(), extent.y),
        )
    }

    // Heights

    pub fn elevation_at(&self, node: IVec2) -> u8 {
        self.height_map.elevation_at(node)
    }

    pub fn height_at(&self, node: IVec2) -> f32 {
        self.height_map.height_at(node)
    }

    pub fn world_height_at(&self, x: f32, z: f32) -> f32 {
        self.height_map.world_height_at(x, z)
    }

    pub fn value_to_height(&self, value: u8) -> f32 {
        self.height_map.value_to_height(value)
    }

    /// Lowest and highest height inside the world rectangle with corners `a` and `b`.
    pub fn area_height_range(&self, a: Vec2, b: Vec2) -> (f32, f32) {
        self.height_map.area_height_range(a, b)
    }

    // Forms

    /// Form index of a node. Coordinates outside the terrain are clamped.
    pub fn form_at(&self, node: IVec2) -> u8 {
        let size = self.height_map.size();
        let x = node.x.clamp(0, size.x as i32 - 1) as usize;
        let z = node.y.clamp(0, size.y as i32 - 1) as usize;
        self.form_map[z * size.x as usize + x]
    }

    /// Form index of the node nearest to a world position.
    pub fn world_form_at(&self, x: f32, z: f32) -> u8 {
        self.form_at(self.nearest_node(x, z))
    }

    pub fn tag_at(&self, node: IVec2) -> u32 {
        self.tag_for_form(self.form_at(node) as usize)
    }

    pub fn world_tag_at(&self, x: f32, z: f32) -> u32 {
        self.tag_at(self.nearest_node(x, z))
    }

    pub fn tag_for_form(&self, form: usize) -> u32 {
        self.form_data(form).tag
    }

    pub fn texture_name_for_form(&self, form: usize) -> &str {
        &self.form_data(form).texture_name
    }

    fn form_data(&self, form: usize) -> &FormData {
        let forms = self.forms.forms();
        &forms[form.min(forms.len() - 1)]
    }

    fn nearest_node(&self, x: f32, z: f32) -> IVec2 {
        (Vec2::new(x, z) / self.vertex_distance()).round().as_ivec2()
    }

    // Patches

    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    /// Number of patches on X and Z.
    pub fn patch_grid(&self) -> UVec2 {
        self.patch_grid
    }

    pub fn patch(&self, index: usize) -> &Patch {
        &self.patches[index]
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    fn patch_cell(&self, index: usize) -> UVec2 {
        let index = index as u32;
        UVec2::new(index % self.patch_grid.x, index / self.patch_grid.x)
    }

    pub fn patch_bounding_box(&self, index: usize) -> BoundingBox {
        visibility::patch_bounding_box(
            &self.patches[index],
            self.patch_cell(index),
            self.vertex_distance(),
        )
    }

    /// Texture names of the forms blended in a patch, in the order of its vertex weights.
    pub fn patch_texture_names(&self, index: usize) -> [&str; TERRAIN_FORMS_PER_PATCH] {
        self.patches[index]
            .forms
            .map(|form| self.texture_name_for_form(form as usize))
    }

    pub fn patch_texture_scales(&self, index: usize) -> [f32; TERRAIN_FORMS_PER_PATCH] {
        self.patches[index]
            .forms
            .map(|form| self.form_data(form as usize).tex_scale)
    }

    /// Level of detail to draw a patch with, seen from `eye` with the far plane at `far`.
    pub fn patch_level(&self, index: usize, eye: Vec3, far: f32) -> usize {
        let bounds = self.patch_bounding_box(index);
        select_level(
            Vec2::new(bounds.min.x, bounds.min.z),
            Vec2::new(bounds.max.x, bounds.max.z),
            eye,
            far,
        )
    }

    // Queries

    /// Patches that may be inside `frustum`. `frustum_box` is the bounding box of the frustum's
    /// corners.
    pub fn visible_patches(&self, frustum: &Frustum, frustum_box: &BoundingBox) -> Vec<usize> {
        visibility::visible_patches(
            frustum,
            frustum_box,
            &self.patches,
            self.patch_grid,
            self.vertex_distance(),
        )
    }

    /// Ray parameter of the nearest surface point the ray hits within `0..=max_t`.
    pub fn ray_collision(&self, ray: &Ray, max_t: f32) -> Option<f32> {
        collision::ray_collision(&self.height_map, &self.patches, self.patch_grid, ray, max_t)
    }

    // Drawing

    /// Create the GPU buffers the patches are drawn from.
    pub fn create_geometry(
        &self,
        renderer: &mut renderer::Renderer,
    ) -> Result<TerrainGeometry, TerrainError> {
        self.gpu_result(TerrainGeometry::new(renderer))
    }

    fn gpu_result<T>(
        &self,
        result: Result<T, renderer::RendererError>,
    ) -> Result<T, TerrainError> {
        result.map_err(|err| TerrainError::load(&self.name, LoadError::Gpu(err)))
    }

    /// Draw a patch at `level`. Returns the number of triangles drawn, `None` if the current
    /// batch is full (see [`TerrainGeometry::draw_patch`]).
    pub fn draw_patch(
        &self,
        geometry: &mut TerrainGeometry,
        renderer: &renderer::Renderer,
        render_pass: &mut wgpu::RenderPass,
        index: usize,
        level: usize,
    ) -> Result<Option<u32>, renderer::RendererError> {
        geometry.draw_patch(renderer, render_pass, &self.patches, index, level)
    }

    /// Draw a patch at the level of detail for its distance from `eye`.
    pub fn draw_patch_from(
        &self,
        geometry: &mut TerrainGeometry,
        renderer: &renderer::Renderer,
        render_pass: &mut wgpu::RenderPass,
        index: usize,
        eye: Vec3,
        far: f32,
    ) -> Result<Option<u32>, renderer::RendererError> {
        let level = self.patch_level(index, eye, far);
        self.draw_patch(geometry, renderer, render_pass, index, level)
    }

    /// Draw every patch in `indices` at the level of detail for its distance from `eye`,
    /// submitting as many batches as the vertex buffer needs. See
    /// [`TerrainGeometry::draw_patches`].
    pub fn draw_patches<F>(
        &self,
        geometry: &mut TerrainGeometry,
        renderer: &renderer::Renderer,
        indices: &[usize],
        eye: Vec3,
        far: f32,
        begin_pass: F,
    ) -> Result<DrawStats, renderer::RendererError>
    where
        F: FnMut(&mut wgpu::CommandEncoder, usize) -> wgpu::RenderPass<'_>,
    {
        let draws: Vec<_> = indices
            .iter()
            .map(|&index| (index, self.patch_level(index, eye, far)))
            .collect();
        geometry.draw_patches(renderer, &self.patches, &draws, begin_pass)
    }
}

fn generate_patches(height_map: &HeightMap, weights: &FormWeights, grid: UVec2) -> Vec<Patch> {
    tracing::info!("Generating {} terrain patches", grid.x * grid.y);

    let mut patches = Vec::with_capacity((grid.x * grid.y) as usize);
    for z in 0..grid.y {
        for x in 0..grid.x {
            patches.push(Patch::generate(
                height_map,
                weights,
                UVec2::new(x, z) * PATCH_SIZE,
            ));
        }
    }
    patches
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    const FORMS: &str = r#"
TerrainForms 1
0xFF00FF00 simple { "grass.jpg" Tag=1 TexScale=4.0 }
0xFF0000FF simple { "water.jpg" Tag=2 }
"#;

    const CELLS: u32 = 100;

    /// Writes a 100x100 terrain whose height rises along X by one unit per node, with grass on
    /// the west half and water on the east half.
    fn write_fixture(dir: &Path) -> PathBuf {
        let nodes = CELLS + 1;

        let heights: Vec<u8> = (0..nodes * nodes).map(|i| (i % nodes) as u8).collect();
        std::fs::write(dir.join("height.raw"), heights).unwrap();
        std::fs::write(dir.join("forms.txt"), FORMS).unwrap();

        let form_map = image::RgbaImage::from_fn(nodes, nodes, |x, _| {
            if x < 50 {
                image::Rgba([0, 255, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        });
        form_map.save(dir.join("forms.png")).unwrap();

        let config = dir.join("test.cfg");
        std::fs::write(
            &config,
            r#"
SET name "test"
SET cx 100
SET cz 100
SET vertex_distance 1.0
SET min_y 0.0
SET max_y 256.0
SET heightmap "height.raw"
SET form_desc "forms.txt"
SET form_map "forms.png"
SET cache "test.cache"
"#,
        )
        .unwrap();

        // Sources older than anything written afterwards.
        let past = SystemTime::now() - Duration::from_secs(120);
        for name in ["height.raw", "forms.txt", "forms.png"] {
            set_modified(&dir.join(name), past);
        }

        config
    }

    fn set_modified(path: &Path, time: SystemTime) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn patch_grid_rounds_up() {
        assert_eq!(patch_grid_size(UVec2::new(100, 100)), UVec2::new(4, 4));
        assert_eq!(patch_grid_size(UVec2::new(64, 65)), UVec2::new(2, 3));
    }

    #[test]
    fn loads_and_answers_queries() {
        let dir = tempfile::tempdir().unwrap();
        let terrain = Terrain::from_file(write_fixture(dir.path())).unwrap();

        assert_eq!(terrain.name(), "test");
        assert_eq!(terrain.patch_count(), 16);
        assert_eq!(terrain.patch_grid(), UVec2::new(4, 4));
        assert!(!terrain.loaded_from_cache());
        assert!(dir.path().join("test.cache").exists());

        assert_eq!(terrain.height_at(IVec2::new(50, 3)), 50.0);
        assert_eq!(terrain.world_height_at(50.5, 20.0), 50.5);
        assert_eq!(terrain.height_at(IVec2::new(500, -3)), 100.0);

        assert_eq!(terrain.form_at(IVec2::new(10, 10)), 0);
        assert_eq!(terrain.form_at(IVec2::new(90, 10)), 1);
        assert_eq!(terrain.world_form_at(49.4, 10.0), 0);
        assert_eq!(terrain.world_form_at(49.6, 10.0), 1);
        assert_eq!(terrain.tag_at(IVec2::new(10, 10)), 1);
        assert_eq!(terrain.world_tag_at(80.0, 80.0), 2);
        assert_eq!(terrain.texture_name_for_form(1), "water.jpg");

        let bounds = terrain.bounding_box();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::new(100.0, 256.0, 100.0));

        // The west patch only has grass, the form list fills up with the remaining form.
        assert_eq!(terrain.patch(0).forms, [0, 1, 1, 1]);
        assert_eq!(terrain.patch_texture_names(0)[0], "grass.jpg");
        assert_eq!(terrain.patch_texture_scales(0), [4.0, 1.0, 1.0, 1.0]);

        let (low, high) = terrain.area_height_range(Vec2::new(10.0, 0.0), Vec2::new(20.5, 5.0));
        assert_eq!((low, high), (10.0, 20.5));

        let ray = Ray::new(Vec3::new(50.5, 200.0, 20.5), Vec3::NEG_Y);
        assert_eq!(terrain.ray_collision(&ray, 1000.0), Some(149.5));
    }

    #[test]
    fn second_load_uses_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_fixture(dir.path());

        let generated = Terrain::from_file(&config).unwrap();
        let cached = Terrain::from_file(&config).unwrap();

        assert!(cached.loaded_from_cache());
        assert_eq!(cached.patches(), generated.patches());
    }

    #[test]
    fn newer_source_invalidates_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_fixture(dir.path());

        Terrain::from_file(&config).unwrap();
        set_modified(
            &dir.path().join("forms.png"),
            SystemTime::now() + Duration::from_secs(60),
        );

        let terrain = Terrain::from_file(&config).unwrap();
        assert!(!terrain.loaded_from_cache());
    }

    #[test]
    fn missing_heightmap_names_the_terrain() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_fixture(dir.path());
        std::fs::remove_file(dir.path().join("height.raw")).unwrap();

        let err = Terrain::from_file(&config).err().unwrap();
        match err {
            TerrainError::Load { name, source } => {
                assert_eq!(name, "test");
                assert!(matches!(source, LoadError::Io { .. }));
            }
            err => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn changed_parameters_regenerate_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_fixture(dir.path());
        Terrain::from_file(&config).unwrap();

        // Only the config changes, the cache stays newer than every source.
        let text = std::fs::read_to_string(&config).unwrap();
        std::fs::write(&config, text.replace("SET max_y 256.0", "SET max_y 512.0")).unwrap();

        let terrain = Terrain::from_file(&config).unwrap();
        assert!(!terrain.loaded_from_cache());
        assert_eq!(terrain.height_at(IVec2::new(50, 3)), 100.0);
        assert_eq!(terrain.patch(1).max_y, terrain.height_at(IVec2::new(64, 0)));

        let cached = Terrain::from_file(&config).unwrap();
        assert!(cached.loaded_from_cache());
        assert_eq!(cached.patches(), terrain.patches());
    }

    #[test]
    fn gpu_errors_name_the_terrain() {
        let dir = tempfile::tempdir().unwrap();
        let terrain = Terrain::from_file(write_fixture(dir.path())).unwrap();

        let err = terrain
            .gpu_result::<()>(Err(renderer::RendererError::NoAdapter))
            .err()
            .unwrap();
        match err {
            TerrainError::Load { name, source } => {
                assert_eq!(name, "test");
                assert!(matches!(
                    source,
                    LoadError::Gpu(renderer::RendererError::NoAdapter)
                ));
            }
            err => panic!("unexpected error: {err}"),
        }
    }
}
