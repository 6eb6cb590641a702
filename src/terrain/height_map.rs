use std::io::Read;
use std::path::Path;

use glam::{IVec2, UVec2, Vec2, Vec3};

use super::error::LoadError;

/// A rectangular grid of evenly spaced vertices, each with an 8-bit elevation.
///
/// Nodes are the vertices of the grid and cells are the quads between adjacent nodes, so a map of
/// `cells` quads holds `cells + 1` nodes on each axis.
pub struct HeightMap {
    cells: UVec2,
    vertex_distance: f32,
    min_y: f32,
    max_y: f32,
    elevations: Vec<u8>,
}

impl HeightMap {
    pub fn new(
        cells: UVec2,
        vertex_distance: f32,
        min_y: f32,
        max_y: f32,
        elevations: Vec<u8>,
    ) -> Self {
        debug_assert_eq!(
            elevations.len(),
            (cells.x as usize + 1) * (cells.y as usize + 1)
        );
        Self {
            cells,
            vertex_distance,
            min_y,
            max_y,
            elevations,
        }
    }

    /// Load the elevations from `path`. Files with a `.raw` extension hold exactly one byte per
    /// node and `.pcx` files are paletted images whose palette index is the elevation.
    ///
    /// Anything else is decoded as an image and the elevation is the high byte of its 16-bit
    /// luminance. No single ARGB channel is read, so a grayscale map decodes the same in any
    /// format but a map that stores heights in one color channel does not.
    pub fn load(
        path: &Path,
        cells: UVec2,
        vertex_distance: f32,
        min_y: f32,
        max_y: f32,
    ) -> Result<Self, LoadError> {
        let size = cells + UVec2::ONE;

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let elevations = match extension.as_str() {
            "raw" => {
                tracing::info!("Loading raw heightmap: {}", path.display());
                Self::read_raw(path, size)?
            }
            "pcx" => {
                tracing::info!("Loading pcx heightmap: {}", path.display());
                Self::read_pcx(path, size)?
            }
            _ => {
                tracing::info!("Loading image heightmap: {}", path.display());
                Self::read_image(path, size)?
            }
        };

        Ok(Self::new(cells, vertex_distance, min_y, max_y, elevations))
    }

    fn read_raw(path: &Path, size: UVec2) -> Result<Vec<u8>, LoadError> {
        let mut elevations = vec![0_u8; size.x as usize * size.y as usize];
        std::fs::File::open(path)
            .and_then(|mut file| file.read_exact(&mut elevations))
            .map_err(|err| LoadError::io(path, err))?;
        Ok(elevations)
    }

    fn read_pcx(path: &Path, size: UVec2) -> Result<Vec<u8>, LoadError> {
        let mut reader = pcx::Reader::from_file(path).map_err(|err| LoadError::io(path, err))?;
        if !reader.is_paletted() {
            return Err(LoadError::content(path, "pcx heightmap must be paletted"));
        }

        let width = reader.width() as usize;
        let height = reader.height() as usize;

        let mut elevations = vec![0_u8; size.x as usize * size.y as usize];
        let mut row = vec![0_u8; width];
        let copy_width = width.min(size.x as usize);
        for z in 0..height.min(size.y as usize) {
            reader
                .next_row_paletted(&mut row)
                .map_err(|err| LoadError::io(path, err))?;
            let start = z * size.x as usize;
            elevations[start..start + copy_width].copy_from_slice(&row[..copy_width]);
        }

        Ok(elevations)
    }

    fn read_image(path: &Path, size: UVec2) -> Result<Vec<u8>, LoadError> {
        let image = image::open(path)
            .map_err(|source| LoadError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_luma16();

        // Nodes not covered by the image stay at 0.
        let mut elevations = vec![0_u8; size.x as usize * size.y as usize];
        for z in 0..size.y.min(image.height()) {
            for x in 0..size.x.min(image.width()) {
                elevations[(z * size.x + x) as usize] = (image.get_pixel(x, z).0[0] >> 8) as u8;
            }
        }

        Ok(elevations)
    }

    /// Number of quads on X and Z.
    #[inline]
    pub fn cells(&self) -> UVec2 {
        self.cells
    }

    /// Number of nodes on X and Z.
    #[inline]
    pub fn size(&self) -> UVec2 {
        self.cells + UVec2::ONE
    }

    #[inline]
    pub fn vertex_distance(&self) -> f32 {
        self.vertex_distance
    }

    #[inline]
    pub fn min_y(&self) -> f32 {
        self.min_y
    }

    #[inline]
    pub fn max_y(&self) -> f32 {
        self.max_y
    }

    /// World size of the terrain on X and Z.
    pub fn extent(&self) -> Vec2 {
        self.cells.as_vec2() * self.vertex_distance
    }

    pub fn elevations(&self) -> &[u8] {
        &self.elevations
    }

    /// Raw elevation of a node. Coordinates outside the map are clamped to the nearest edge.
    pub fn elevation_at(&self, node: IVec2) -> u8 {
        let x = node.x.clamp(0, self.cells.x as i32) as usize;
        let z = node.y.clamp(0, self.cells.y as i32) as usize;
        self.elevations[z * (self.cells.x as usize + 1) + x]
    }

    pub fn value_to_height(&self, value: u8) -> f32 {
        value as f32 / 256.0 * (self.max_y - self.min_y) + self.min_y
    }

    /// World height of a node, clamped like [`HeightMap::elevation_at`].
    pub fn height_at(&self, node: IVec2) -> f32 {
        self.value_to_height(self.elevation_at(node))
    }

    pub fn position_at(&self, node: IVec2) -> Vec3 {
        Vec3::new(
            node.x as f32 * self.vertex_distance,
            self.height_at(node),
            node.y as f32 * self.vertex_distance,
        )
    }

    /// Bilinearly interpolated world height at a world position. Positions outside the terrain
    /// are clamped to its edge.
    pub fn world_height_at(&self, x: f32, z: f32) -> f32 {
        let fx = (x / self.vertex_distance).clamp(0.0, self.cells.x as f32);
        let fz = (z / self.vertex_distance).clamp(0.0, self.cells.y as f32);

        let x0 = (fx.floor() as i32).min(self.cells.x as i32 - 1);
        let z0 = (fz.floor() as i32).min(self.cells.y as i32 - 1);
        let tx = fx - x0 as f32;
        let tz = fz - z0 as f32;

        let h00 = self.height_at(IVec2::new(x0, z0));
        let h10 = self.height_at(IVec2::new(x0 + 1, z0));
        let h01 = self.height_at(IVec2::new(x0, z0 + 1));
        let h11 = self.height_at(IVec2::new(x0 + 1, z0 + 1));

        let near = h00 + (h10 - h00) * tx;
        let far = h01 + (h11 - h01) * tx;
        near + (far - near) * tz
    }

    /// Smooth normal of a node: the normalized sum of the normals of the slopes towards each of
    /// the 8 neighbors that exist.
    pub fn normal_at(&self, node: IVec2) -> Vec3 {
        const NEIGHBORS: [(i32, i32, Vec3); 8] = [
            (-1, 0, Vec3::NEG_Z),
            (1, 0, Vec3::Z),
            (0, -1, Vec3::X),
            (0, 1, Vec3::NEG_X),
            (-1, -1, Vec3::new(1.0, 0.0, -1.0)),
            (1, -1, Vec3::new(1.0, 0.0, 1.0)),
            (-1, 1, Vec3::new(-1.0, 0.0, -1.0)),
            (1, 1, Vec3::new(-1.0, 0.0, 1.0)),
        ];

        let position = self.position_at(node);
        let mut normal = Vec3::ZERO;
        for (dx, dz, axis) in NEIGHBORS {
            let neighbor = node + IVec2::new(dx, dz);
            if neighbor.x < 0
                || neighbor.y < 0
                || neighbor.x > self.cells.x as i32
                || neighbor.y > self.cells.y as i32
            {
                continue;
            }
            let edge = self.position_at(neighbor) - position;
            normal += axis.cross(edge).normalize_or_zero();
        }

        normal.normalize_or(Vec3::Y)
    }

    /// Lowest and highest world height over a world rectangle given by two opposite corners.
    ///
    /// Samples every node inside the rectangle, the rectangle's edges at node spacing and its
    /// corners.
    pub fn area_height_range(&self, a: Vec2, b: Vec2) -> (f32, f32) {
        let min = a.min(b);
        let max = a.max(b);

        let x1 = ((min.x / self.vertex_distance).ceil() as i32).clamp(0, self.cells.x as i32);
        let z1 = ((min.y / self.vertex_distance).ceil() as i32).clamp(0, self.cells.y as i32);
        let x2 = ((max.x / self.vertex_distance).floor() as i32).clamp(0, self.cells.x as i32);
        let z2 = ((max.y / self.vertex_distance).floor() as i32).clamp(0, self.cells.y as i32);

        let first = self.world_height_at(min.x, min.y);
        let mut range = (first, first);
        let mut add = |height: f32| {
            range.0 = range.0.min(height);
            range.1 = range.1.max(height);
        };

        for z in z1..=z2 {
            for x in x1..=x2 {
                add(self.height_at(IVec2::new(x, z)));
            }
        }

        for z in z1..=z2 {
            let wz = z as f32 * self.vertex_distance;
            add(self.world_height_at(min.x, wz));
            add(self.world_height_at(max.x, wz));
        }

        for x in x1..=x2 {
            let wx = x as f32 * self.vertex_distance;
            add(self.world_height_at(wx, min.y));
            add(self.world_height_at(wx, max.y));
        }

        add(self.world_height_at(max.x, min.y));
        add(self.world_height_at(min.x, max.y));
        add(self.world_height_at(max.x, max.y));

        range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2x2 cells, heights rising along X.
    fn ramp() -> HeightMap {
        HeightMap::new(
            UVec2::new(2, 2),
            2.0,
            0.0,
            256.0,
            vec![
                0, 64, 128, //
                0, 64, 128, //
                0, 64, 128,
            ],
        )
    }

    #[test]
    fn value_to_height() {
        let map = HeightMap::new(UVec2::ONE, 1.0, -10.0, 10.0, vec![0; 4]);
        assert_eq!(map.value_to_height(0), -10.0);
        assert_eq!(map.value_to_height(128), 0.0);
    }

    #[test]
    fn queries_clamp_outside_the_map() {
        let map = ramp();
        assert_eq!(map.elevation_at(IVec2::new(-5, 1)), 0);
        assert_eq!(map.elevation_at(IVec2::new(50, 50)), 128);
        assert_eq!(map.height_at(IVec2::new(3, -1)), 128.0);
        assert_eq!(map.world_height_at(-100.0, 2.0), 0.0);
        assert_eq!(map.world_height_at(100.0, 100.0), 128.0);
    }

    #[test]
    fn world_height_interpolates() {
        let map = ramp();
        assert_eq!(map.world_height_at(1.0, 1.0), 32.0);
        assert_eq!(map.world_height_at(3.0, 0.0), 96.0);
        assert_eq!(map.world_height_at(4.0, 4.0), 128.0);
    }

    #[test]
    fn flat_map_normals_point_up() {
        let map = HeightMap::new(UVec2::new(3, 3), 1.0, 0.0, 1.0, vec![7; 16]);
        for z in 0..4 {
            for x in 0..4 {
                let normal = map.normal_at(IVec2::new(x, z));
                assert!((normal - Vec3::Y).length() < 1e-5);
            }
        }
    }

    #[test]
    fn slope_normal_leans_downhill() {
        let normal = ramp().normal_at(IVec2::new(1, 1));
        assert!(normal.x < 0.0);
        assert!(normal.y > 0.0);
        assert!(normal.z.abs() < 1e-5);
    }

    #[test]
    fn area_height_range_normalizes_rectangle() {
        let map = ramp();
        assert_eq!(
            map.area_height_range(Vec2::new(3.0, 4.0), Vec2::new(1.0, 0.0)),
            (32.0, 96.0)
        );
        assert_eq!(
            map.area_height_range(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0)),
            (0.0, 128.0)
        );
    }

    #[test]
    fn raw_file_must_cover_the_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("height.RAW");

        std::fs::write(&path, [1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        let map = HeightMap::load(&path, UVec2::new(2, 2), 1.0, 0.0, 256.0).unwrap();
        assert_eq!(map.elevation_at(IVec2::new(2, 1)), 6);

        std::fs::write(&path, [1, 2, 3]).unwrap();
        let err = HeightMap::load(&path, UVec2::new(2, 2), 1.0, 0.0, 256.0)
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn small_images_are_zero_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("height.png");

        let image = image::GrayImage::from_fn(2, 1, |x, _| image::Luma([100 + x as u8]));
        image.save(&path).unwrap();

        let map = HeightMap::load(&path, UVec2::new(2, 2), 1.0, 0.0, 256.0).unwrap();
        assert_eq!(map.elevations(), &[100, 101, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn color_images_use_luminance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("height.png");

        let image = image::RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgb([120, 120, 120])
            } else {
                image::Rgb([255, 0, 0])
            }
        });
        image.save(&path).unwrap();

        let map = HeightMap::load(&path, UVec2::new(1, 1), 1.0, 0.0, 256.0).unwrap();
        assert_eq!(map.elevations()[0], 120);
        // A full red channel is only a fraction of full brightness.
        assert!(map.elevations()[1] < 64);
    }
}
