use std::path::PathBuf;

use clap::Parser;
use glam::{Quat, UVec2, Vec3};
use lod_terrain::engine::camera::Camera;
use lod_terrain::engine::math::Ray;
use lod_terrain::terrain::{Terrain, TerrainPreview, level_range};
use tracing::{error, info};

#[derive(clap::Parser)]
struct Opts {
    /// Path to the terrain config file.
    config: PathBuf,

    /// Cast a ray against the terrain: origin x y z, then direction x y z.
    #[arg(long, num_args = 6, value_names = ["OX", "OY", "OZ", "DX", "DY", "DZ"], allow_negative_numbers = true)]
    ray: Option<Vec<f32>>,

    /// Maximum ray parameter for --ray.
    #[arg(long, default_value_t = f32::MAX)]
    max_t: f32,

    /// Render the visible patches offscreen on a headless GPU device.
    #[arg(long)]
    gpu: bool,

    /// Size of the offscreen image for --gpu.
    #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"], default_values_t = [1280, 720])]
    size: Vec<u32>,
}

fn main() {
    tracing_subscriber::fmt().init();

    let opts = Opts::parse();

    if let Err(err) = run(&opts) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(opts: &Opts) -> Result<(), Box<dyn std::error::Error>> {
    let terrain = Terrain::from_file(&opts.config)?;

    let cells = terrain.cells();
    let bounds = terrain.bounding_box();
    println!("terrain:     {}", terrain.name());
    println!("cells:       {} x {}", cells.x, cells.y);
    println!("extent:      {} .. {}", bounds.min, bounds.max);
    println!(
        "patches:     {} ({} x {}){}",
        terrain.patch_count(),
        terrain.patch_grid().x,
        terrain.patch_grid().y,
        if terrain.loaded_from_cache() {
            ", from cache"
        } else {
            ""
        }
    );
    println!(
        "forms:       {} ({} descriptor items)",
        terrain.forms().form_count(),
        terrain.forms().items().len()
    );

    // Look at the middle of the terrain from above its south edge.
    let center = bounds.center();
    let far = (bounds.max - bounds.min).length();
    let mut camera = Camera::new(
        Vec3::new(center.x, bounds.max.y + far * 0.25, bounds.max.z),
        Quat::IDENTITY,
        std::f32::consts::FRAC_PI_3,
        opts.size[0].max(1) as f32 / opts.size[1].max(1) as f32,
        1.0,
        far,
    );
    camera.look_at(center);

    let visible = terrain.visible_patches(&camera.frustum(), &camera.frustum_bounding_box());
    let triangles: usize = visible
        .iter()
        .map(|&index| level_range(terrain.patch_level(index, camera.position(), far)).len() / 3)
        .sum();
    println!("visible:     {} patches, {} triangles", visible.len(), triangles);

    if let Some(ray) = &opts.ray {
        let ray = Ray::new(
            Vec3::new(ray[0], ray[1], ray[2]),
            Vec3::new(ray[3], ray[4], ray[5]),
        );
        match terrain.ray_collision(&ray, opts.max_t) {
            Some(t) => println!("ray:         hit at t = {t} ({})", ray.at(t)),
            None => println!("ray:         no hit"),
        }
    }

    if opts.gpu {
        let mut renderer = renderer::Renderer::headless()?;
        let mut geometry = terrain.create_geometry(&mut renderer)?;
        let preview = TerrainPreview::new(&mut renderer, UVec2::new(opts.size[0], opts.size[1]))?;

        let stats = preview.render(&renderer, &terrain, &mut geometry, &camera, &visible)?;
        println!(
            "gpu:         {} patches, {} triangles in {} batches",
            stats.patches, stats.triangles, stats.batches
        );
        info!("Rendered {} visible patches offscreen", stats.patches);

        preview.destroy(&mut renderer);
        geometry.destroy(&mut renderer);
    }

    Ok(())
}
