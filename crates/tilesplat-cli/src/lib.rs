use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use glam::{UVec2, Vec3};
use tilesplat_render::{
    Camera, GaussianStore, RenderConfig, RenderControls, RenderStats, SplatRenderer,
};

fn parse_vec3(s: &str) -> Result<Vec3, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Invalid number in '{s}': {e}"))?;
    match parts[..] {
        [x, y, z] => Ok(glam::vec3(x, y, z)),
        _ => Err(format!("Expected three comma separated numbers, got '{s}'")),
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Tilesplat - render gaussian splat ply files on the CPU"
)]
pub struct Cli {
    /// Ply file to render.
    #[arg(value_name = "PLY")]
    pub source: PathBuf,
    /// Where to write the rendered png.
    #[arg(long, short, default_value = "render.png")]
    pub output: PathBuf,
    /// Optionally write frame statistics as json.
    #[arg(long)]
    pub stats_json: Option<PathBuf>,
    #[arg(long, default_value = "1280")]
    pub width: u32,
    #[arg(long, default_value = "720")]
    pub height: u32,
    /// Vertical field of view in degrees.
    #[arg(long, default_value = "50")]
    pub fov_y: f64,
    /// Camera position as x,y,z. Defaults to a point framing the whole scene.
    #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
    pub camera_position: Option<Vec3>,
    /// Point to look at as x,y,z. Defaults to the scene center.
    #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
    pub look_at: Option<Vec3>,
    /// World up direction as x,y,z. Ply scenes are usually stored y-down.
    #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true, default_value = "0,-1,0")]
    pub up: Vec3,
    /// Multiplier for every splat scale.
    #[arg(long, default_value = "1.0")]
    pub scale_modifier: f32,
    /// Highest SH degree to evaluate. Defaults to everything the scene has.
    #[arg(long)]
    pub sh_degree: Option<u32>,
    /// Background color as r,g,b.
    #[arg(long, value_parser = parse_vec3, default_value = "0,0,0")]
    pub background: Vec3,
    /// Keep the alpha channel in the png instead of writing opaque rgb.
    #[arg(long)]
    pub alpha: bool,
    #[clap(flatten)]
    pub render: RenderConfig,
}

impl Cli {
    pub fn img_size(&self) -> UVec2 {
        glam::uvec2(self.width, self.height)
    }

    pub fn controls(&self) -> RenderControls {
        RenderControls {
            scale_modifier: self.scale_modifier,
            sh_degree: self.sh_degree,
            background: self.background,
        }
    }

    /// Camera from the command line, filling in whatever wasn't given from the scene bounds.
    pub fn camera(&self, scene: &GaussianStore) -> Camera {
        let (center, extent) = scene_bounds(scene);
        let target = self.look_at.unwrap_or(center);
        let position = self
            .camera_position
            .unwrap_or_else(|| target - Vec3::Z * extent.max(1.0) * 2.0);
        Camera::look_at(position, target, self.up, self.fov_y.to_radians())
    }
}

/// Center and radius of the splat means.
fn scene_bounds(scene: &GaussianStore) -> (Vec3, f32) {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for g in scene.gaussians() {
        min = min.min(g.mean);
        max = max.max(g.mean);
    }
    if scene.is_empty() {
        return (Vec3::ZERO, 1.0);
    }
    ((min + max) * 0.5, (max - min).length() * 0.5)
}

/// Load the scene, render a single frame and write it out.
pub fn run(cli: &Cli) -> anyhow::Result<RenderStats> {
    let scene = tilesplat_serde::load_splats_from_path(&cli.source)
        .with_context(|| format!("Failed to load {}", cli.source.display()))?;

    let camera = cli.camera(&scene);
    log::info!(
        "Camera at {} looking at {}",
        camera.position,
        cli.look_at.unwrap_or_else(|| scene_bounds(&scene).0)
    );

    let mut renderer = SplatRenderer::new(cli.render.clone(), cli.img_size())
        .context("Failed to create renderer")?;
    renderer.load_scene(scene).context("Failed to load scene")?;
    let frame = renderer
        .render(&camera, &cli.controls())
        .context("Failed to render frame")?;

    let size = frame.size();
    let rgba = frame.to_rgba8();
    let saved = if cli.alpha {
        image::RgbaImage::from_raw(size.x, size.y, rgba)
            .context("Image buffer has the wrong size")?
            .save(&cli.output)
    } else {
        let rgb = rgba
            .chunks_exact(4)
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect();
        image::RgbImage::from_raw(size.x, size.y, rgb)
            .context("Image buffer has the wrong size")?
            .save(&cli.output)
    };
    saved.with_context(|| format!("Failed to write {}", cli.output.display()))?;

    let stats = renderer.stats();
    log::info!(
        "Rendered {} splats ({} intersections) in {:.2}ms to {}",
        stats.num_visible,
        stats.visible_instances,
        stats.frame_time_ms,
        cli.output.display()
    );

    if let Some(path) = &cli.stats_json {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &stats).context("Failed to write stats")?;
    }

    Ok(stats)
}
