use clap::{Args, Parser};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::render::RenderError;

/// Settings fixed for the lifetime of a renderer.
#[derive(Clone, Debug, PartialEq, Args, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RenderConfig {
    /// Hard limit on (splat, tile) intersections per frame. Anything past it is dropped.
    #[arg(long, help_heading = "Render options", default_value = "10000000")]
    pub max_instances: u32,
    /// Number of intersections to allocate room for up front. Grows by doubling when needed.
    #[arg(long, help_heading = "Render options", default_value = "65536")]
    pub initial_instance_capacity: u32,
    /// Splats closer to the camera than this are culled.
    #[arg(long, help_heading = "Render options", default_value = "0.01")]
    pub near_plane: f32,
    /// Use the multithreaded prefix sum and sort instead of the single threaded ones.
    #[arg(long, help_heading = "Render options", default_value = "false")]
    pub parallel_scan_sort: bool,
}

#[derive(Parser)]
struct RenderConfigParser {
    #[clap(flatten)]
    config: RenderConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfigParser::parse_from([""]).config
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.max_instances == 0 {
            return Err(RenderError::InvalidConfig("max-instances must be at least 1"));
        }
        if self.initial_instance_capacity == 0 {
            return Err(RenderError::InvalidConfig(
                "initial-instance-capacity must be at least 1",
            ));
        }
        if !(self.near_plane > 0.0 && self.near_plane.is_finite()) {
            return Err(RenderError::InvalidConfig(
                "near-plane must be a positive number",
            ));
        }
        Ok(())
    }
}

/// Settings that can change every frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderControls {
    /// Multiplier applied to every splat scale.
    pub scale_modifier: f32,
    /// Limit on the SH degree to evaluate. Clamped to the degree the scene has.
    pub sh_degree: Option<u32>,
    pub background: Vec3,
}

impl Default for RenderControls {
    fn default() -> Self {
        Self {
            scale_modifier: 1.0,
            sh_degree: None,
            background: Vec3::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_args() {
        let config = RenderConfig::default();
        assert_eq!(config.max_instances, crate::INTERSECTS_UPPER_BOUND);
        assert_eq!(config.near_plane, 0.01);
        assert!(!config.parallel_scan_sort);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_flags() {
        let config = RenderConfigParser::parse_from([
            "",
            "--max-instances",
            "500",
            "--parallel-scan-sort",
        ])
        .config;
        assert_eq!(config.max_instances, 500);
        assert!(config.parallel_scan_sort);
    }

    #[test]
    fn rejects_invalid() {
        let config = RenderConfig {
            near_plane: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RenderError::InvalidConfig(_))
        ));
    }
}
