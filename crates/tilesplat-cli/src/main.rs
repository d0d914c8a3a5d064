use clap::Parser;
use tilesplat_cli::{Cli, run};

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .target(env_logger::Target::Stdout)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let stats = run(&cli)?;

    if stats.clamped {
        log::warn!(
            "Frame was clamped: {} of {} intersections rendered",
            stats.visible_instances,
            stats.required_instances
        );
    }
    Ok(())
}
