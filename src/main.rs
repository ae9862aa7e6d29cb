pub mod config;
pub mod data;
pub mod processing;
pub mod projection;
pub mod render;
pub mod server;
pub mod types;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the choropleth map to a PNG
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the map image and the region lookup API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            println!("Generating map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let ctx = build_context(&app_config).await?;

            let params = ctx.viewport.params();
            let img = render::render_map(&ctx, &params);
            render::save_png(&img, &app_config.output.image)?;

            println!(
                "Wrote {:?} ({}x{})",
                app_config.output.image, params.width, params.height
            );
        }
        Commands::Serve { config } => {
            println!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let ctx = build_context(&app_config).await?;

            server::start_server(app_config, ctx).await?;
        }
    }

    Ok(())
}

/// The full pipeline: load both inputs, build the population index, join,
/// classify, and size the viewport.
async fn build_context(config: &config::AppConfig) -> anyhow::Result<types::MapContext> {
    // 1. Load Data (both inputs must arrive before anything renders)
    let (boundaries, records) = data::load_inputs(config).await?;

    // 2. Build Population Index
    let index = data::build_index(&records);

    // 3. Join boundaries with populations
    let regions = data::join_regions(boundaries, &index);

    // 4. Classify
    let scale = processing::ColorScale::from_config(&config.scale, &index)?;
    let fills = processing::shade_regions(&regions, &scale);

    // 5. Viewport
    let bounds = projection::content_bounds(&regions);
    let viewport = projection::Viewport::new(&config.viewport, bounds);

    Ok(types::MapContext::new(regions, fills, index, scale, viewport))
}
