use crate::types::Rgb;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// The pastel purple ramp of the default map, lightest to darkest.
pub const PASTEL_PURPLES: [Rgb; 9] = [
    Rgb::new(0xE0, 0xD4, 0xF3),
    Rgb::new(0xD0, 0xB0, 0xE4),
    Rgb::new(0xC2, 0x8F, 0xDE),
    Rgb::new(0xA8, 0x75, 0xD1),
    Rgb::new(0x9A, 0x62, 0xC8),
    Rgb::new(0x8C, 0x4F, 0xBA),
    Rgb::new(0x7E, 0x3C, 0xA7),
    Rgb::new(0x6E, 0x28, 0x94),
    Rgb::new(0x5F, 0x15, 0x7C),
];

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub boundaries: PathBuf,
    pub population_csv: PathBuf,
    /// GeoJSON feature property carrying the subzone name. Must identify the
    /// same regions the population table names.
    #[serde(default = "default_name_property")]
    pub name_property: String,
    #[serde(default = "default_region_column")]
    pub region_column: String,
    #[serde(default = "default_population_column")]
    pub population_column: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ScaleConfig {
    /// Equal-width buckets over [0, max observed population], one color each.
    Quantized {
        #[serde(default = "default_palette")]
        palette: Vec<Rgb>,
    },
    /// Explicit breakpoints with componentwise interpolation between them.
    Linear { stops: Vec<ScaleStop> },
}

impl Default for ScaleConfig {
    fn default() -> Self {
        ScaleConfig::Quantized {
            palette: default_palette(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScaleStop {
    pub value: f64,
    pub color: Rgb,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
    /// Projection center as [lon, lat].
    pub center: [f64; 2],
    pub scale: f64,
    pub fit: FitMode,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        ViewportConfig {
            width: 1280,
            height: 800,
            // Singapore
            center: [103.8198, 1.3521],
            scale: 120_000.0,
            fit: FitMode::Window,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Surface dimensions are taken as given; content is centered in them.
    Window,
    /// Surface height is derived from the content bounding box at the fixed width.
    Content,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub image: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

fn default_name_property() -> String {
    "subzone".to_string()
}

fn default_region_column() -> String {
    "subzone".to_string()
}

fn default_population_column() -> String {
    "population".to_string()
}

fn default_palette() -> Vec<Rgb> {
    PASTEL_PURPLES.to_vec()
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
