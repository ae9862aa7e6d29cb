use anyhow::{anyhow, Error, Result};
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Normalized region key -> population count. Built once per load, read-only after.
pub type PopulationIndex = HashMap<String, u64>;

/// A boundary feature as it comes out of the GeoJSON file, before the join.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// A subzone boundary joined with its resolved population.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    /// Normalized join key, shared with the population index.
    pub key: String,
    pub geometry: MultiPolygon<f64>,
    pub population: u64,
    /// False when the key was absent from the population table (population defaults to 0).
    pub matched: bool,
}

/// Hover payload: what a front-end shows when the pointer rests on a subzone.
#[derive(Debug, Clone, Serialize)]
pub struct RegionInfo {
    pub name: String,
    pub population: u64,
}

/// 8-bit sRGB color, configured as "#RRGGBB".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    pub fn parse_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!("Expected color as #RRGGBB, got '{}'", hex));
        }
        Ok(Rgb {
            r: u8::from_str_radix(&digits[0..2], 16)?,
            g: u8::from_str_radix(&digits[2..4], 16)?,
            b: u8::from_str_radix(&digits[4..6], 16)?,
        })
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Componentwise interpolation towards `other`, t in [0, 1].
    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + t * (b as f64 - a as f64)).round() as u8;
        Rgb {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }
}

impl TryFrom<String> for Rgb {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Rgb::parse_hex(&value)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

/// Everything the renderer and the server need, constructed once at startup and
/// passed around explicitly instead of living in module-level singletons.
pub struct MapContext {
    pub regions: Vec<Region>,
    /// Fill color per region, parallel to `regions`.
    pub fills: Vec<Rgb>,
    pub index: PopulationIndex,
    pub scale: crate::processing::ColorScale,
    pub viewport: crate::projection::Viewport,
    key_lookup: HashMap<String, usize>,
}

impl MapContext {
    pub fn new(
        regions: Vec<Region>,
        fills: Vec<Rgb>,
        index: PopulationIndex,
        scale: crate::processing::ColorScale,
        viewport: crate::projection::Viewport,
    ) -> Self {
        let key_lookup = regions
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key.clone(), i))
            .collect();
        MapContext {
            regions,
            fills,
            index,
            scale,
            viewport,
            key_lookup,
        }
    }

    /// Pure hover query: resolve a raw region key to its display info.
    /// Returns None for keys known to neither dataset.
    pub fn describe_region(&self, raw_key: &str) -> Option<RegionInfo> {
        let key = crate::data::normalize_key(raw_key);
        if let Some(&i) = self.key_lookup.get(&key) {
            let region = &self.regions[i];
            return Some(RegionInfo {
                name: region.name.clone(),
                population: region.population,
            });
        }
        // A table row can exist without a drawn boundary; still answer for it.
        self.index.get(&key).map(|&population| RegionInfo {
            name: raw_key.trim().to_string(),
            population,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        let c = Rgb::parse_hex("#E0D4F3").unwrap();
        assert_eq!(c, Rgb::new(0xE0, 0xD4, 0xF3));
        // Leading '#' is optional
        assert_eq!(Rgb::parse_hex("ffffff").unwrap(), Rgb::new(255, 255, 255));
    }

    #[test]
    fn test_parse_hex_rejects_garbage() {
        assert!(Rgb::parse_hex("#fff").is_err());
        assert!(Rgb::parse_hex("#GGGGGG").is_err());
        assert!(Rgb::parse_hex("").is_err());
    }

    #[test]
    fn test_hex_round_trip() {
        let c = Rgb::new(0x5F, 0x15, 0x7C);
        assert_eq!(Rgb::parse_hex(&c.to_hex()).unwrap(), c);
    }

    #[test]
    fn test_lerp_midpoint() {
        let white = Rgb::new(255, 255, 255);
        let black = Rgb::new(0, 0, 0);
        assert_eq!(white.lerp(black, 0.5), Rgb::new(128, 128, 128));
        assert_eq!(white.lerp(black, 0.0), white);
        assert_eq!(white.lerp(black, 1.0), black);
    }

    #[test]
    fn test_lerp_clamps_t() {
        let a = Rgb::new(10, 20, 30);
        let b = Rgb::new(200, 100, 50);
        assert_eq!(a.lerp(b, -1.0), a);
        assert_eq!(a.lerp(b, 2.0), b);
    }

    fn context_with_one_region() -> MapContext {
        use crate::config::ViewportConfig;
        use crate::processing::ColorScale;
        use crate::projection::Viewport;
        use geo::{LineString, Polygon};

        let geometry = MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]),
            vec![],
        )]);
        let mut index = PopulationIndex::new();
        index.insert("DOWNTOWN".to_string(), 50_000);
        index.insert("OFFSHORE ISLANDS".to_string(), 30);

        MapContext::new(
            vec![Region {
                name: "Downtown".to_string(),
                key: "DOWNTOWN".to_string(),
                geometry,
                population: 50_000,
                matched: true,
            }],
            vec![Rgb::new(95, 21, 124)],
            index,
            ColorScale::Quantized {
                max: 50_000.0,
                colors: vec![Rgb::new(224, 212, 243)],
            },
            Viewport::new(&ViewportConfig::default(), None),
        )
    }

    #[test]
    fn test_describe_region_by_boundary() {
        let ctx = context_with_one_region();
        let info = ctx.describe_region("downtown").unwrap();
        assert_eq!(info.name, "Downtown");
        assert_eq!(info.population, 50_000);
    }

    #[test]
    fn test_describe_region_falls_back_to_table() {
        // Present in the population table but has no drawn boundary
        let ctx = context_with_one_region();
        let info = ctx.describe_region("Offshore Islands").unwrap();
        assert_eq!(info.population, 30);

        assert!(ctx.describe_region("unknown-region").is_none());
    }
}
