use crate::config::ScaleConfig;
use crate::data::normalize_key;
use crate::types::{PopulationIndex, Region, Rgb};
use anyhow::{anyhow, Result};
use rayon::prelude::*;
use serde::Serialize;

/// Population -> color. Immutable once constructed, total over [0, +inf):
/// values above the domain clamp to the darkest color, values below to the lightest.
#[derive(Debug, Clone)]
pub enum ColorScale {
    /// Equal-width buckets over [0, max], one discrete color per bucket.
    Quantized { max: f64, colors: Vec<Rgb> },
    /// Strictly increasing breakpoints with componentwise interpolation between them.
    Linear { stops: Vec<(f64, Rgb)> },
}

/// One row of the legend, lightest first.
#[derive(Debug, Clone, Serialize)]
pub struct LegendEntry {
    pub lower: f64,
    pub upper: f64,
    pub color: Rgb,
}

impl ColorScale {
    /// Build the configured scale. The quantized domain is [0, max observed
    /// population], taken from the full index at construction time.
    pub fn from_config(config: &ScaleConfig, index: &PopulationIndex) -> Result<Self> {
        match config {
            ScaleConfig::Quantized { palette } => {
                if palette.is_empty() {
                    return Err(anyhow!("Quantized scale needs at least one color"));
                }
                let max = index.values().max().copied().unwrap_or(0) as f64;
                Ok(ColorScale::Quantized {
                    max,
                    colors: palette.clone(),
                })
            }
            ScaleConfig::Linear { stops } => {
                if stops.is_empty() {
                    return Err(anyhow!("Linear scale needs at least one stop"));
                }
                for pair in stops.windows(2) {
                    if pair[1].value <= pair[0].value {
                        return Err(anyhow!(
                            "Linear scale stops must be strictly increasing: {} follows {}",
                            pair[1].value,
                            pair[0].value
                        ));
                    }
                }
                Ok(ColorScale::Linear {
                    stops: stops.iter().map(|s| (s.value, s.color)).collect(),
                })
            }
        }
    }

    pub fn color(&self, population: u64) -> Rgb {
        let p = population as f64;
        match self {
            ColorScale::Quantized { max, colors } => {
                let k = colors.len();
                if p <= 0.0 || *max <= 0.0 {
                    return colors[0];
                }
                if p >= *max {
                    return colors[k - 1];
                }
                // Boundary values belong to the lower bucket, hence ceil
                // rather than floor; p > 0 keeps the index in range.
                let width = max / k as f64;
                let idx = (p / width).ceil() as usize - 1;
                colors[idx.min(k - 1)]
            }
            ColorScale::Linear { stops } => {
                let first = stops[0];
                let last = stops[stops.len() - 1];
                if p <= first.0 {
                    return first.1;
                }
                if p >= last.0 {
                    return last.1;
                }
                for pair in stops.windows(2) {
                    let (lo, lo_color) = pair[0];
                    let (hi, hi_color) = pair[1];
                    if p <= hi {
                        let t = (p - lo) / (hi - lo);
                        return lo_color.lerp(hi_color, t);
                    }
                }
                last.1
            }
        }
    }

    /// Bucket ranges and colors for legend drawing, lightest first.
    pub fn legend_entries(&self) -> Vec<LegendEntry> {
        match self {
            ColorScale::Quantized { max, colors } => {
                let width = max / colors.len() as f64;
                colors
                    .iter()
                    .enumerate()
                    .map(|(i, &color)| LegendEntry {
                        lower: i as f64 * width,
                        upper: (i + 1) as f64 * width,
                        color,
                    })
                    .collect()
            }
            ColorScale::Linear { stops } => stops
                .iter()
                .enumerate()
                .map(|(i, &(value, color))| LegendEntry {
                    lower: value,
                    upper: stops.get(i + 1).map(|s| s.0).unwrap_or(value),
                    color,
                })
                .collect(),
        }
    }
}

/// Resolve a raw region key to a display color. Never fails: an absent key is
/// classified exactly like population 0.
pub fn color_for(index: &PopulationIndex, raw_key: &str, scale: &ColorScale) -> Rgb {
    let population = index.get(&normalize_key(raw_key)).copied().unwrap_or(0);
    scale.color(population)
}

/// Compute the fill color of every joined region.
pub fn shade_regions(regions: &[Region], scale: &ColorScale) -> Vec<Rgb> {
    regions
        .par_iter()
        .map(|region| scale.color(region.population))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScaleStop;
    use crate::data::build_index;
    use crate::data::PopulationRecord;
    use geo::{LineString, MultiPolygon, Polygon};

    const WHITE: Rgb = Rgb::new(255, 255, 255);
    const BLACK: Rgb = Rgb::new(0, 0, 0);

    fn three_bucket_scale(max: f64) -> ColorScale {
        ColorScale::Quantized {
            max,
            colors: vec![Rgb::new(10, 10, 10), Rgb::new(20, 20, 20), Rgb::new(30, 30, 30)],
        }
    }

    fn white_to_black() -> ColorScale {
        ColorScale::Linear {
            stops: vec![(0.0, WHITE), (100_000.0, BLACK)],
        }
    }

    fn index_of(rows: &[(&str, u64)]) -> PopulationIndex {
        let records: Vec<PopulationRecord> = rows
            .iter()
            .map(|&(region, population)| PopulationRecord {
                region: region.to_string(),
                population,
            })
            .collect();
        build_index(&records)
    }

    #[test]
    fn test_quantized_buckets_are_monotonic() {
        let scale = three_bucket_scale(90_000.0);
        let mut last = scale.color(0).r;
        for p in (0..=90_000).step_by(1000) {
            let c = scale.color(p).r;
            assert!(c >= last, "darkness decreased at population {}", p);
            last = c;
        }
    }

    #[test]
    fn test_quantized_max_gets_last_color() {
        let scale = three_bucket_scale(90_000.0);
        assert_eq!(scale.color(90_000), Rgb::new(30, 30, 30));
        // Above the domain clamps to the last color too
        assert_eq!(scale.color(500_000), Rgb::new(30, 30, 30));
    }

    #[test]
    fn test_quantized_boundary_belongs_to_lower_bucket() {
        // Domain [0, 90000], three buckets of width 30000: a population sitting
        // exactly on a boundary takes the earlier bucket's color.
        let scale = three_bucket_scale(90_000.0);
        assert_eq!(scale.color(30_000), Rgb::new(10, 10, 10));
        assert_eq!(scale.color(30_001), Rgb::new(20, 20, 20));
        assert_eq!(scale.color(60_000), Rgb::new(20, 20, 20));
        assert_eq!(scale.color(60_001), Rgb::new(30, 30, 30));
    }

    #[test]
    fn test_quantized_zero_and_degenerate_domain() {
        let scale = three_bucket_scale(90_000.0);
        assert_eq!(scale.color(0), Rgb::new(10, 10, 10));

        let empty = three_bucket_scale(0.0);
        assert_eq!(empty.color(0), Rgb::new(10, 10, 10));
        assert_eq!(empty.color(12_345), Rgb::new(10, 10, 10));
    }

    #[test]
    fn test_linear_midpoint_is_midpoint_gray() {
        let scale = white_to_black();
        assert_eq!(scale.color(50_000), Rgb::new(128, 128, 128));
    }

    #[test]
    fn test_linear_clamps_both_ends() {
        let scale = ColorScale::Linear {
            stops: vec![(10_000.0, WHITE), (100_000.0, BLACK)],
        };
        assert_eq!(scale.color(0), WHITE);
        assert_eq!(scale.color(10_000), WHITE);
        assert_eq!(scale.color(100_000), BLACK);
        assert_eq!(scale.color(1_000_000), BLACK);
    }

    #[test]
    fn test_linear_three_stops() {
        let red = Rgb::new(200, 0, 0);
        let scale = ColorScale::Linear {
            stops: vec![(0.0, WHITE), (100.0, red), (300.0, BLACK)],
        };
        assert_eq!(scale.color(100), red);
        // Halfway between the second and third stop
        assert_eq!(scale.color(200), Rgb::new(100, 0, 0));
    }

    #[test]
    fn test_from_config_rejects_unordered_stops() {
        let config = ScaleConfig::Linear {
            stops: vec![
                ScaleStop { value: 100.0, color: WHITE },
                ScaleStop { value: 100.0, color: BLACK },
            ],
        };
        assert!(ColorScale::from_config(&config, &PopulationIndex::new()).is_err());
    }

    #[test]
    fn test_from_config_rejects_empty_palette() {
        let config = ScaleConfig::Quantized { palette: vec![] };
        assert!(ColorScale::from_config(&config, &PopulationIndex::new()).is_err());
    }

    #[test]
    fn test_from_config_takes_domain_from_index() {
        let index = index_of(&[("Downtown", 50_000), ("Bedok", 90_000)]);
        let config = ScaleConfig::Quantized {
            palette: vec![Rgb::new(10, 10, 10), Rgb::new(20, 20, 20), Rgb::new(30, 30, 30)],
        };
        let scale = ColorScale::from_config(&config, &index).unwrap();
        match scale {
            ColorScale::Quantized { max, .. } => assert_eq!(max, 90_000.0),
            _ => panic!("expected quantized scale"),
        }
    }

    #[test]
    fn test_color_for_absent_key_is_population_zero() {
        let index = index_of(&[("Downtown", 50_000)]);
        let scale = white_to_black();
        assert_eq!(
            color_for(&index, "unknown-region", &scale),
            scale.color(0)
        );
    }

    #[test]
    fn test_end_to_end_join_and_classify() {
        // Table says "downtown"; the lookup comes in upper-cased from the
        // boundary file and must still hit via the shared normalization.
        let index = index_of(&[("downtown", 50_000)]);
        let scale = white_to_black();

        assert_eq!(color_for(&index, "DOWNTOWN", &scale), Rgb::new(128, 128, 128));
        assert_eq!(color_for(&index, "unknown-region", &scale), WHITE);
    }

    #[test]
    fn test_shade_regions_matches_scale() {
        let square = MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]),
            vec![],
        )]);
        let regions: Vec<Region> = [("A", 0u64), ("B", 50_000), ("C", 100_000)]
            .iter()
            .map(|&(name, population)| Region {
                name: name.to_string(),
                key: normalize_key(name),
                geometry: square.clone(),
                population,
                matched: true,
            })
            .collect();

        let scale = white_to_black();
        let fills = shade_regions(&regions, &scale);
        assert_eq!(fills.len(), 3);
        assert_eq!(fills[0], WHITE);
        assert_eq!(fills[1], Rgb::new(128, 128, 128));
        assert_eq!(fills[2], BLACK);
    }

    #[test]
    fn test_legend_entries_cover_the_domain() {
        let scale = three_bucket_scale(90_000.0);
        let legend = scale.legend_entries();
        assert_eq!(legend.len(), 3);
        assert_eq!(legend[0].lower, 0.0);
        assert_eq!(legend[0].upper, 30_000.0);
        assert_eq!(legend[2].upper, 90_000.0);
        assert_eq!(legend[2].color, Rgb::new(30, 30, 30));
    }
}
