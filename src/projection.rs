use crate::config::{FitMode, ViewportConfig};
use crate::types::Region;
use geo::algorithm::bounding_rect::BoundingRect;
use geo::{Coord, Rect};
use std::f64::consts::FRAC_PI_4;

/// Mercator blows up at the poles; clamp latitudes to the usual limit.
const MAX_LAT: f64 = 85.05113;

/// Derived projection state for one surface size. Recomputed on every resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    /// Projection center as (lon, lat).
    pub center: (f64, f64),
    pub scale: f64,
    pub translate: (f64, f64),
    pub width: u32,
    pub height: u32,
}

/// Recomputes projection parameters for a display surface size. Pure: calling
/// `resize` twice with the same dimensions yields the same parameters.
#[derive(Debug, Clone)]
pub struct Viewport {
    width: u32,
    height: u32,
    center: (f64, f64),
    scale: f64,
    fit: FitMode,
    /// Geographic bounds of all boundaries, used by the content-fit variant.
    content: Option<Rect<f64>>,
}

impl Viewport {
    pub fn new(config: &ViewportConfig, content: Option<Rect<f64>>) -> Self {
        Viewport {
            width: config.width,
            height: config.height,
            center: (config.center[0], config.center[1]),
            scale: config.scale,
            fit: config.fit,
            content,
        }
    }

    /// Parameters for the configured surface size.
    pub fn params(&self) -> ProjectionParams {
        self.resize(self.width, self.height)
    }

    /// Recompute projection parameters for a new surface size. In window mode
    /// the translation is the surface center; in content mode the surface
    /// height is derived from the content bounding box at the fixed width and
    /// the translation centers the content.
    pub fn resize(&self, width: u32, height: u32) -> ProjectionParams {
        let mut params = ProjectionParams {
            center: self.center,
            scale: self.scale,
            translate: (width as f64 / 2.0, height as f64 / 2.0),
            width,
            height,
        };

        if self.fit == FitMode::Content {
            if let Some(bbox) = self.content {
                let base = ProjectionParams {
                    translate: (0.0, 0.0),
                    ..params
                };
                // NW and SE corners in screen space
                let (x0, y0) = project(&base, bbox.min().x, bbox.max().y);
                let (x1, y1) = project(&base, bbox.max().x, bbox.min().y);
                let span_x = x1 - x0;
                let span_y = y1 - y0;

                if span_x > 0.0 && span_y > 0.0 {
                    let fitted = (width as f64 * span_y / span_x).ceil().max(1.0) as u32;
                    params.height = fitted;
                    params.translate = (
                        width as f64 / 2.0 - (x0 + x1) / 2.0,
                        fitted as f64 / 2.0 - (y0 + y1) / 2.0,
                    );
                }
            }
        }

        params
    }
}

/// Project (lon, lat) to screen coordinates, y growing downwards.
pub fn project(params: &ProjectionParams, lon: f64, lat: f64) -> (f64, f64) {
    let lambda = lon.to_radians();
    let phi = lat.clamp(-MAX_LAT, MAX_LAT).to_radians();
    let lambda0 = params.center.0.to_radians();
    let phi0 = params.center.1.clamp(-MAX_LAT, MAX_LAT).to_radians();

    let x = params.scale * (lambda - lambda0) + params.translate.0;
    let y = params.scale * (mercator_y(phi0) - mercator_y(phi)) + params.translate.1;
    (x, y)
}

fn mercator_y(phi: f64) -> f64 {
    (FRAC_PI_4 + phi / 2.0).tan().ln()
}

/// Merged geographic bounding box of all region boundaries.
pub fn content_bounds(regions: &[Region]) -> Option<Rect<f64>> {
    let mut bounds: Option<Rect<f64>> = None;
    for region in regions {
        let rect = match region.geometry.bounding_rect() {
            Some(r) => r,
            None => continue,
        };
        bounds = Some(match bounds {
            None => rect,
            Some(acc) => Rect::new(
                Coord {
                    x: acc.min().x.min(rect.min().x),
                    y: acc.min().y.min(rect.min().y),
                },
                Coord {
                    x: acc.max().x.max(rect.max().x),
                    y: acc.max().y.max(rect.max().y),
                },
            ),
        });
    }
    bounds
}
