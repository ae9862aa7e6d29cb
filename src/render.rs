use crate::processing::LegendEntry;
use crate::projection::{project, ProjectionParams};
use crate::types::{MapContext, Rgb};
use anyhow::{Context, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::Path;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
/// Subzone outlines, visible between adjacent fills.
const STROKE: Rgba<u8> = Rgba([255, 255, 255, 255]);

const LEGEND_ORIGIN: (u32, u32) = (20, 20);
const LEGEND_SWATCH: (u32, u32) = (30, 18);

/// Rasterize every region with its fill color under the given projection
/// parameters, then overlay the legend swatches.
pub fn render_map(ctx: &MapContext, params: &ProjectionParams) -> RgbaImage {
    let mut img = ImageBuffer::from_pixel(params.width, params.height, BACKGROUND);

    // Projecting the boundary paths is the bulk of a redraw; fan it out.
    let projected: Vec<(Vec<Vec<(f64, f64)>>, Rgba<u8>)> = ctx
        .regions
        .par_iter()
        .zip(ctx.fills.par_iter())
        .flat_map(|(region, fill)| {
            region
                .geometry
                .iter()
                .map(|polygon| {
                    let mut rings = Vec::with_capacity(1 + polygon.interiors().len());
                    rings.push(ring_to_screen(polygon.exterior(), params));
                    for interior in polygon.interiors() {
                        rings.push(ring_to_screen(interior, params));
                    }
                    (rings, pixel(*fill))
                })
                .collect::<Vec<_>>()
        })
        .collect();

    for (rings, fill) in &projected {
        fill_rings(&mut img, rings, *fill);
    }
    for (rings, _) in &projected {
        for ring in rings {
            stroke_ring(&mut img, ring, STROKE);
        }
    }

    draw_legend(&mut img, &ctx.scale.legend_entries());
    img
}

pub fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
    }
    img.save(path)
        .with_context(|| format!("Failed to save map image: {:?}", path))?;
    Ok(())
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(buf)
}

fn pixel(color: Rgb) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, 255])
}

fn ring_to_screen(ring: &geo::LineString<f64>, params: &ProjectionParams) -> Vec<(f64, f64)> {
    ring.coords().map(|c| project(params, c.x, c.y)).collect()
}

/// Even-odd scanline fill over the exterior and interior rings of one polygon.
/// Interior rings drop out of the fill because they flip the crossing parity.
fn fill_rings(img: &mut RgbaImage, rings: &[Vec<(f64, f64)>], color: Rgba<u8>) {
    let width = img.width() as i64;
    let height = img.height() as i64;

    let ys = rings.iter().flatten().map(|p| p.1);
    let min_y = ys.clone().fold(f64::INFINITY, f64::min);
    let max_y = ys.fold(f64::NEG_INFINITY, f64::max);
    if !min_y.is_finite() || !max_y.is_finite() {
        return;
    }
    let min_y = (min_y.floor() as i64).max(0);
    let max_y = (max_y.ceil() as i64).min(height - 1);

    for y in min_y..=max_y {
        let scan = y as f64 + 0.5;
        let mut crossings = Vec::new();

        for ring in rings {
            if ring.len() < 3 {
                continue;
            }
            for i in 0..ring.len() {
                let (x1, y1) = ring[i];
                let (x2, y2) = ring[(i + 1) % ring.len()];
                if (y1 <= scan && y2 > scan) || (y2 <= scan && y1 > scan) {
                    let t = (scan - y1) / (y2 - y1);
                    crossings.push(x1 + t * (x2 - x1));
                }
            }
        }

        crossings.sort_by(f64::total_cmp);

        for pair in crossings.chunks(2) {
            if pair.len() < 2 {
                continue;
            }
            let x_start = (pair[0].round() as i64).max(0);
            let x_end = (pair[1].round() as i64).min(width - 1);
            for x in x_start..=x_end {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

fn stroke_ring(img: &mut RgbaImage, ring: &[(f64, f64)], color: Rgba<u8>) {
    for i in 0..ring.len() {
        let (x1, y1) = ring[i];
        let (x2, y2) = ring[(i + 1) % ring.len()];
        draw_line(img, x1, y1, x2, y2, color);
    }
}

fn draw_line(img: &mut RgbaImage, x1: f64, y1: f64, x2: f64, y2: f64, color: Rgba<u8>) {
    let steps = (x2 - x1).abs().max((y2 - y1).abs()).ceil().max(1.0);
    let width = img.width() as i64;
    let height = img.height() as i64;

    for s in 0..=steps as u32 {
        let t = s as f64 / steps;
        let x = (x1 + t * (x2 - x1)).round() as i64;
        let y = (y1 + t * (y2 - y1)).round() as i64;
        if x >= 0 && x < width && y >= 0 && y < height {
            img.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Vertical swatch strip, lightest bucket on top. Labels stay with the
/// front-end, which gets the same entries from the legend endpoint.
fn draw_legend(img: &mut RgbaImage, entries: &[LegendEntry]) {
    let (x0, y0) = LEGEND_ORIGIN;
    let (w, h) = LEGEND_SWATCH;

    for (i, entry) in entries.iter().enumerate() {
        let top = y0 + i as u32 * h;
        for dy in 0..h {
            for dx in 0..w {
                let (x, y) = (x0 + dx, top + dy);
                if x < img.width() && y < img.height() {
                    img.put_pixel(x, y, pixel(entry.color));
                }
            }
        }
    }
}
