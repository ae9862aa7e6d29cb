use crate::config::AppConfig;
use crate::processing::LegendEntry;
use crate::render;
use crate::types::{MapContext, Region, RegionInfo};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{Point, Rect};
use rstar::{RTree, RTreeObject, AABB};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

/// Cap for on-demand renders; anything larger is a client mistake.
const MAX_SURFACE: u32 = 4096;

// Wrapper for RTree indexing
pub struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct AppState {
    pub ctx: MapContext,
    pub tree: RTree<RegionEnvelope>,
}

#[derive(Deserialize)]
pub struct LocateParams {
    lon: f64,
    lat: f64,
}

#[derive(Deserialize)]
pub struct SizeParams {
    width: Option<u32>,
    height: Option<u32>,
}

pub async fn start_server(config: AppConfig, ctx: MapContext) -> Result<()> {
    println!("Building spatial index for API...");
    let tree = build_tree(&ctx.regions);
    println!("Spatial index built.");

    let state = Arc::new(AppState { ctx, tree });

    let port = config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    println!("Starting server on http://{}", addr);

    let app = Router::new()
        .route("/api/region", get(locate_handler))
        .route("/api/region/:name", get(describe_handler))
        .route("/api/legend", get(legend_handler))
        .route("/map.png", get(map_handler))
        .fallback_service(ServeDir::new("."))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_tree(regions: &[Region]) -> RTree<RegionEnvelope> {
    let items: Vec<RegionEnvelope> = regions
        .iter()
        .enumerate()
        .map(|(i, region)| {
            let rect = region.geometry.bounding_rect().unwrap_or(Rect::new(
                geo::Coord { x: 0.0, y: 0.0 },
                geo::Coord { x: 0.0, y: 0.0 },
            ));
            RegionEnvelope {
                index: i,
                aabb: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            }
        })
        .collect();

    RTree::bulk_load(items)
}

/// Point-in-subzone lookup: envelope candidates first, exact containment second.
fn locate(regions: &[Region], tree: &RTree<RegionEnvelope>, lon: f64, lat: f64) -> Option<RegionInfo> {
    let point = Point::new(lon, lat);
    let envelope = AABB::from_point([lon, lat]);

    for candidate in tree.locate_in_envelope_intersecting(&envelope) {
        if let Some(region) = regions.get(candidate.index) {
            if region.geometry.contains(&point) {
                return Some(RegionInfo {
                    name: region.name.clone(),
                    population: region.population,
                });
            }
        }
    }

    None
}

async fn locate_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocateParams>,
) -> Json<Option<RegionInfo>> {
    Json(locate(&state.ctx.regions, &state.tree, params.lon, params.lat))
}

async fn describe_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.ctx.describe_region(&name) {
        Some(info) => Json(info).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn legend_handler(State(state): State<Arc<AppState>>) -> Json<Vec<LegendEntry>> {
    Json(state.ctx.scale.legend_entries())
}

/// Re-render the map at the requested surface size. Each call recomputes the
/// projection parameters and redraws every boundary path under them.
async fn map_handler(
    State(state): State<Arc<AppState>>,
    Query(size): Query<SizeParams>,
) -> Response {
    let current = state.ctx.viewport.params();
    let width = size.width.unwrap_or(current.width).clamp(1, MAX_SURFACE);
    let height = size.height.unwrap_or(current.height).clamp(1, MAX_SURFACE);

    let rendered = tokio::task::spawn_blocking(move || {
        let params = state.ctx.viewport.resize(width, height);
        let img = render::render_map(&state.ctx, &params);
        render::encode_png(&img)
    })
    .await;

    match rendered {
        Ok(Ok(bytes)) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render map: {:#}", e),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Render task failed: {}", e),
        )
            .into_response(),
    }
}
