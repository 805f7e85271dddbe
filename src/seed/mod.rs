//! Offline trail seeder.
//!
//! Pulls every `highway` way for one or more areas from OpenStreetMap and
//! replaces a trail table with them, one row per way. Areas are either place
//! names (geocoded to a bounding box) or a point with a radius.

pub mod geometry;
pub mod osm;

use std::collections::BTreeMap;
use std::str::FromStr;

use tracing::{error, info, warn};

use crate::errors::SeedError;
use crate::server::db::{DbHandle, NewTrail, TRAIL_TAG_COLUMNS, UNNAMED_TRAIL, is_valid_table_name};

use geometry::{BBox, LatLon, line_length_m, to_wkt_linestring};
use osm::{OsmWay, TrailSource};

pub const DEFAULT_TABLE: &str = "trails";
pub const DEFAULT_POINT_DIST_M: f64 = 2000.0;

/// One area to seed.
#[derive(Debug, Clone, PartialEq)]
pub enum SeedArea {
    Place(String),
    Point { center: LatLon, dist_m: f64 },
}

impl SeedArea {
    pub fn label(&self) -> String {
        match self {
            SeedArea::Place(name) => name.clone(),
            SeedArea::Point { center, dist_m } => {
                format!("({}, {}) r={}m", center.lat, center.lon, dist_m)
            }
        }
    }
}

/// A `LAT,LON` pair as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointArg(pub LatLon);

impl FromStr for PointArg {
    type Err = SeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SeedError::InvalidPoint(s.to_string());
        let (lat, lon) = s.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(invalid());
        }
        Ok(PointArg(LatLon { lat, lon }))
    }
}

/// Outcome of a seeding run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SeedReport {
    pub areas_seeded: usize,
    pub areas_failed: usize,
    pub rows_written: usize,
}

/// Convert a way into a trail row. Ways with fewer than two nodes have no
/// line geometry and are dropped.
pub fn way_to_trail(way: &OsmWay) -> Option<NewTrail> {
    let points: Vec<LatLon> = way.geometry.iter().copied().map(LatLon::from).collect();
    let geometry = to_wkt_linestring(&points)?;
    let name = way
        .tags
        .get("name")
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .unwrap_or(UNNAMED_TRAIL)
        .to_string();
    let tags: BTreeMap<String, String> = TRAIL_TAG_COLUMNS
        .iter()
        .filter_map(|col| way.tags.get(*col).map(|v| (col.to_string(), v.clone())))
        .collect();
    Some(NewTrail {
        name,
        length_km: line_length_m(&points) / 1000.0,
        tags,
        geometry,
    })
}

async fn area_bbox(source: &dyn TrailSource, area: &SeedArea) -> Result<BBox, SeedError> {
    match area {
        SeedArea::Place(name) => source.geocode(name).await,
        SeedArea::Point { center, dist_m } => Ok(BBox::around(*center, *dist_m)),
    }
}

async fn fetch_area(source: &dyn TrailSource, area: &SeedArea) -> Result<Vec<NewTrail>, SeedError> {
    let bbox = area_bbox(source, area).await?;
    let ways = source.fetch_ways(&bbox).await?;
    let trails: Vec<NewTrail> = ways.iter().filter_map(way_to_trail).collect();
    info!(area = %area.label(), ways = ways.len(), trails = trails.len(), "Area fetched");
    Ok(trails)
}

/// Fetch every area and replace `table` with the combined rows.
///
/// A failed area is logged and skipped. When nothing at all was fetched
/// the table is left untouched.
pub async fn run_seed(
    db: &DbHandle,
    source: &dyn TrailSource,
    areas: &[SeedArea],
    table: &str,
) -> Result<SeedReport, SeedError> {
    if !is_valid_table_name(table) {
        return Err(SeedError::InvalidTable(table.to_string()));
    }

    let mut report = SeedReport::default();
    let mut trails = Vec::new();
    for area in areas {
        info!(area = %area.label(), "Seeding area");
        match fetch_area(source, area).await {
            Ok(rows) => {
                report.areas_seeded += 1;
                trails.extend(rows);
            }
            Err(e) => {
                report.areas_failed += 1;
                error!(area = %area.label(), error = %e, "Area skipped");
            }
        }
    }

    if trails.is_empty() {
        warn!(table, "No trails fetched, nothing written");
        return Ok(report);
    }

    let target = table.to_string();
    report.rows_written = db
        .call(move |db| db.replace_trails(&target, &trails))
        .await?;
    info!(table, rows = report.rows_written, "Trail table replaced");
    Ok(report)
}
