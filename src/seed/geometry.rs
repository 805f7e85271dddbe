//! Great-circle helpers for OSM way geometry.

/// Mean earth radius used by OSMnx for edge lengths.
const EARTH_RADIUS_M: f64 = 6_371_009.0;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// A south/west/north/east bounding box, the order Overpass expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BBox {
    /// Box reaching `dist_m` from the center in each cardinal direction.
    pub fn around(center: LatLon, dist_m: f64) -> Self {
        let delta_lat = (dist_m / EARTH_RADIUS_M).to_degrees();
        let delta_lon = (dist_m / (EARTH_RADIUS_M * center.lat.to_radians().cos())).to_degrees();
        Self {
            south: center.lat - delta_lat,
            west: center.lon - delta_lon,
            north: center.lat + delta_lat,
            east: center.lon + delta_lon,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.south < self.north
            && self.west < self.east
            && (-90.0..=90.0).contains(&self.south)
            && (-90.0..=90.0).contains(&self.north)
    }

    /// `south,west,north,east` for an Overpass filter.
    pub fn overpass_filter(&self) -> String {
        format!("{},{},{},{}", self.south, self.west, self.north, self.east)
    }
}

pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Length of a polyline in meters.
pub fn line_length_m(points: &[LatLon]) -> f64 {
    points.windows(2).map(|w| haversine_m(w[0], w[1])).sum()
}

/// WKT `LINESTRING` in lon/lat order. Needs at least two points.
pub fn to_wkt_linestring(points: &[LatLon]) -> Option<String> {
    if points.len() < 2 {
        return None;
    }
    let coords: Vec<String> = points.iter().map(|p| format!("{} {}", p.lon, p.lat)).collect();
    Some(format!("LINESTRING({})", coords.join(", ")))
}
