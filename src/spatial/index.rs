//! Hex grid adapter - maps geography onto H3 cells
//!
//! Every downstream control decision keys off stable cell identity, so this
//! adapter is the only place coordinates, encoded routes, and raw index
//! strings are turned into cells. Pure functions over grid geometry; the
//! only state is the configured resolution.

use ahash::AHashSet;
use h3o::{CellIndex, LatLng, Resolution};
use serde::Serialize;

use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, Result};
use crate::core::types::Coordinate;
use crate::spatial::polyline;

/// Spatial index at a fixed H3 resolution
#[derive(Debug, Clone, Copy)]
pub struct SpatialIndex {
    resolution: Resolution,
}

/// Summary statistics for a collection of cells
#[derive(Debug, Clone, Serialize)]
pub struct AreaStats {
    pub total_zones: usize,
    pub total_area_km2: f64,
    pub resolution: u8,
}

impl SpatialIndex {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let resolution = Resolution::try_from(config.resolution).map_err(|_| {
            EngineError::Config(format!(
                "resolution ({}) is not a valid H3 resolution",
                config.resolution
            ))
        })?;
        Ok(Self { resolution })
    }

    pub fn from_resolution(resolution: Resolution) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Map a coordinate to its cell at the configured resolution.
    ///
    /// Coordinates outside [-90, 90] x [-180, 180] are rejected rather than
    /// normalized; upstream callers must not feed wrapped longitudes.
    pub fn coordinate_to_cell(&self, lat: f64, lng: f64) -> Result<CellIndex> {
        let point = Coordinate::new(lat, lng);
        if !point.is_in_range() {
            return Err(EngineError::InvalidCoordinate { lat, lng });
        }
        let latlng =
            LatLng::new(lat, lng).map_err(|_| EngineError::InvalidCoordinate { lat, lng })?;
        Ok(latlng.to_cell(self.resolution))
    }

    /// Center of a cell
    pub fn cell_center(&self, cell: CellIndex) -> Coordinate {
        let center = LatLng::from(cell);
        Coordinate::new(center.lat(), center.lng())
    }

    /// Boundary vertices of a cell as a closed ring (first vertex repeated
    /// last): 7 entries for hexagons, 6 for the pentagon exceptions.
    pub fn cell_boundary(&self, cell: CellIndex) -> Vec<Coordinate> {
        let boundary = cell.boundary();
        let mut ring: Vec<Coordinate> = boundary
            .iter()
            .map(|vertex| Coordinate::new(vertex.lat(), vertex.lng()))
            .collect();
        if let Some(&first) = ring.first() {
            ring.push(first);
        }
        ring
    }

    /// Decode an encoded route and return the distinct cells it touches, in
    /// first-touch order.
    ///
    /// An empty route yields an empty sequence; malformed input (including
    /// decoded points outside coordinate range) is a decode error.
    pub fn decode_path(&self, encoded: &str) -> Result<Vec<CellIndex>> {
        let points = polyline::decode(encoded)?;

        let mut seen = AHashSet::with_capacity(points.len());
        let mut cells = Vec::new();
        for (position, point) in points.iter().enumerate() {
            if !point.is_in_range() {
                return Err(EngineError::Decode {
                    position,
                    reason: format!(
                        "decoded point ({}, {}) outside coordinate range",
                        point.lat, point.lng
                    ),
                });
            }
            let cell = self.coordinate_to_cell(point.lat, point.lng)?;
            if seen.insert(cell) {
                cells.push(cell);
            }
        }
        Ok(cells)
    }

    /// All cells within `k` grid steps of `cell`, center included.
    pub fn neighbors(&self, cell: CellIndex, k: u32) -> Vec<CellIndex> {
        cell.grid_disk_safe(k).collect()
    }

    /// Every cell whose hexagon may intersect the disk of `radius_km`
    /// around the given center.
    ///
    /// The ring count is estimated from the center cell's area and then
    /// trimmed by great-circle distance; the result may over-cover the
    /// requested disk but never under-covers it.
    pub fn cells_in_radius(
        &self,
        center_lat: f64,
        center_lng: f64,
        radius_km: f64,
    ) -> Result<Vec<CellIndex>> {
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(EngineError::Validation(format!(
                "radius_km ({radius_km}) must be positive"
            )));
        }

        let center_cell = self.coordinate_to_cell(center_lat, center_lng)?;
        let cell_area = center_cell.area_km2();
        let rings = ((radius_km * radius_km) / cell_area).ceil() as u32 + 1;

        // A hexagon of area A has circumradius < sqrt(A); cells whose
        // center lies within radius + that margin may still intersect
        // the disk, everything further out cannot.
        let margin_km = cell_area.sqrt();
        let origin = LatLng::new(center_lat, center_lng)
            .map_err(|_| EngineError::InvalidCoordinate {
                lat: center_lat,
                lng: center_lng,
            })?;

        let cells = center_cell
            .grid_disk_safe(rings)
            .filter(|cell| LatLng::from(*cell).distance_km(origin) <= radius_km + margin_km)
            .collect();
        Ok(cells)
    }

    /// Distance between two cells in grid steps
    pub fn grid_distance(&self, a: CellIndex, b: CellIndex) -> Result<i32> {
        a.grid_distance(b).map_err(|e| {
            EngineError::Validation(format!("grid distance between {a} and {b} undefined: {e}"))
        })
    }

    /// Whether a raw string is a well-formed cell index
    pub fn is_valid(&self, index: &str) -> bool {
        index.parse::<CellIndex>().is_ok()
    }

    /// Parse a raw index string at the ingestion boundary.
    ///
    /// Rejects both syntactically invalid strings and cells at a different
    /// resolution than the grid is configured for.
    pub fn parse_cell(&self, index: &str) -> Result<CellIndex> {
        let cell = index.parse::<CellIndex>().map_err(|_| {
            EngineError::Validation(format!("'{index}' is not a valid cell index"))
        })?;
        if cell.resolution() != self.resolution {
            return Err(EngineError::Validation(format!(
                "cell '{index}' has resolution {}, grid runs at {}",
                cell.resolution(),
                self.resolution
            )));
        }
        Ok(cell)
    }

    /// Area of a cell in km2
    pub fn cell_area_km2(&self, cell: CellIndex) -> f64 {
        cell.area_km2()
    }

    /// Summary statistics for a collection of cells
    pub fn area_stats(&self, cells: &[CellIndex]) -> AreaStats {
        let total_area: f64 = cells.iter().map(|cell| cell.area_km2()).sum();
        AreaStats {
            total_zones: cells.len(),
            total_area_km2: (total_area * 100.0).round() / 100.0,
            resolution: u8::from(self.resolution),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // Barcelona, the fixture coordinate used throughout
    const BCN: (f64, f64) = (41.3851, 2.1734);

    fn index() -> SpatialIndex {
        SpatialIndex::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_coordinate_round_trip_stays_within_cell() {
        let index = index();
        let cell = index.coordinate_to_cell(BCN.0, BCN.1).unwrap();
        let center = index.cell_center(cell);

        // Cell width at resolution 9 is well under a hundredth of a degree
        assert!((center.lat - BCN.0).abs() < 0.01);
        assert!((center.lng - BCN.1).abs() < 0.01);
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        let index = index();
        assert!(matches!(
            index.coordinate_to_cell(91.0, 0.0),
            Err(EngineError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            index.coordinate_to_cell(0.0, 181.0),
            Err(EngineError::InvalidCoordinate { .. })
        ));
        assert!(index.coordinate_to_cell(-90.0, 180.0).is_ok());
    }

    #[test]
    fn test_boundary_is_a_closed_hex_ring() {
        let index = index();
        let cell = index.coordinate_to_cell(BCN.0, BCN.1).unwrap();
        let ring = index.cell_boundary(cell);

        assert_eq!(ring.len(), 7);
        assert_eq!(ring.first(), ring.last());
        // Interior vertices are all distinct
        for (i, a) in ring[..6].iter().enumerate() {
            for b in &ring[i + 1..6] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_neighbor_counts_match_ring_sizes() {
        let index = index();
        let cell = index.coordinate_to_cell(BCN.0, BCN.1).unwrap();

        let k1 = index.neighbors(cell, 1);
        assert_eq!(k1.len(), 7); // center + 6
        assert!(k1.contains(&cell));

        let k2 = index.neighbors(cell, 2);
        assert_eq!(k2.len(), 19); // 1 + 6 + 12
    }

    #[test]
    fn test_decode_path_empty_route() {
        assert_eq!(index().decode_path("").unwrap(), Vec::new());
    }

    #[test]
    fn test_decode_path_collapses_duplicates() {
        let index = index();
        let cells = index.decode_path("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();

        // Three widely separated points, three distinct cells
        assert_eq!(cells.len(), 3);
        let as_set: AHashSet<_> = cells.iter().copied().collect();
        assert_eq!(as_set.len(), 3);
    }

    #[test]
    fn test_decode_path_malformed_route() {
        assert!(matches!(
            index().decode_path("_p~iF~"),
            Err(EngineError::Decode { .. })
        ));
    }

    #[test]
    fn test_cells_in_radius_covers_center() {
        let index = index();
        let cells = index.cells_in_radius(BCN.0, BCN.1, 1.0).unwrap();
        let center = index.coordinate_to_cell(BCN.0, BCN.1).unwrap();

        assert!(cells.contains(&center));
        // A 1 km disk at ~0.1 km2 per cell holds dozens of cells
        assert!(cells.len() > 10);
    }

    #[test]
    fn test_cells_in_radius_rejects_nonpositive_radius() {
        let index = index();
        assert!(index.cells_in_radius(BCN.0, BCN.1, 0.0).is_err());
        assert!(index.cells_in_radius(BCN.0, BCN.1, -2.0).is_err());
    }

    #[test]
    fn test_grid_distance() {
        let index = index();
        let a = index.coordinate_to_cell(41.3851, 2.1734).unwrap();
        let b = index.coordinate_to_cell(41.3900, 2.1800).unwrap();

        assert_eq!(index.grid_distance(a, a).unwrap(), 0);
        assert!(index.grid_distance(a, b).unwrap() > 0);
    }

    #[test]
    fn test_is_valid_and_parse_cell() {
        let index = index();
        let cell = index.coordinate_to_cell(BCN.0, BCN.1).unwrap();
        let raw = cell.to_string();

        assert!(index.is_valid(&raw));
        assert!(!index.is_valid("not-a-cell"));
        assert!(!index.is_valid(""));
        assert_eq!(index.parse_cell(&raw).unwrap(), cell);

        // Same point at a coarser resolution parses but is rejected here
        let coarse = SpatialIndex::from_resolution(Resolution::Seven)
            .coordinate_to_cell(BCN.0, BCN.1)
            .unwrap();
        assert!(index.parse_cell(&coarse.to_string()).is_err());
    }

    #[test]
    fn test_area_stats() {
        let index = index();
        let cells = index.cells_in_radius(BCN.0, BCN.1, 0.5).unwrap();
        let stats = index.area_stats(&cells);

        assert_eq!(stats.total_zones, cells.len());
        assert!(stats.total_area_km2 > 0.0);
        assert_eq!(stats.resolution, 9);

        let empty = index.area_stats(&[]);
        assert_eq!(empty.total_zones, 0);
        assert_eq!(empty.total_area_km2, 0.0);
    }

    proptest! {
        /// Round-trip bound: for any valid coordinate, the center of its
        /// cell lies within one cell width of the original point.
        #[test]
        fn prop_round_trip_within_one_cell_width(
            lat in -89.0f64..89.0,
            lng in -179.0f64..179.0,
        ) {
            let index = index();
            let cell = index.coordinate_to_cell(lat, lng).unwrap();
            let center = index.cell_center(cell);

            let original = LatLng::new(lat, lng).unwrap();
            let mapped = LatLng::new(center.lat, center.lng).unwrap();
            let cell_width_km = cell.area_km2().sqrt();

            prop_assert!(original.distance_km(mapped) <= 2.0 * cell_width_km);
        }
    }
}
