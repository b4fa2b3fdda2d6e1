//! Road and municipality reference data.
//!
//! The [`RoadStore`] trait is the persistence seam used by the offline road
//! lookup. [`JsonRoadStore`] reads GeoJSON-style datasets from a directory:
//!
//! - `municipalities.json`: `[{"id", "name", "province", "geometry"}]` with a
//!   `Polygon` or `MultiPolygon` boundary
//! - `roads_<province>.json`: `[{"id", "lanes", "direction", "class",
//!   "road_type", "name", "geometry"}]` with a `LineString` or
//!   `MultiLineString` geometry
//!
//! Coordinates are `[longitude, latitude]` pairs.
//!
//! [`RoadIndex`] is an R-tree over the segments of one province, built in bulk
//! and queried for the segment nearest to a position.

use std::fs;
use std::path::{Path, PathBuf};

use geo::{Contains, EuclideanDistance, LineString, MultiPolygon, Point, Polygon};
use log::{debug, info};
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use serde::Deserialize;

use crate::error::{NavError, Result};

/// A road segment as stored in the province dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    pub id: u64,
    pub lanes: u8,
    pub direction: String,
    /// Administrative class, e.g. "Carretera convencional"
    pub road_class: String,
    /// Street type abbreviation, e.g. "CTRA" or "CALLE"
    pub road_type: String,
    pub name: String,
    pub geometry: Vec<LineString<f64>>,
}

/// A municipality and its boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Municipality {
    pub id: u64,
    pub name: String,
    pub province: String,
    pub boundary: MultiPolygon<f64>,
}

impl Municipality {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.boundary.contains(&Point::new(longitude, latitude))
    }
}

/// Read access to the reference datasets.
pub trait RoadStore: Send {
    /// Municipality whose boundary contains the position, if any.
    fn municipality_at(&self, latitude: f64, longitude: f64) -> Option<Municipality>;

    /// Every road segment of `province`.
    fn load_segments(&self, province: &str) -> Result<Vec<RoadSegment>>;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
enum GeometryRecord {
    LineString(Vec<[f64; 2]>),
    MultiLineString(Vec<Vec<[f64; 2]>>),
    Polygon(Vec<Vec<[f64; 2]>>),
    MultiPolygon(Vec<Vec<Vec<[f64; 2]>>>),
}

fn polygon(rings: Vec<Vec<[f64; 2]>>) -> Option<Polygon<f64>> {
    let mut rings = rings.into_iter().map(LineString::from);
    let exterior = rings.next()?;
    Some(Polygon::new(exterior, rings.collect()))
}

impl GeometryRecord {
    fn into_lines(self) -> Result<Vec<LineString<f64>>> {
        match self {
            GeometryRecord::LineString(coords) => Ok(vec![LineString::from(coords)]),
            GeometryRecord::MultiLineString(lines) => Ok(lines.into_iter().map(LineString::from).collect()),
            _ => Err(NavError::Dataset("road geometry must be a LineString or MultiLineString".into())),
        }
    }

    fn into_area(self) -> Result<MultiPolygon<f64>> {
        match self {
            GeometryRecord::Polygon(rings) => Ok(MultiPolygon::new(polygon(rings).into_iter().collect())),
            GeometryRecord::MultiPolygon(polygons) => {
                Ok(MultiPolygon::new(polygons.into_iter().filter_map(polygon).collect()))
            }
            _ => Err(NavError::Dataset("municipality boundary must be a Polygon or MultiPolygon".into())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MunicipalityRecord {
    id: u64,
    name: String,
    province: String,
    geometry: GeometryRecord,
}

#[derive(Debug, Deserialize)]
struct RoadRecord {
    id: u64,
    #[serde(default)]
    lanes: u8,
    #[serde(default)]
    direction: String,
    #[serde(rename = "class", default)]
    road_class: String,
    #[serde(default)]
    road_type: String,
    #[serde(default)]
    name: String,
    geometry: GeometryRecord,
}

/// File name of a province's road dataset.
pub fn roads_file_name(province: &str) -> String {
    format!("roads_{}.json", province.trim().to_lowercase().replace(' ', "_"))
}

/// Datasets stored as JSON files in one directory.
#[derive(Debug)]
pub struct JsonRoadStore {
    data_dir: PathBuf,
    municipalities: Vec<Municipality>,
}

impl JsonRoadStore {
    /// Loads the municipality boundaries from `data_dir/municipalities.json`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let raw = fs::read_to_string(data_dir.join("municipalities.json"))?;
        let records: Vec<MunicipalityRecord> = serde_json::from_str(&raw)?;
        let municipalities = records
            .into_iter()
            .map(|r| {
                Ok(Municipality {
                    id: r.id,
                    name: r.name,
                    province: r.province,
                    boundary: r.geometry.into_area()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info!("Loaded {} municipalities from {}", municipalities.len(), data_dir.display());
        Ok(Self { data_dir, municipalities })
    }

    pub fn municipalities(&self) -> &[Municipality] {
        &self.municipalities
    }
}

impl RoadStore for JsonRoadStore {
    fn municipality_at(&self, latitude: f64, longitude: f64) -> Option<Municipality> {
        self.municipalities
            .iter()
            .find(|m| m.contains(latitude, longitude))
            .cloned()
    }

    fn load_segments(&self, province: &str) -> Result<Vec<RoadSegment>> {
        let path = self.data_dir.join(roads_file_name(province));
        let raw = fs::read_to_string(&path)
            .map_err(|e| NavError::Dataset(format!("{}: {}", path.display(), e)))?;
        let records: Vec<RoadRecord> = serde_json::from_str(&raw)?;
        records
            .into_iter()
            .map(|r| {
                Ok(RoadSegment {
                    id: r.id,
                    lanes: r.lanes,
                    direction: r.direction,
                    road_class: r.road_class,
                    road_type: r.road_type,
                    name: r.name,
                    geometry: r.geometry.into_lines()?,
                })
            })
            .collect()
    }
}

/// A segment with its cached bounding box.
#[derive(Debug)]
struct IndexedSegment {
    segment: RoadSegment,
    envelope: AABB<[f64; 2]>,
}

impl IndexedSegment {
    fn new(segment: RoadSegment) -> Option<Self> {
        let mut coords = segment.geometry.iter().flat_map(|line| line.coords());
        let first = coords.next()?;
        let (min, max) = coords.fold(([first.x, first.y], [first.x, first.y]), |(min, max), c| {
            ([min[0].min(c.x), min[1].min(c.y)], [max[0].max(c.x), max[1].max(c.y)])
        });
        Some(Self {
            segment,
            envelope: AABB::from_corners(min, max),
        })
    }
}

impl RTreeObject for IndexedSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for IndexedSegment {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let p = Point::new(point[0], point[1]);
        let d = self
            .segment
            .geometry
            .iter()
            .map(|line| p.euclidean_distance(line))
            .fold(f64::INFINITY, f64::min);
        d * d
    }
}

/// Nearest-segment index over one province's roads.
#[derive(Debug)]
pub struct RoadIndex {
    province: String,
    tree: RTree<IndexedSegment>,
}

impl RoadIndex {
    /// Bulk-loads the R-tree. Segments without coordinates are skipped.
    pub fn build(province: &str, segments: Vec<RoadSegment>) -> Self {
        let total = segments.len();
        let entries: Vec<IndexedSegment> = segments.into_iter().filter_map(IndexedSegment::new).collect();
        if entries.len() < total {
            debug!("Skipped {} road segments without geometry", total - entries.len());
        }
        Self {
            province: province.to_string(),
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn province(&self) -> &str {
        &self.province
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// The segment closest to the position, measured in degrees on the lon/lat plane.
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Option<&RoadSegment> {
        self.tree
            .nearest_neighbor(&[longitude, latitude])
            .map(|entry| &entry.segment)
    }
}
