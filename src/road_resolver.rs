//! Speed limit and location lookup for the current position.
//!
//! With network access the position is reverse geocoded online and the road
//! classification is mapped through [`online_speed_limit`]. Without it the
//! municipality is found by point-in-polygon, the province road index is
//! (re)built when needed and the nearest segment is mapped through
//! [`offline_speed_limit`].

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::geo_fix::GeoFix;
use crate::geocoder::{Address, ReverseGeocoder};
use crate::road_store::{Municipality, RoadIndex, RoadSegment, RoadStore};

/// Speed limit and location description written to the navigation context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub speed_limit: Option<u32>,
    pub location: String,
}

/// Speed limit in km/h for an OpenStreetMap highway classification, 0 if unknown.
pub fn online_speed_limit(road_class: &str) -> u32 {
    match road_class {
        "motorway" => 120,
        "trunk" => 100,
        "primary" => 90,
        "secondary" => 80,
        "tertiary" => 70,
        "unclassified" => 50,
        "residential" => 30,
        "service" => 20,
        "school" => 20,
        _ => 0,
    }
}

/// Road type groups for conventional roads, checked in this order.
const CONVENTIONAL_ROAD_TYPES: &[(u32, &[&str])] = &[
    (90, &["CTRA", "CARRETERA", "VARIANTE", "ACCESO"]),
    (50, &["CALLE", "AVDA", "AVENIDA", "PASEO", "PLAZA", "RONDA", "TRAVESIA", "BULEVAR", "GLORIETA"]),
    (30, &["CAMINO", "CMNO", "PARTIDA", "URBANIZACION", "VEREDA", "COLONIA"]),
    (20, &["PASAJE", "SENDA", "CALLEJON", "SERVICIO"]),
];

/// Road classes whose limit depends on the road type.
fn type_groups(road_class: &str) -> Option<&'static [(u32, &'static [&'static str])]> {
    match road_class {
        "Carretera convencional" => Some(CONVENTIONAL_ROAD_TYPES),
        _ => None,
    }
}

fn class_speed_limit(road_class: &str) -> u32 {
    match road_class {
        "Autopista de peaje" => 120,
        "Autopista libre / autovía" | "Autopista" | "Autovía" => 120,
        "Camino" => 30,
        "Senda" => 20,
        "Carril bici" => 20,
        "Urbano" => 50,
        _ => 0,
    }
}

/// Speed limit in km/h for a road segment from the offline dataset, 0 if unknown.
///
/// The class specific road type groups are consulted first, in declaration
/// order; the class-only table is the fallback.
pub fn offline_speed_limit(road_class: &str, road_type: &str) -> u32 {
    let road_type = road_type.trim().to_uppercase();
    type_groups(road_class)
        .and_then(|groups| {
            groups
                .iter()
                .find(|(_, types)| types.contains(&road_type.as_str()))
                .map(|(limit, _)| *limit)
        })
        .unwrap_or_else(|| class_speed_limit(road_class))
}

fn capitalize(word: &str) -> String {
    let lower = word.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn join_non_empty(parts: &[&str], separator: &str) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(separator)
}

/// "{road}, {city} ({province})", with town and state as fallbacks.
pub fn describe_address(address: &Address) -> String {
    let road = address.road.as_deref().unwrap_or("");
    let city = address.city.as_deref().or(address.town.as_deref()).unwrap_or("");
    let province = address.province.as_deref().or(address.state.as_deref()).unwrap_or("");
    let place = if province.is_empty() {
        city.to_string()
    } else {
        format!("{} ({})", city, province).trim().to_string()
    };
    join_non_empty(&[road, &place], ", ")
}

/// "{Type} {Name}, {Municipality} ({Province})".
pub fn describe_segment(segment: &RoadSegment, municipality: &Municipality) -> String {
    let road_type = capitalize(&segment.road_type);
    let street = join_non_empty(&[&road_type, segment.name.trim()], " ");
    let place = format!("{} ({})", municipality.name, municipality.province);
    join_non_empty(&[&street, &place], ", ")
}

/// Pause before retrying a province whose road dataset failed to load.
pub const DEFAULT_LOAD_RETRY: Duration = Duration::from_secs(30);

pub struct RoadResolver {
    geocoder: Option<Box<dyn ReverseGeocoder>>,
    store: Option<Box<dyn RoadStore>>,
    municipality: Option<Municipality>,
    index: Option<RoadIndex>,
    load_retry: Duration,
    last_load_failure: Option<Instant>,
}

impl RoadResolver {
    /// Either collaborator may be absent; the matching lookup path then yields defaults.
    pub fn new(geocoder: Option<Box<dyn ReverseGeocoder>>, store: Option<Box<dyn RoadStore>>) -> Self {
        Self {
            geocoder,
            store,
            municipality: None,
            index: None,
            load_retry: DEFAULT_LOAD_RETRY,
            last_load_failure: None,
        }
    }

    /// Sets how long a failed road dataset load blocks further attempts in the same municipality.
    pub fn with_load_retry(mut self, retry: Duration) -> Self {
        self.load_retry = retry;
        self
    }

    /// Municipality used by the last offline lookup.
    pub fn current_municipality(&self) -> Option<&Municipality> {
        self.municipality.as_ref()
    }

    pub fn loaded_province(&self) -> Option<&str> {
        self.index.as_ref().map(|index| index.province())
    }

    /// Speed limit and location for `fix`. The sentinel fix resolves to defaults.
    ///
    /// An online lookup that fails falls back to the offline datasets.
    pub fn resolve(&mut self, fix: &GeoFix, online: bool) -> Resolution {
        if !fix.valid_coordinates() {
            return Resolution::default();
        }
        if online {
            if let Some(resolution) = self.resolve_online(fix) {
                return resolution;
            }
        }
        self.resolve_offline(fix)
    }

    fn resolve_online(&self, fix: &GeoFix) -> Option<Resolution> {
        let geocoder = self.geocoder.as_ref()?;
        match geocoder.reverse(fix.latitude, fix.longitude) {
            Ok(Some(address)) => {
                let resolution = Resolution {
                    speed_limit: Some(online_speed_limit(&address.road_class)),
                    location: describe_address(&address),
                };
                debug!(
                    "Online lookup: {} ({}) limit {:?} km/h",
                    resolution.location, address.road_class, resolution.speed_limit
                );
                Some(resolution)
            }
            Ok(None) => Some(Resolution::default()),
            Err(e) => {
                warn!("Online road lookup failed, using offline data: {}", e);
                None
            }
        }
    }

    fn resolve_offline(&mut self, fix: &GeoFix) -> Resolution {
        let Some(store) = self.store.as_ref() else {
            return Resolution::default();
        };
        let Some(municipality) = store.municipality_at(fix.latitude, fix.longitude) else {
            warn!("No municipality contains {:.5}, {:.5}", fix.latitude, fix.longitude);
            return Resolution::default();
        };

        let municipality_changed = self.municipality.as_ref().map(|m| m.id) != Some(municipality.id);
        let province_loaded = self
            .index
            .as_ref()
            .is_some_and(|index| index.province() == municipality.province);
        // A failed load is retried in place once the retry delay has passed
        let retry_due = self
            .last_load_failure
            .is_none_or(|failed_at| failed_at.elapsed() >= self.load_retry);
        let needs_index = self.index.is_none() || (municipality_changed && !province_loaded);
        if needs_index && (municipality_changed || retry_due) {
            self.index = match store.load_segments(&municipality.province) {
                Ok(segments) => {
                    let index = RoadIndex::build(&municipality.province, segments);
                    info!("Loaded {} road segments for {}", index.len(), municipality.province);
                    self.last_load_failure = None;
                    Some(index)
                }
                Err(e) => {
                    warn!(
                        "Cannot load roads for {}: {}, retrying in {:?}",
                        municipality.province, e, self.load_retry
                    );
                    self.last_load_failure = Some(Instant::now());
                    None
                }
            };
        }

        let resolution = match self
            .index
            .as_ref()
            .and_then(|index| index.nearest(fix.latitude, fix.longitude))
        {
            Some(segment) => Resolution {
                speed_limit: Some(offline_speed_limit(&segment.road_class, &segment.road_type)),
                location: describe_segment(segment, &municipality),
            },
            None => Resolution {
                speed_limit: None,
                location: format!("{} ({})", municipality.name, municipality.province),
            },
        };
        self.municipality = Some(municipality);
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NavError, Result};
    use chrono::Utc;
    use geo::{LineString, MultiPolygon, Polygon};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_online_speed_table() {
        assert_eq!(online_speed_limit("motorway"), 120);
        assert_eq!(online_speed_limit("trunk"), 100);
        assert_eq!(online_speed_limit("primary"), 90);
        assert_eq!(online_speed_limit("secondary"), 80);
        assert_eq!(online_speed_limit("tertiary"), 70);
        assert_eq!(online_speed_limit("unclassified"), 50);
        assert_eq!(online_speed_limit("residential"), 30);
        assert_eq!(online_speed_limit("service"), 20);
        assert_eq!(online_speed_limit("school"), 20);
        assert_eq!(online_speed_limit("footway"), 0);
    }

    #[test]
    fn test_offline_speed_table() {
        assert_eq!(offline_speed_limit("Carretera convencional", "CTRA"), 90);
        assert_eq!(offline_speed_limit("Carretera convencional", "CALLE"), 50);
        assert_eq!(offline_speed_limit("Carretera convencional", "calle "), 50);
        assert_eq!(offline_speed_limit("Carretera convencional", "CAMINO"), 30);
        assert_eq!(offline_speed_limit("Carretera convencional", "PASAJE"), 20);
        assert_eq!(offline_speed_limit("Carretera convencional", "XYZ"), 0);
        assert_eq!(offline_speed_limit("Autopista de peaje", "CTRA"), 120);
        assert_eq!(offline_speed_limit("Autopista libre / autovía", ""), 120);
        assert_eq!(offline_speed_limit("Camino", ""), 30);
        assert_eq!(offline_speed_limit("Senda", ""), 20);
        assert_eq!(offline_speed_limit("Carril bici", ""), 20);
        assert_eq!(offline_speed_limit("Urbano", "CALLE"), 50);
        assert_eq!(offline_speed_limit("Desconocida", "CALLE"), 0);
    }

    #[test]
    fn test_describe_address_fallbacks() {
        let address = Address {
            road_class: "motorway".into(),
            road: Some("Autopista del Mediterráneo".into()),
            town: Some("Daya Nueva".into()),
            state: Some("Comunidad Valenciana".into()),
            ..Address::default()
        };
        assert_eq!(
            describe_address(&address),
            "Autopista del Mediterráneo, Daya Nueva (Comunidad Valenciana)"
        );
        let address = Address {
            road: Some("Calle Mayor".into()),
            city: Some("Orihuela".into()),
            town: Some("ignored".into()),
            province: Some("Alicante".into()),
            state: Some("ignored".into()),
            ..Address::default()
        };
        assert_eq!(describe_address(&address), "Calle Mayor, Orihuela (Alicante)");
    }

    struct FakeGeocoder {
        reply: Option<Address>,
        fail: bool,
    }

    impl ReverseGeocoder for FakeGeocoder {
        fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<Option<Address>> {
            if self.fail {
                return Err(NavError::Geocoder("timed out".into()));
            }
            Ok(self.reply.clone())
        }
    }

    struct FakeStore {
        municipalities: Vec<Municipality>,
        loads: Arc<Mutex<Vec<String>>>,
        /// Loads that fail before the dataset becomes readable
        failing_loads: Mutex<u32>,
    }

    impl RoadStore for FakeStore {
        fn municipality_at(&self, latitude: f64, longitude: f64) -> Option<Municipality> {
            self.municipalities.iter().find(|m| m.contains(latitude, longitude)).cloned()
        }

        fn load_segments(&self, province: &str) -> Result<Vec<RoadSegment>> {
            self.loads.lock().unwrap().push(province.to_string());
            let mut failing = self.failing_loads.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(NavError::Dataset(format!("roads for {} unreadable", province)));
            }
            Ok(vec![
                RoadSegment {
                    id: 1,
                    lanes: 2,
                    direction: "Doble".into(),
                    road_class: "Carretera convencional".into(),
                    road_type: "CTRA".into(),
                    name: "CV-95".into(),
                    geometry: vec![LineString::from(vec![[-0.80, 38.10], [-0.80, 38.20]])],
                },
                RoadSegment {
                    id: 2,
                    lanes: 1,
                    direction: "Único".into(),
                    road_class: "Carretera convencional".into(),
                    road_type: "CALLE".into(),
                    name: "Mayor".into(),
                    geometry: vec![LineString::from(vec![[-0.77, 38.10], [-0.77, 38.20]])],
                },
            ])
        }
    }

    fn square(id: u64, name: &str, min_lon: f64, max_lon: f64) -> Municipality {
        let ring = LineString::from(vec![
            [min_lon, 38.0],
            [max_lon, 38.0],
            [max_lon, 38.3],
            [min_lon, 38.3],
            [min_lon, 38.0],
        ]);
        Municipality {
            id,
            name: name.into(),
            province: "Alicante".into(),
            boundary: MultiPolygon::new(vec![Polygon::new(ring, vec![])]),
        }
    }

    fn flaky_resolver(loads: Arc<Mutex<Vec<String>>>, failing_loads: u32) -> RoadResolver {
        let store = FakeStore {
            municipalities: vec![square(1, "Orihuela", -0.79, -0.70), square(2, "Redován", -0.90, -0.79)],
            loads,
            failing_loads: Mutex::new(failing_loads),
        };
        RoadResolver::new(None, Some(Box::new(store)))
    }

    fn offline_resolver(loads: Arc<Mutex<Vec<String>>>) -> RoadResolver {
        flaky_resolver(loads, 0)
    }

    #[test]
    fn test_offline_lookup_nearest_segment() {
        let loads = Arc::new(Mutex::new(Vec::new()));
        let mut resolver = offline_resolver(loads.clone());
        let fix = GeoFix::new(38.1194, -0.7785, Utc::now());
        let resolution = resolver.resolve(&fix, false);
        assert_eq!(resolution.speed_limit, Some(50));
        assert_eq!(resolution.location, "Calle Mayor, Orihuela (Alicante)");
        assert_eq!(resolver.current_municipality().map(|m| m.id), Some(1));
        assert_eq!(resolver.loaded_province(), Some("Alicante"));

        // Same province in a neighbouring municipality reuses the index
        let fix = GeoFix::new(38.1194, -0.7990, Utc::now());
        let resolution = resolver.resolve(&fix, false);
        assert_eq!(resolution.speed_limit, Some(90));
        assert_eq!(resolution.location, "Ctra CV-95, Redován (Alicante)");
        assert_eq!(loads.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_index_load_is_retried_in_same_municipality() {
        let loads = Arc::new(Mutex::new(Vec::new()));
        let mut resolver = flaky_resolver(loads.clone(), 1).with_load_retry(Duration::ZERO);
        let fix = GeoFix::new(38.1194, -0.7785, Utc::now());

        let first = resolver.resolve(&fix, false);
        assert_eq!(first.speed_limit, None);
        assert_eq!(first.location, "Orihuela (Alicante)");
        assert_eq!(resolver.loaded_province(), None);

        let second = resolver.resolve(&fix, false);
        assert_eq!(second.speed_limit, Some(50));
        assert_eq!(resolver.loaded_province(), Some("Alicante"));

        resolver.resolve(&fix, false);
        assert_eq!(loads.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_index_load_waits_for_retry_delay() {
        let loads = Arc::new(Mutex::new(Vec::new()));
        let mut resolver = flaky_resolver(loads.clone(), 1).with_load_retry(Duration::from_secs(3600));
        let fix = GeoFix::new(38.1194, -0.7785, Utc::now());
        for _ in 0..4 {
            assert_eq!(resolver.resolve(&fix, false).speed_limit, None);
        }
        assert_eq!(loads.lock().unwrap().len(), 1);

        // Entering another municipality tries again right away
        let fix = GeoFix::new(38.1194, -0.7990, Utc::now());
        assert_eq!(resolver.resolve(&fix, false).speed_limit, Some(90));
        assert_eq!(loads.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_offline_lookup_outside_any_municipality() {
        let loads = Arc::new(Mutex::new(Vec::new()));
        let mut resolver = offline_resolver(loads.clone());
        let fix = GeoFix::new(39.47, -0.37, Utc::now());
        assert_eq!(resolver.resolve(&fix, false), Resolution::default());
        assert!(loads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_sentinel_fix_is_skipped() {
        let loads = Arc::new(Mutex::new(Vec::new()));
        let mut resolver = offline_resolver(loads.clone());
        assert_eq!(resolver.resolve(&GeoFix::sentinel(), true), Resolution::default());
        assert!(loads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_online_lookup_and_fallback() {
        let geocoder = FakeGeocoder {
            reply: Some(Address {
                road_class: "primary".into(),
                road: Some("Avenida de la Vega".into()),
                city: Some("Orihuela".into()),
                province: Some("Alicante".into()),
                ..Address::default()
            }),
            fail: false,
        };
        let mut resolver = RoadResolver::new(Some(Box::new(geocoder)), None);
        let fix = GeoFix::new(38.1194, -0.7785, Utc::now());
        let resolution = resolver.resolve(&fix, true);
        assert_eq!(resolution.speed_limit, Some(90));
        assert_eq!(resolution.location, "Avenida de la Vega, Orihuela (Alicante)");

        let loads = Arc::new(Mutex::new(Vec::new()));
        let store = FakeStore {
            municipalities: vec![square(1, "Orihuela", -0.79, -0.70)],
            loads,
            failing_loads: Mutex::new(0),
        };
        let failing = FakeGeocoder { reply: None, fail: true };
        let mut resolver = RoadResolver::new(Some(Box::new(failing)), Some(Box::new(store)));
        let resolution = resolver.resolve(&fix, true);
        assert_eq!(resolution.speed_limit, Some(50));
        assert_eq!(resolution.location, "Calle Mayor, Orihuela (Alicante)");
    }
}
