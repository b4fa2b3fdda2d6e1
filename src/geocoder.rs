//! Online reverse geocoding.

use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::config::GeocoderConfig;
use crate::error::{NavError, Result};

/// Address components returned for a position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    /// Road classification, e.g. "motorway" or "residential"
    pub road_class: String,
    pub road: Option<String>,
    pub city: Option<String>,
    pub town: Option<String>,
    pub province: Option<String>,
    pub state: Option<String>,
}

/// Resolves a position to an address.
pub trait ReverseGeocoder: Send {
    /// `Ok(None)` when the service knows nothing about the position.
    fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<Address>>;
}

#[derive(Debug, Deserialize)]
struct NominatimReply {
    #[serde(rename = "type", default)]
    place_type: String,
    #[serde(default)]
    address: Option<NominatimAddress>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    province: Option<String>,
    state: Option<String>,
}

/// Client for the Nominatim `/reverse` endpoint.
pub struct NominatimGeocoder {
    agent: ureq::Agent,
    base_url: String,
    language: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(&config.user_agent)
            .build();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
        }
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<Address>> {
        let url = format!("{}/reverse", self.base_url);
        let reply: NominatimReply = self
            .agent
            .get(&url)
            .query("format", "jsonv2")
            .query("lat", &latitude.to_string())
            .query("lon", &longitude.to_string())
            .query("accept-language", &self.language)
            .call()
            .map_err(|e| NavError::Geocoder(e.to_string()))?
            .into_json()?;
        Ok(into_address(reply))
    }
}

fn into_address(reply: NominatimReply) -> Option<Address> {
    if let Some(error) = reply.error {
        debug!("Reverse geocoding returned no result: {}", error);
        return None;
    }
    let address = reply.address?;
    Some(Address {
        road_class: reply.place_type,
        road: address.road,
        city: address.city,
        town: address.town,
        province: address.province,
        state: address.state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_to_address() {
        let raw = r#"{"place_id": 1, "category": "highway", "type": "motorway",
            "address": {"road": "Autopista del Mediterráneo", "town": "Daya Nueva",
                        "province": "Alicante", "state": "Comunidad Valenciana"}}"#;
        let reply: NominatimReply = serde_json::from_str(raw).unwrap();
        let address = into_address(reply).unwrap();
        assert_eq!(address.road_class, "motorway");
        assert_eq!(address.road.as_deref(), Some("Autopista del Mediterráneo"));
        assert_eq!(address.city, None);
        assert_eq!(address.town.as_deref(), Some("Daya Nueva"));
        assert_eq!(address.province.as_deref(), Some("Alicante"));
    }

    #[test]
    fn test_unable_to_geocode() {
        let reply: NominatimReply = serde_json::from_str(r#"{"error": "Unable to geocode"}"#).unwrap();
        assert!(into_address(reply).is_none());
    }
}
