//! Coordinates, great-circle distance and postal addresses.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// WGS84 coordinate in decimal degrees.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> DomainResult<Self> {
        let point = Self { lat, lng };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(DomainError::validation("latitude must be within [-90, 90]"));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(DomainError::validation(
                "longitude must be within [-180, 180]",
            ));
        }
        Ok(())
    }

    /// Haversine distance in whole meters.
    pub fn distance_m(&self, other: &GeoPoint) -> u32 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        (EARTH_RADIUS_M * c).round() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

impl Address {
    /// Trimmed copy; street and city are required, coordinates checked if present.
    pub fn normalized(&self) -> DomainResult<Address> {
        let street = self.street.trim();
        let city = self.city.trim();
        if street.is_empty() {
            return Err(DomainError::validation("address street cannot be empty"));
        }
        if city.is_empty() {
            return Err(DomainError::validation("address city cannot be empty"));
        }
        if let Some(point) = &self.location {
            point.validate()?;
        }
        Ok(Address {
            street: street.to_string(),
            city: city.to_string(),
            postal_code: self
                .postal_code
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            location: self.location,
        })
    }

    pub fn require_location(&self) -> DomainResult<GeoPoint> {
        self.location
            .ok_or_else(|| DomainError::validation("address must include a location"))
    }
}
