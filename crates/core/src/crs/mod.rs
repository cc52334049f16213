//! Coordinate Reference System handling
//!
//! A [`CRS`] is either a registry code (`EPSG:32618`) or a PROJ.4 parameter
//! string. Both forms resolve to a PROJ.4 string; equality compares the
//! resolved parameters, never the spelling.

mod registry;
mod transform;

pub use transform::Transformer;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CRS {
    /// EPSG code if the CRS was built from the registry
    epsg: Option<u32>,
    /// Resolved PROJ.4 definition
    proj: String,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Result<Self> {
        let proj = registry::lookup(code).ok_or_else(|| Error::InvalidParameter {
            name: "epsg",
            value: code.to_string(),
            reason: "code is not in the built-in registry; pass a PROJ string instead".into(),
        })?;
        Ok(Self {
            epsg: Some(code),
            proj,
        })
    }

    /// Create a CRS from a PROJ.4 string such as `+proj=utm +zone=18 +datum=WGS84`
    pub fn from_proj(proj: impl Into<String>) -> Result<Self> {
        let proj = proj.into().trim().to_string();
        if !normalize(&proj).contains_key("proj") {
            return Err(Error::InvalidParameter {
                name: "crs",
                value: proj,
                reason: "PROJ string has no +proj parameter".into(),
            });
        }
        proj4rs::proj::Proj::from_proj_string(&proj)
            .map_err(|e| Error::Projection(format!("invalid PROJ string '{}': {}", proj, e)))?;
        Ok(Self { epsg: None, proj })
    }

    /// Parse either `AUTHORITY:CODE` (EPSG only) or a PROJ.4 string.
    ///
    /// PROJ strings start with `+`; a bare `+init=epsg:<code>` resolves
    /// through the registry.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.starts_with('+') {
            let params = normalize(text);
            if let (Some(init), false) = (params.get("init"), params.contains_key("proj")) {
                return Self::parse(init);
            }
            return Self::from_proj(text);
        }
        if let Some((authority, code)) = text.split_once(':') {
            if authority.eq_ignore_ascii_case("epsg") {
                let code = code.trim().parse::<u32>().map_err(|_| Error::InvalidParameter {
                    name: "crs",
                    value: text.to_string(),
                    reason: "EPSG code must be an unsigned integer".into(),
                })?;
                return Self::from_epsg(code);
            }
            return Err(Error::InvalidParameter {
                name: "crs",
                value: text.to_string(),
                reason: format!("unknown authority '{}'", authority),
            });
        }
        Self::from_proj(text)
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self {
            epsg: Some(4326),
            proj: registry::WGS84.to_string(),
        }
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Resolved PROJ.4 definition
    pub fn proj_string(&self) -> &str {
        &self.proj
    }

    /// Whether coordinates are angular (longitude/latitude in degrees)
    pub fn is_geographic(&self) -> bool {
        normalize(&self.proj).get("proj").map(String::as_str) == Some("longlat")
    }

    /// Size of one linear CRS unit in meters.
    ///
    /// `None` for geographic systems and for unit names we do not know.
    pub fn linear_unit_meters(&self) -> Option<f64> {
        if self.is_geographic() {
            return None;
        }
        let params = normalize(&self.proj);
        if let Some(factor) = params.get("to_meter") {
            return factor.parse::<f64>().ok().filter(|f| *f > 0.0);
        }
        match params.get("units").map(String::as_str) {
            None | Some("m") => Some(1.0),
            Some("km") => Some(1000.0),
            Some("dm") => Some(0.1),
            Some("cm") => Some(0.01),
            Some("mm") => Some(0.001),
            Some("ft") => Some(0.3048),
            Some("us-ft") => Some(1200.0 / 3937.0),
            Some("yd") => Some(0.9144),
            Some("mi") => Some(1609.344),
            Some("us-mi") => Some(1609.347_218_694_437),
            Some(_) => None,
        }
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        match self.epsg {
            Some(code) => format!("EPSG:{}", code),
            None => self.proj.clone(),
        }
    }

    /// Build the proj4rs projection for this CRS
    pub fn to_proj(&self) -> Result<proj4rs::proj::Proj> {
        proj4rs::proj::Proj::from_proj_string(&self.proj)
            .map_err(|e| Error::Projection(format!("{}: {}", self.identifier(), e)))
    }
}

impl PartialEq for CRS {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            if a == b {
                return true;
            }
        }
        normalize(&self.proj) == normalize(&other.proj)
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl TryFrom<String> for CRS {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        CRS::parse(&value)
    }
}

impl From<CRS> for String {
    fn from(crs: CRS) -> Self {
        crs.identifier()
    }
}

/// Parameters that carry no geodetic meaning.
const IGNORED_KEYS: [&str; 3] = ["no_defs", "type", "wktext"];

/// Normalize a PROJ.4 string into a comparable key/value map.
fn normalize(proj: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for token in proj.split_whitespace() {
        let token = token.trim_start_matches('+');
        if token.is_empty() {
            continue;
        }
        let (key, value) = token.split_once('=').unwrap_or((token, ""));
        let key = key.to_ascii_lowercase();
        if IGNORED_KEYS.contains(&key.as_str()) {
            continue;
        }
        let value = match key.as_str() {
            "proj" => match value.to_ascii_lowercase().as_str() {
                "latlong" | "lonlat" | "latlon" | "longlat" => "longlat".to_string(),
                other => other.to_string(),
            },
            _ => normalize_value(value),
        };
        params.insert(key, value);
    }
    params
}

fn normalize_value(value: &str) -> String {
    value
        .split(',')
        .map(|part| match part.parse::<f64>() {
            Ok(v) => format!("{}", v),
            Err(_) => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(4326).unwrap();
        assert_eq!(crs.epsg(), Some(4326));
        assert_eq!(crs.identifier(), "EPSG:4326");
        assert!(crs.is_geographic());
        assert_eq!(crs.linear_unit_meters(), None);
    }

    #[test]
    fn test_crs_equivalence_across_forms() {
        let a = CRS::parse("EPSG:4326").unwrap();
        let b = CRS::parse("+proj=latlong +datum=WGS84 +no_defs").unwrap();
        assert_eq!(a, b);
        assert_eq!(CRS::wgs84(), a);
    }

    #[test]
    fn test_crs_numeric_spelling_ignored() {
        let a = CRS::from_proj("+proj=utm +zone=18 +datum=WGS84 +units=m").unwrap();
        let b = CRS::from_proj("+proj=utm +zone=18.0 +datum=WGS84 +units=m +no_defs").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, CRS::from_epsg(32618).unwrap());
    }

    #[test]
    fn test_crs_different_zones_differ() {
        let a = CRS::from_epsg(32618).unwrap();
        let b = CRS::from_epsg(32617).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, CRS::from_epsg(32718).unwrap());
    }

    #[test]
    fn test_linear_units() {
        let utm = CRS::from_epsg(32618).unwrap();
        assert_eq!(utm.linear_unit_meters(), Some(1.0));

        let feet = CRS::from_proj(
            "+proj=tmerc +lat_0=40 +lon_0=-74 +k=0.9999 +x_0=0 +y_0=0 +ellps=GRS80 +units=us-ft",
        )
        .unwrap();
        let f = feet.linear_unit_meters().unwrap();
        assert!((f - 0.3048006).abs() < 1e-6);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(matches!(CRS::parse("EPSG:1"), Err(Error::InvalidParameter { .. })));
        assert!(matches!(CRS::parse("ESRI:102003"), Err(Error::InvalidParameter { .. })));
        assert!(CRS::parse("+ellps=WGS84").is_err());
    }

    #[test]
    fn test_parse_proj_string_with_colon() {
        let init = CRS::parse("+init=epsg:32618").unwrap();
        assert_eq!(init, CRS::from_epsg(32618).unwrap());

        // resolved through the registry, not rejected as an authority prefix
        let err = CRS::parse("+init=epsg:1").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "epsg", .. }));
    }

    #[test]
    fn test_serde_uses_identifier() {
        let crs = CRS::from_epsg(3857).unwrap();
        let json = serde_json::to_string(&crs).unwrap();
        assert_eq!(json, "\"EPSG:3857\"");
        let back: CRS = serde_json::from_str(&json).unwrap();
        assert_eq!(back, crs);
    }
}
