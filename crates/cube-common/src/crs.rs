//! Coordinate Reference System identifiers and URI mapping.
//!
//! The provider addresses a CRS either by a short identifier (`WGS84`,
//! `OGC:CRS84`, `EPSG:<code>`) or by its OGC definition URI. Inputs in either
//! form canonicalize to the short form; the short form maps back to the URI
//! the process API expects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const OGC_CRS84_URI: &str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";
const EPSG_URI_PREFIX: &str = "http://www.opengis.net/def/crs/EPSG/0/";

/// EPSG codes accepted by the provider, besides the UTM zone ranges
/// 32601..=32660 (north) and 32701..=32760 (south).
pub const BASE_EPSG_CODES: [u32; 19] = [
    4326, 3857, 2154, 2180, 2193, 3003, 3004, 3031, 3035, 3346, 3416, 3765, 3794, 3844, 3912,
    3995, 4026, 5514, 28992,
];

/// Whether `code` is one of the EPSG codes the provider supports.
pub fn is_available_epsg_code(code: u32) -> bool {
    BASE_EPSG_CODES.contains(&code) || (32601..=32660).contains(&code) || (32701..=32760).contains(&code)
}

/// All supported EPSG codes, base set first, then UTM north and south zones.
pub fn available_epsg_codes() -> Vec<u32> {
    let mut codes = BASE_EPSG_CODES.to_vec();
    codes.extend(32601..=32660);
    codes.extend(32701..=32760);
    codes
}

/// A canonicalized CRS identifier.
///
/// `WGS84` and `EPSG:4326` are distinct identifiers that share a URI: an
/// input already in short form passes through unchanged, while the 4326 URI
/// canonicalizes to `WGS84`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CrsId {
    /// WGS84 geographic, lat/lon in degrees.
    Wgs84,
    /// CRS84 geographic, lon/lat axis order.
    OgcCrs84,
    /// Any other supported EPSG code.
    Epsg(u32),
}

impl CrsId {
    /// Parse a short identifier or an OGC definition URI.
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        match s {
            "WGS84" => return Ok(CrsId::Wgs84),
            "OGC:CRS84" | OGC_CRS84_URI => return Ok(CrsId::OgcCrs84),
            _ => {}
        }

        if let Some(code) = s.strip_prefix("EPSG:") {
            if let Ok(code) = code.parse::<u32>() {
                if is_available_epsg_code(code) {
                    return Ok(CrsId::Epsg(code));
                }
            }
            return Err(CrsParseError::UnknownCrs(s.to_string()));
        }

        if let Some(code) = s.strip_prefix(EPSG_URI_PREFIX) {
            if let Ok(code) = code.parse::<u32>() {
                if code == 4326 {
                    return Ok(CrsId::Wgs84);
                }
                if is_available_epsg_code(code) {
                    return Ok(CrsId::Epsg(code));
                }
            }
        }

        Err(CrsParseError::UnknownCrs(s.to_string()))
    }

    /// The OGC definition URI for this CRS.
    pub fn uri(&self) -> String {
        match self {
            CrsId::Wgs84 => format!("{}4326", EPSG_URI_PREFIX),
            CrsId::OgcCrs84 => OGC_CRS84_URI.to_string(),
            CrsId::Epsg(code) => format!("{}{}", EPSG_URI_PREFIX, code),
        }
    }

    /// Check if this is a geographic (degree-based) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsId::Wgs84 | CrsId::OgcCrs84)
    }

    pub fn is_wgs84(&self) -> bool {
        matches!(self, CrsId::Wgs84)
    }
}

impl Default for CrsId {
    fn default() -> Self {
        CrsId::Wgs84
    }
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrsId::Wgs84 => write!(f, "WGS84"),
            CrsId::OgcCrs84 => write!(f, "OGC:CRS84"),
            CrsId::Epsg(code) => write!(f, "EPSG:{}", code),
        }
    }
}

impl FromStr for CrsId {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CrsId {
    type Error = CrsParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CrsId> for String {
    fn from(crs: CrsId) -> Self {
        crs.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("unknown CRS: {0}")]
    UnknownCrs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_forms() {
        assert_eq!(CrsId::parse("WGS84").unwrap(), CrsId::Wgs84);
        assert_eq!(CrsId::parse("OGC:CRS84").unwrap(), CrsId::OgcCrs84);
        assert_eq!(CrsId::parse("EPSG:3857").unwrap(), CrsId::Epsg(3857));
        assert_eq!(CrsId::parse("EPSG:32612").unwrap(), CrsId::Epsg(32612));
        assert_eq!(CrsId::parse("EPSG:32712").unwrap(), CrsId::Epsg(32712));
        // Short form passes through unchanged, even for 4326.
        assert_eq!(CrsId::parse("EPSG:4326").unwrap(), CrsId::Epsg(4326));
    }

    #[test]
    fn test_parse_uris() {
        assert_eq!(
            CrsId::parse("http://www.opengis.net/def/crs/EPSG/0/4326").unwrap(),
            CrsId::Wgs84
        );
        assert_eq!(
            CrsId::parse("http://www.opengis.net/def/crs/OGC/1.3/CRS84").unwrap(),
            CrsId::OgcCrs84
        );
        assert_eq!(
            CrsId::parse("http://www.opengis.net/def/crs/EPSG/0/3857").unwrap(),
            CrsId::Epsg(3857)
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert!(CrsId::parse("EPSG:99999").is_err());
        assert!(CrsId::parse("utm-12n").is_err());
        assert!(CrsId::parse("http://www.opengis.net/def/crs/EPSG/0/99999").is_err());
    }

    #[test]
    fn test_uri_round_trip() {
        // Every short id except the aliased EPSG:4326 survives id -> uri -> id.
        for code in available_epsg_codes() {
            if code == 4326 {
                continue;
            }
            let id = CrsId::Epsg(code);
            assert_eq!(CrsId::parse(&id.uri()).unwrap(), id);
        }
        assert_eq!(CrsId::parse(&CrsId::Wgs84.uri()).unwrap(), CrsId::Wgs84);
        assert_eq!(CrsId::parse(&CrsId::OgcCrs84.uri()).unwrap(), CrsId::OgcCrs84);

        // The 4326 URI is shared and resolves to WGS84.
        assert_eq!(CrsId::parse(&CrsId::Epsg(4326).uri()).unwrap(), CrsId::Wgs84);
    }

    #[test]
    fn test_uri_of_known_uri_round_trip() {
        for code in available_epsg_codes() {
            let uri = format!("http://www.opengis.net/def/crs/EPSG/0/{}", code);
            assert_eq!(CrsId::parse(&uri).unwrap().uri(), uri);
        }
        let uri = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";
        assert_eq!(CrsId::parse(uri).unwrap().uri(), uri);
    }

    #[test]
    fn test_is_geographic() {
        assert!(CrsId::Wgs84.is_geographic());
        assert!(CrsId::OgcCrs84.is_geographic());
        assert!(!CrsId::Epsg(3035).is_geographic());
        assert!(CrsId::Wgs84.is_wgs84());
        assert!(!CrsId::OgcCrs84.is_wgs84());
    }

    #[test]
    fn test_display() {
        assert_eq!(CrsId::Wgs84.to_string(), "WGS84");
        assert_eq!(CrsId::Epsg(3857).to_string(), "EPSG:3857");
    }
}
