//! Built-in EPSG registry.
//!
//! Maps the registry codes used in day-to-day vector work to PROJ.4
//! definitions understood by proj4rs. Codes outside this table must be
//! given as PROJ strings.

pub(crate) const WGS84: &str = "+proj=longlat +datum=WGS84 +no_defs";

const GRS80_TOWGS84: &str = "+ellps=GRS80 +towgs84=0,0,0,0,0,0,0";

/// Resolve an EPSG code to its PROJ.4 definition.
pub(crate) fn lookup(code: u32) -> Option<String> {
    let proj = match code {
        4326 => WGS84.to_string(),
        4269 | 4258 => format!("+proj=longlat {} +no_defs", GRS80_TOWGS84),
        3857 => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
            .to_string(),
        5070 => format!(
            "+proj=aea +lat_0=23 +lon_0=-96 +lat_1=29.5 +lat_2=45.5 +x_0=0 +y_0=0 {} +units=m +no_defs",
            GRS80_TOWGS84
        ),
        3035 => format!(
            "+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +y_0=3210000 {} +units=m +no_defs",
            GRS80_TOWGS84
        ),
        2154 => format!(
            "+proj=lcc +lat_0=46.5 +lon_0=3 +lat_1=49 +lat_2=44 +x_0=700000 +y_0=6600000 {} +units=m +no_defs",
            GRS80_TOWGS84
        ),
        _ => {
            let (zone, south, datum) = parse_utm_epsg(code)?;
            format!(
                "+proj=utm +zone={}{} {} +units=m +no_defs",
                zone,
                if south { " +south" } else { "" },
                datum
            )
        }
    };
    Some(proj)
}

/// Parse an EPSG code into UTM zone info: `Some((zone, is_south, datum))`.
///
/// - EPSG 326xx → WGS84 zone xx, North
/// - EPSG 327xx → WGS84 zone xx, South
/// - EPSG 269xx → NAD83 zone xx (1–23)
/// - EPSG 258xx → ETRS89 zone xx (28–38)
fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool, &'static str)> {
    match epsg {
        32601..=32660 => Some((epsg - 32600, false, "+datum=WGS84")),
        32701..=32760 => Some((epsg - 32700, true, "+datum=WGS84")),
        26901..=26923 => Some((epsg - 26900, false, GRS80_TOWGS84)),
        25828..=25838 => Some((epsg - 25800, false, GRS80_TOWGS84)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utm_codes() {
        assert_eq!(parse_utm_epsg(32618), Some((18, false, "+datum=WGS84")));
        assert_eq!(parse_utm_epsg(32733).map(|z| (z.0, z.1)), Some((33, true)));
        assert_eq!(parse_utm_epsg(26918).map(|z| z.0), Some(18));
        assert_eq!(parse_utm_epsg(32661), None);
    }

    #[test]
    fn test_lookup_builds_south_flag() {
        let def = lookup(32733).unwrap();
        assert!(def.contains("+zone=33 +south"));
        assert!(lookup(4326).unwrap().contains("longlat"));
        assert!(lookup(9999).is_none());
    }
}
