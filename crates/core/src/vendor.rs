//! Static vendor knowledge: tags, aliases, and detection hint tables
//!
//! Vendors are identified by string tags so the set can grow without a
//! schema change. Detection hints are plain tables of `(suffix, vendor)`
//! and `(marker, vendor)` pairs so new vendors extend data, not code.

/// ICS feed pseudo-vendor
pub const VENDOR_ICS: &str = "ics";
/// School activity-scheduler HTML vendor
pub const VENDOR_RSCHOOL: &str = "rschool";
/// College athletics HTML vendor (umbrella over sidearmsports/prestosports)
pub const VENDOR_SIDEARM: &str = "sidearm";
/// Generic table-scraping fallback
pub const VENDOR_GENERIC: &str = "generic";
/// Connected-account Google calendar
pub const VENDOR_GOOGLE: &str = "google";

/// Umbrella tags expanded into the concrete vendor ids stored in the
/// allowlist tables
const VENDOR_ALIASES: &[(&str, &[&str])] = &[
    (VENDOR_SIDEARM, &["sidearm", "sidearmsports", "prestosports"]),
    (VENDOR_RSCHOOL, &["rschool", "rschooltoday"]),
];

/// Known host suffixes, strongest detection signal after content type
const SUFFIX_VENDORS: &[(&str, &str)] = &[
    ("sidearmsports.com", VENDOR_SIDEARM),
    ("prestosports.com", VENDOR_SIDEARM),
    ("rschooltoday.com", VENDOR_RSCHOOL),
    ("activityscheduler.com", VENDOR_RSCHOOL),
];

/// Known body markers: vendor names and JS globals their pages embed
const MARKER_VENDORS: &[(&str, &str)] = &[
    ("sidearmsports", VENDOR_SIDEARM),
    ("sidearm sports", VENDOR_SIDEARM),
    ("prestosports", VENDOR_SIDEARM),
    ("window.__SIDARM_DATA__", VENDOR_SIDEARM),
    ("rschooltoday", VENDOR_RSCHOOL),
    ("activity scheduler", VENDOR_RSCHOOL),
    ("window.__SCHEDULE_DATA__", VENDOR_RSCHOOL),
];

/// Expand a vendor tag through the alias table
///
/// Returns `None` when the input is empty, meaning "match any vendor".
pub fn expand_vendor_aliases(vendor: Option<&str>) -> Option<Vec<String>> {
    let vendor = vendor?.trim();
    if vendor.is_empty() {
        return None;
    }
    for (umbrella, members) in VENDOR_ALIASES {
        if umbrella.eq_ignore_ascii_case(vendor) {
            return Some(members.iter().map(|m| (*m).to_string()).collect());
        }
    }
    Some(vec![vendor.to_ascii_lowercase()])
}

/// Vendor inferred from a hostname suffix, if any
pub fn vendor_for_host(host: &str) -> Option<&'static str> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    SUFFIX_VENDORS.iter().find_map(|(suffix, vendor)| {
        let matches = host == *suffix || host.ends_with(&format!(".{suffix}"));
        matches.then_some(*vendor)
    })
}

/// Vendor inferred from a page-body marker, if any
pub fn vendor_for_marker(body: &str) -> Option<&'static str> {
    let lowered = body.to_ascii_lowercase();
    MARKER_VENDORS.iter().find_map(|(marker, vendor)| {
        lowered.contains(&marker.to_ascii_lowercase()).then_some(*vendor)
    })
}

/// Markers for a specific vendor, used by connector `can_handle` probes
pub fn markers_for_vendor(vendor: &str) -> Vec<&'static str> {
    MARKER_VENDORS
        .iter()
        .filter(|(_, v)| *v == vendor)
        .map(|(marker, _)| *marker)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_umbrella_expansion() {
        let expanded = expand_vendor_aliases(Some("sidearm")).unwrap();
        assert!(expanded.contains(&"sidearmsports".to_string()));
        assert!(expanded.contains(&"prestosports".to_string()));
    }

    #[test]
    fn test_plain_vendor_expansion() {
        let expanded = expand_vendor_aliases(Some("ics")).unwrap();
        assert_eq!(expanded, vec!["ics".to_string()]);
    }

    #[test]
    fn test_empty_means_any() {
        assert!(expand_vendor_aliases(None).is_none());
        assert!(expand_vendor_aliases(Some("")).is_none());
    }

    #[test]
    fn test_vendor_for_host_suffix() {
        assert_eq!(vendor_for_host("athletics.sidearmsports.com"), Some(VENDOR_SIDEARM));
        assert_eq!(vendor_for_host("rschooltoday.com"), Some(VENDOR_RSCHOOL));
        assert_eq!(vendor_for_host("rschooltoday.com."), Some(VENDOR_RSCHOOL));
        assert_eq!(vendor_for_host("example.com"), None);
        // A suffix must match on a label boundary
        assert_eq!(vendor_for_host("evilsidearmsports.com"), None);
    }

    #[test]
    fn test_vendor_for_marker() {
        assert_eq!(
            vendor_for_marker("<script>window.__SIDARM_DATA__ = {}</script>"),
            Some(VENDOR_SIDEARM)
        );
        assert_eq!(vendor_for_marker("powered by RSchoolToday"), Some(VENDOR_RSCHOOL));
        assert_eq!(vendor_for_marker("nothing here"), None);
    }
}
