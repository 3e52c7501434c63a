//! Interactive Leaflet map of development hotspots.
//!
//! The page is a single self-contained HTML file: marker data is embedded
//! as JSON and Leaflet plus the basemap tiles load from public CDNs.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use cambs_market_analytics::SectorClassifier;
use cambs_market_config::ensure_dir;
use cambs_market_models::{SectorAggregate, SiteRecord};
use serde::Serialize;

use crate::{VisualizeError, escape_html};

/// Metres of circle radius per square root of a sector's dwellings.
const RADIUS_SCALE_M: f64 = 100.0;

const PAGE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<meta name="viewport" content="width=device-width, initial-scale=1.0" />
<title>Cambridgeshire Development Hotspots</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>html, body, #map { height: 100%; margin: 0; }</style>
</head>
<body>
<div id="map"></div>
<script>
const data = __MAP_DATA__;
const map = L.map('map').setView(data.center, data.zoom);
L.tileLayer('https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png', {
  attribution: '&copy; OpenStreetMap contributors &copy; CARTO',
  subdomains: 'abcd',
  maxZoom: 20
}).addTo(map);

const hotspots = L.featureGroup();
for (const h of data.hotspots) {
  L.circle([h.lat, h.lon], { radius: h.radius_m, color: h.color, fill: true, fillColor: h.color, fillOpacity: 0.5 })
    .bindPopup(h.popup, { maxWidth: 300 })
    .addTo(hotspots);
}
hotspots.addTo(map);

const projects = L.featureGroup();
for (const p of data.projects) {
  L.circleMarker([p.lat, p.lon], { radius: 3, color: 'navy', fill: true, fillColor: 'navy', fillOpacity: 0.8 })
    .bindPopup(p.popup)
    .addTo(projects);
}

L.control.layers(null, {
  'Development Hotspots (by Sector)': hotspots,
  'Individual Projects': projects
}).addTo(map);
</script>
</body>
</html>
"##;

/// One sector circle, centred on the mean position of the sector's sites.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotCircle {
    pub sector: String,
    pub lat: f64,
    pub lon: f64,
    pub radius_m: f64,
    pub color: &'static str,
    pub popup: String,
}

/// One individual site in the hidden-by-default projects layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectMarker {
    pub lat: f64,
    pub lon: f64,
    pub popup: String,
}

/// Everything the map page renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotMap {
    pub center: [f64; 2],
    pub zoom: u8,
    pub hotspots: Vec<HotspotCircle>,
    pub projects: Vec<ProjectMarker>,
}

/// Circle colour by sector size: small, medium or large.
#[must_use]
pub fn hotspot_color(total_dwellings: f64) -> &'static str {
    if total_dwellings <= 10.0 {
        "green"
    } else if total_dwellings <= 50.0 {
        "orange"
    } else {
        "red"
    }
}

#[allow(clippy::cast_possible_truncation)]
fn whole(value: f64) -> i64 {
    value.trunc() as i64
}

/// Builds the map layers from the hotspot table and the master site list.
///
/// Sites are re-classified against only the hotspot sectors. A sector's
/// circle sits at the mean coordinate of its sites; sectors with no placed
/// site are left off the map.
#[must_use]
pub fn build_map(
    hotspots: &[SectorAggregate],
    sites: &[SiteRecord],
    classifier: &SectorClassifier,
    center: [f64; 2],
    zoom: u8,
) -> HotspotMap {
    let hotspot_names: HashSet<&str> = hotspots.iter().map(|h| h.sector.as_str()).collect();
    let classifier = classifier.restricted_to(|s| hotspot_names.contains(s));

    let known: HashSet<&str> = classifier.sectors().iter().map(String::as_str).collect();
    for name in hotspot_names.iter().filter(|n| !known.contains(*n)) {
        log::warn!(" -> Hotspot sector {name} is not a configured sector; it will not be mapped");
    }

    let placed: Vec<(&str, &SiteRecord)> = sites
        .iter()
        .filter(|s| s.longitude.is_finite() && s.latitude.is_finite())
        .filter_map(|s| classifier.classify(&s.address).map(|sector| (sector, s)))
        .collect();

    let mut sums: BTreeMap<&str, (f64, f64, u32)> = BTreeMap::new();
    for (sector, site) in &placed {
        let entry = sums.entry(*sector).or_insert((0.0, 0.0, 0));
        entry.0 += site.longitude;
        entry.1 += site.latitude;
        entry.2 += 1;
    }

    let circles = hotspots
        .iter()
        .filter_map(|h| {
            let (lon_sum, lat_sum, count) = sums.get(h.sector.as_str())?;
            let count = f64::from(*count);
            Some(HotspotCircle {
                sector: h.sector.clone(),
                lat: lat_sum / count,
                lon: lon_sum / count,
                radius_m: h.total_dwellings_approved.sqrt() * RADIUS_SCALE_M,
                color: hotspot_color(h.total_dwellings_approved),
                popup: format!(
                    "<h3>{}</h3><b>Total Dwellings Approved:</b> {}",
                    escape_html(&h.sector),
                    whole(h.total_dwellings_approved)
                ),
            })
        })
        .collect::<Vec<_>>();

    let projects = placed
        .iter()
        .filter_map(|(_, site)| {
            let dwellings = site.dwellings.filter(|d| *d >= 1.0)?;
            Some(ProjectMarker {
                lat: site.latitude,
                lon: site.longitude,
                popup: format!(
                    "<b>Address:</b> {}<br><b>Dwellings:</b> {}",
                    escape_html(&site.address),
                    whole(dwellings)
                ),
            })
        })
        .collect::<Vec<_>>();

    log::info!(
        " -> Map has {} hotspot circles and {} project markers",
        circles.len(),
        projects.len()
    );

    HotspotMap {
        center,
        zoom,
        hotspots: circles,
        projects,
    }
}

/// Renders the map as a standalone HTML page.
///
/// # Errors
///
/// Returns [`VisualizeError::Json`] if the marker data cannot be
/// serialised.
pub fn render_html(map: &HotspotMap) -> Result<String, VisualizeError> {
    // A literal "</" inside a string would close the script element early.
    let data = serde_json::to_string(map)?.replace("</", "<\\/");
    Ok(PAGE_TEMPLATE.replace("__MAP_DATA__", &data))
}

/// Renders the map and writes it to `path`.
///
/// # Errors
///
/// Returns [`VisualizeError`] if rendering or the write fails.
pub fn write_map(map: &HotspotMap, path: &Path) -> Result<(), VisualizeError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).map_err(|e| VisualizeError::io(parent, e))?;
    }
    std::fs::write(path, render_html(map)?).map_err(|e| VisualizeError::io(path, e))?;

    log::info!("Interactive map saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(address: &str, lon: f64, lat: f64, dwellings: Option<f64>) -> SiteRecord {
        SiteRecord {
            site_reference: address.to_string(),
            address: address.to_string(),
            permission_date: None,
            hectares: None,
            planning_status: "permissioned".to_string(),
            dwellings,
            council: "South Cambridgeshire".to_string(),
            point: format!("POINT({lon} {lat})"),
            longitude: lon,
            latitude: lat,
        }
    }

    fn hotspot(sector: &str, total: f64) -> SectorAggregate {
        SectorAggregate {
            sector: sector.to_string(),
            total_dwellings_approved: total,
            number_of_projects: 1,
            percent_of_total_dwellings: 0.0,
        }
    }

    fn classifier() -> SectorClassifier {
        SectorClassifier::new(&["FULBOURN", "HISTON", "MILTON"])
    }

    fn sample_map() -> HotspotMap {
        let sites = vec![
            site("1 High St, Histon", 0.10, 52.25, Some(30.0)),
            site("2 High St, Histon", 0.12, 52.27, Some(0.0)),
            site("Fulbourn Road, Fulbourn", 0.22, 52.18, Some(4.0)),
            site("Milton Road, Milton", 0.16, 52.24, Some(120.0)),
            site("Regent St, Cambridge", 0.12, 52.20, Some(9.0)),
        ];
        let hotspots = vec![hotspot("HISTON", 60.0), hotspot("FULBOURN", 4.0)];
        build_map(&hotspots, &sites, &classifier(), [52.3, 0.1], 10)
    }

    #[test]
    fn color_thresholds() {
        assert_eq!(hotspot_color(10.0), "green");
        assert_eq!(hotspot_color(10.5), "orange");
        assert_eq!(hotspot_color(50.0), "orange");
        assert_eq!(hotspot_color(51.0), "red");
    }

    #[test]
    fn circles_sit_at_sector_centroids() {
        let map = sample_map();
        assert_eq!(map.hotspots.len(), 2);

        let histon = &map.hotspots[0];
        assert_eq!(histon.sector, "HISTON");
        assert!((histon.lon - 0.11).abs() < 1e-9);
        assert!((histon.lat - 52.26).abs() < 1e-9);
        assert!((histon.radius_m - 60.0_f64.sqrt() * 100.0).abs() < 1e-9);
        assert_eq!(histon.color, "red");
        assert_eq!(
            histon.popup,
            "<h3>HISTON</h3><b>Total Dwellings Approved:</b> 60"
        );

        assert_eq!(map.hotspots[1].color, "green");
    }

    #[test]
    fn projects_need_a_hotspot_sector_and_a_dwelling() {
        let map = sample_map();
        // Milton is not a hotspot, Cambridge has no sector, and one Histon
        // site has no dwellings.
        let popups: Vec<&str> = map.projects.iter().map(|p| p.popup.as_str()).collect();
        assert_eq!(
            popups,
            [
                "<b>Address:</b> 1 High St, Histon<br><b>Dwellings:</b> 30",
                "<b>Address:</b> Fulbourn Road, Fulbourn<br><b>Dwellings:</b> 4",
            ]
        );
    }

    #[test]
    fn sector_without_sites_is_skipped() {
        let map = build_map(
            &[hotspot("MILTON", 12.0)],
            &[site("Histon Road", 0.1, 52.2, Some(3.0))],
            &classifier(),
            [52.3, 0.1],
            10,
        );
        assert!(map.hotspots.is_empty());
        assert!(map.projects.is_empty());
    }

    #[test]
    fn html_escapes_addresses_and_embeds_data() {
        let map = build_map(
            &[hotspot("MILTON", 12.0)],
            &[site("<b>Plot</b> & </script> Milton", 0.1, 52.2, Some(3.0))],
            &classifier(),
            [52.3, 0.1],
            10,
        );
        let html = render_html(&map).unwrap();

        assert!(html.contains("&lt;b&gt;Plot&lt;/b&gt; &amp; &lt;/script&gt; Milton"));
        assert_eq!(html.matches("</script>").count(), 2);
        assert!(html.contains(r#""center":[52.3,0.1]"#));
        assert!(html.contains("Development Hotspots (by Sector)"));
        assert!(html.contains("Individual Projects"));
        assert!(!html.contains("__MAP_DATA__"));
    }

    #[test]
    fn writes_map_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("map.html");
        write_map(&sample_map(), &path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("<!DOCTYPE html>"));
    }
}
