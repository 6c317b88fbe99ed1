#![deny(warnings)]

//! Facility map model: areas, equipment pins, hazard zones, and the layer
//! visibility and hit-testing rules shared by the 2D and 3D map views.
//!
//! Positions are normalized map coordinates in `[0, 1]`, origin top-left.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Body text for areas that carry no summary of their own.
pub const GENERIC_AREA_TEXT: &str = "This area is linked to modules, tags, and scenarios (expandable).";

/// A point in normalized map coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    fn distance_sq(&self, other: &Point2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Project a normalized point onto a square ground plane of side `size`
/// centred on the origin. Returns `(x, z)` in world units.
pub fn to_world(p: Point2, size: f64) -> (f64, f64) {
    ((p.x - 0.5) * size, (p.y - 0.5) * size)
}

/// A clickable facility area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Facility document: `{ name, areas: [...] }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FacilityCatalog {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub areas: Vec<Area>,
}

/// Free-form metadata value on an equipment record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Flag(b) => write!(f, "{b}"),
            MetaValue::Number(n) => write!(f, "{n}"),
            MetaValue::Text(s) => f.write_str(s),
        }
    }
}

/// An equipment item shown as a pin (2D) or model (3D).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, MetaValue>,
    #[serde(default)]
    pub hse: Vec<String>,
    pub pos2d: Point2,
    /// Optional 3D model path; views fall back to a marker without it.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub scale: Option<f64>,
}

/// Hazardous-area classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ZoneClass {
    Zone0,
    Zone1,
    Zone2,
}

impl ZoneClass {
    /// Parse a catalog label; anything unrecognised is treated as Zone 2.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Zone 0" => ZoneClass::Zone0,
            "Zone 1" => ZoneClass::Zone1,
            _ => ZoneClass::Zone2,
        }
    }

    /// Display color as 0xRRGGBB.
    pub fn color(self) -> u32 {
        match self {
            ZoneClass::Zone0 => 0xff2d2d,
            ZoneClass::Zone1 => 0xffa500,
            ZoneClass::Zone2 => 0xfff000,
        }
    }

    pub fn layer(self) -> Layer {
        match self {
            ZoneClass::Zone0 => Layer::Zone0,
            ZoneClass::Zone1 => Layer::Zone1,
            ZoneClass::Zone2 => Layer::Zone2,
        }
    }
}

/// A hazard zone polygon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HazardZone {
    pub id: String,
    pub name: String,
    /// Classification label as written in the catalog, e.g. "Zone 1".
    pub zone: String,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub hse: Vec<String>,
    pub points: Vec<Point2>,
}

impl HazardZone {
    pub fn class(&self) -> ZoneClass {
        ZoneClass::from_label(&self.zone)
    }

    pub fn contains(&self, p: Point2) -> bool {
        point_in_polygon(p, &self.points)
    }

    /// Area centroid of the polygon. Falls back to the vertex mean when the
    /// polygon has no area; `None` without points.
    pub fn centroid(&self) -> Option<Point2> {
        let n = self.points.len();
        if n == 0 {
            return None;
        }
        let (mut area2, mut cx, mut cy) = (0.0, 0.0, 0.0);
        for i in 0..n {
            let (a, b) = (self.points[i], self.points[(i + 1) % n]);
            let cross = a.x * b.y - b.x * a.y;
            area2 += cross;
            cx += (a.x + b.x) * cross;
            cy += (a.y + b.y) * cross;
        }
        if area2.abs() < f64::EPSILON {
            let (sx, sy) = self
                .points
                .iter()
                .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
            return Some(Point2::new(sx / n as f64, sy / n as f64));
        }
        Some(Point2::new(cx / (3.0 * area2), cy / (3.0 * area2)))
    }
}

/// Even-odd ray casting test. Polygons with fewer than three points contain nothing.
pub fn point_in_polygon(p: Point2, poly: &[Point2]) -> bool {
    if poly.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        let (a, b) = (poly[i], poly[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Toggleable map layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Layer {
    Zone0,
    Zone1,
    Zone2,
    Equipment,
}

impl Layer {
    pub const ALL: [Layer; 4] = [Layer::Zone0, Layer::Zone1, Layer::Zone2, Layer::Equipment];
}

/// Per-layer visibility; everything starts visible.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerVisibility {
    hidden: BTreeSet<Layer>,
}

impl LayerVisibility {
    pub fn is_visible(&self, layer: Layer) -> bool {
        !self.hidden.contains(&layer)
    }

    pub fn set(&mut self, layer: Layer, visible: bool) {
        if visible {
            self.hidden.remove(&layer);
        } else {
            self.hidden.insert(layer);
        }
    }
}

/// Item under a map click.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MapItem<'a> {
    Equipment(&'a Equipment),
    Zone(&'a HazardZone),
}

/// Info panel content for a clicked item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InfoCard {
    pub title: String,
    pub category: Option<String>,
    pub purpose: Option<String>,
    pub meta: Vec<(String, String)>,
    pub hse: Vec<String>,
}

impl InfoCard {
    pub fn for_item(item: MapItem<'_>) -> Self {
        match item {
            MapItem::Equipment(e) => Self {
                title: title_or_unknown(&e.name),
                category: e.category.clone(),
                purpose: e.purpose.clone(),
                meta: e.meta.iter().map(|(k, v)| (k.clone(), v.to_string())).collect(),
                hse: e.hse.clone(),
            },
            MapItem::Zone(z) => Self {
                title: title_or_unknown(&z.name),
                category: Some("Hazard Zone".to_string()),
                purpose: z.purpose.clone(),
                meta: vec![("Zone".to_string(), z.zone.clone())],
                hse: z.hse.clone(),
            },
        }
    }
}

impl fmt::Display for InfoCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        if let Some(c) = &self.category {
            writeln!(f, "Category: {c}")?;
        }
        if let Some(p) = &self.purpose {
            writeln!(f, "Purpose: {p}")?;
        }
        for (k, v) in &self.meta {
            writeln!(f, "{k}: {v}")?;
        }
        if !self.hse.is_empty() {
            writeln!(f, "HSE:")?;
            for h in &self.hse {
                writeln!(f, "  - {h}")?;
            }
        }
        Ok(())
    }
}

fn title_or_unknown(name: &str) -> String {
    if name.trim().is_empty() {
        "Unknown".to_string()
    } else {
        name.to_string()
    }
}

/// Title and body shown when an area is clicked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AreaInfo {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum FacilityError {
    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("hazard zone {0} needs at least three points")]
    DegenerateZone(String),
    #[error("{0} has a non-finite coordinate")]
    NonFinite(String),
}

/// The facility map with its layers and selection rules.
#[derive(Clone, Debug, Default)]
pub struct FacilityMap {
    facility: FacilityCatalog,
    equipment: Vec<Equipment>,
    zones: Vec<HazardZone>,
    visibility: LayerVisibility,
    pin_radius: f64,
}

impl FacilityMap {
    pub const DEFAULT_PIN_RADIUS: f64 = 0.02;

    /// Build a map, rejecting duplicate ids, degenerate zones, and bad coordinates.
    pub fn new(
        facility: FacilityCatalog,
        equipment: Vec<Equipment>,
        zones: Vec<HazardZone>,
    ) -> Result<Self, FacilityError> {
        check_unique("area", facility.areas.iter().map(|a| a.id.as_str()))?;
        check_unique("equipment", equipment.iter().map(|e| e.id.as_str()))?;
        check_unique("zone", zones.iter().map(|z| z.id.as_str()))?;
        for e in &equipment {
            if !e.pos2d.is_finite() {
                return Err(FacilityError::NonFinite(e.id.clone()));
            }
        }
        for z in &zones {
            if z.points.len() < 3 {
                return Err(FacilityError::DegenerateZone(z.id.clone()));
            }
            if !z.points.iter().all(Point2::is_finite) {
                return Err(FacilityError::NonFinite(z.id.clone()));
            }
        }
        debug!(
            areas = facility.areas.len(),
            equipment = equipment.len(),
            zones = zones.len(),
            "facility map built"
        );
        Ok(Self {
            facility,
            equipment,
            zones,
            visibility: LayerVisibility::default(),
            pin_radius: Self::DEFAULT_PIN_RADIUS,
        })
    }

    pub fn with_pin_radius(mut self, radius: f64) -> Self {
        self.pin_radius = radius.max(0.0);
        self
    }

    pub fn facility(&self) -> &FacilityCatalog {
        &self.facility
    }

    pub fn equipment(&self) -> &[Equipment] {
        &self.equipment
    }

    pub fn zones(&self) -> &[HazardZone] {
        &self.zones
    }

    pub fn visibility(&self) -> &LayerVisibility {
        &self.visibility
    }

    pub fn set_layer_visible(&mut self, layer: Layer, visible: bool) {
        self.visibility.set(layer, visible);
    }

    /// Zones grouped under `layer`, in catalog order.
    pub fn zones_in_layer(&self, layer: Layer) -> impl Iterator<Item = &HazardZone> {
        self.zones.iter().filter(move |z| z.class().layer() == layer)
    }

    /// Info for an area click.
    pub fn area_info(&self, area_id: &str) -> AreaInfo {
        match self.facility.areas.iter().find(|a| a.id == area_id) {
            Some(area) => AreaInfo {
                title: area.name.clone(),
                body: area
                    .summary
                    .clone()
                    .unwrap_or_else(|| GENERIC_AREA_TEXT.to_string()),
            },
            None => AreaInfo {
                title: "Unknown area".to_string(),
                body: "Area data not loaded.".to_string(),
            },
        }
    }

    /// Topmost visible item at `p`.
    ///
    /// Equipment pins sit above zones; the nearest pin within the pin radius
    /// wins. Among overlapping zones the later one in the catalog wins.
    pub fn hit_test(&self, p: Point2) -> Option<MapItem<'_>> {
        if self.visibility.is_visible(Layer::Equipment) {
            let r2 = self.pin_radius * self.pin_radius;
            let pin = self
                .equipment
                .iter()
                .map(|e| (e, e.pos2d.distance_sq(&p)))
                .filter(|(_, d)| *d <= r2)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((e, _)) = pin {
                return Some(MapItem::Equipment(e));
            }
        }
        self.zones
            .iter()
            .rev()
            .filter(|z| self.visibility.is_visible(z.class().layer()))
            .find(|z| z.contains(p))
            .map(MapItem::Zone)
    }

    /// Case-insensitive substring search over id, name, and category.
    pub fn search_equipment(&self, query: &str) -> Vec<&Equipment> {
        let q = query.trim().to_lowercase();
        self.equipment
            .iter()
            .filter(|e| {
                q.is_empty()
                    || e.id.to_lowercase().contains(&q)
                    || e.name.to_lowercase().contains(&q)
                    || e
                        .category
                        .as_deref()
                        .is_some_and(|c| c.to_lowercase().contains(&q))
            })
            .collect()
    }
}

fn check_unique<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), FacilityError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(FacilityError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn square(id: &str, zone: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> HazardZone {
        HazardZone {
            id: id.to_string(),
            name: format!("{id} name"),
            zone: zone.to_string(),
            purpose: Some("purpose".into()),
            hse: vec!["Gas detector required".into()],
            points: vec![
                Point2::new(x0, y0),
                Point2::new(x1, y0),
                Point2::new(x1, y1),
                Point2::new(x0, y1),
            ],
        }
    }

    fn pin(id: &str, x: f64, y: f64) -> Equipment {
        Equipment {
            id: id.to_string(),
            name: format!("{id} Scrubber"),
            category: Some("Vessel".into()),
            purpose: None,
            meta: BTreeMap::from([("Tag".to_string(), MetaValue::Text("LSHH_C101".into()))]),
            hse: vec![],
            pos2d: Point2::new(x, y),
            model: None,
            scale: None,
        }
    }

    fn map() -> FacilityMap {
        let facility = FacilityCatalog {
            name: "GC".into(),
            areas: vec![
                Area {
                    id: "cru".into(),
                    name: "CRU".into(),
                    summary: Some("Compression".into()),
                },
                Area {
                    id: "flare".into(),
                    name: "Flare".into(),
                    summary: None,
                },
            ],
        };
        FacilityMap::new(
            facility,
            vec![pin("C-101", 0.5, 0.5), pin("TK-01", 0.25, 0.7)],
            vec![
                square("Z2", "Zone 2", 0.0, 0.0, 1.0, 1.0),
                square("Z1", "Zone 1", 0.4, 0.4, 0.6, 0.6),
            ],
        )
        .unwrap()
    }

    #[test]
    fn classification_falls_back_to_zone2() {
        assert_eq!(ZoneClass::from_label("Zone 0"), ZoneClass::Zone0);
        assert_eq!(ZoneClass::from_label("Zone 1"), ZoneClass::Zone1);
        assert_eq!(ZoneClass::from_label("Class I Div 2"), ZoneClass::Zone2);
        assert_eq!(ZoneClass::Zone0.color(), 0xff2d2d);
        assert_eq!(ZoneClass::Zone2.layer(), Layer::Zone2);
    }

    #[test]
    fn to_world_centres_the_plane() {
        assert_eq!(to_world(Point2::new(0.5, 0.5), 100.0), (0.0, 0.0));
        assert_eq!(to_world(Point2::new(0.0, 1.0), 100.0), (-50.0, 50.0));
    }

    #[test]
    fn pins_beat_zones_and_top_zone_wins() {
        let m = map();
        assert!(matches!(m.hit_test(Point2::new(0.505, 0.5)), Some(MapItem::Equipment(e)) if e.id == "C-101"));
        assert!(matches!(m.hit_test(Point2::new(0.45, 0.45)), Some(MapItem::Zone(z)) if z.id == "Z1"));
        assert!(matches!(m.hit_test(Point2::new(0.9, 0.9)), Some(MapItem::Zone(z)) if z.id == "Z2"));
        assert_eq!(m.hit_test(Point2::new(1.5, 1.5)), None);
    }

    #[test]
    fn hidden_layers_are_not_hit() {
        let mut m = map();
        m.set_layer_visible(Layer::Equipment, false);
        m.set_layer_visible(Layer::Zone1, false);
        assert!(matches!(m.hit_test(Point2::new(0.5, 0.5)), Some(MapItem::Zone(z)) if z.id == "Z2"));
        m.set_layer_visible(Layer::Zone2, false);
        assert_eq!(m.hit_test(Point2::new(0.5, 0.5)), None);
        m.set_layer_visible(Layer::Equipment, true);
        assert!(matches!(m.hit_test(Point2::new(0.5, 0.5)), Some(MapItem::Equipment(_))));
    }

    #[test]
    fn zones_group_by_layer() {
        let m = map();
        let ids: Vec<_> = m.zones_in_layer(Layer::Zone1).map(|z| z.id.as_str()).collect();
        assert_eq!(ids, vec!["Z1"]);
        assert_eq!(m.zones_in_layer(Layer::Zone0).count(), 0);
    }

    #[test]
    fn area_info_variants() {
        let m = map();
        assert_eq!(m.area_info("cru").body, "Compression");
        assert_eq!(m.area_info("flare").body, GENERIC_AREA_TEXT);
        let unknown = m.area_info("nowhere");
        assert_eq!(unknown.title, "Unknown area");
        assert_eq!(unknown.body, "Area data not loaded.");
    }

    #[test]
    fn info_cards_for_zone_and_equipment() {
        let m = map();
        let zone = InfoCard::for_item(MapItem::Zone(&m.zones()[1]));
        assert_eq!(zone.category.as_deref(), Some("Hazard Zone"));
        assert_eq!(zone.meta, vec![("Zone".to_string(), "Zone 1".to_string())]);
        let eq = InfoCard::for_item(MapItem::Equipment(&m.equipment()[0]));
        assert_eq!(eq.meta, vec![("Tag".to_string(), "LSHH_C101".to_string())]);
        let text = eq.to_string();
        assert!(text.starts_with("C-101 Scrubber\nCategory: Vessel\n"));
    }

    #[test]
    fn search_is_case_insensitive() {
        let m = map();
        let hits: Vec<_> = m.search_equipment("scrub").iter().map(|e| e.id.as_str()).collect();
        assert_eq!(hits, vec!["C-101", "TK-01"]);
        assert_eq!(m.search_equipment("tk-").len(), 1);
        assert_eq!(m.search_equipment("VESSEL").len(), 2);
        assert_eq!(m.search_equipment("  ").len(), 2);
        assert!(m.search_equipment("pump").is_empty());
    }

    #[test]
    fn rejects_bad_catalog_entries() {
        let dup = FacilityMap::new(
            FacilityCatalog::default(),
            vec![pin("P", 0.1, 0.1), pin("P", 0.2, 0.2)],
            vec![],
        );
        assert!(matches!(dup, Err(FacilityError::DuplicateId { kind: "equipment", .. })));

        let mut degenerate = square("Z", "Zone 1", 0.0, 0.0, 1.0, 1.0);
        degenerate.points.truncate(2);
        assert_eq!(
            FacilityMap::new(FacilityCatalog::default(), vec![], vec![degenerate]).err(),
            Some(FacilityError::DegenerateZone("Z".into()))
        );
    }

    #[test]
    fn zone_centroid_is_area_weighted() {
        let c = square("Z", "Zone 1", 0.2, 0.4, 0.6, 0.8).centroid().unwrap();
        assert!((c.x - 0.4).abs() < 1e-12 && (c.y - 0.6).abs() < 1e-12);

        let mut tri = square("T", "Zone 1", 0.0, 0.0, 0.0, 0.0);
        tri.points = vec![Point2::new(0.0, 0.0), Point2::new(0.9, 0.0), Point2::new(0.0, 0.3)];
        let c = tri.centroid().unwrap();
        assert!((c.x - 0.3).abs() < 1e-12 && (c.y - 0.1).abs() < 1e-12);

        let mut line = tri.clone();
        line.points = vec![Point2::new(0.0, 0.0), Point2::new(0.5, 0.5), Point2::new(1.0, 1.0)];
        assert_eq!(line.centroid(), Some(Point2::new(0.5, 0.5)));
        line.points.clear();
        assert_eq!(line.centroid(), None);
    }

    #[test]
    fn equipment_meta_accepts_mixed_values() {
        let json = r#"{"id":"X","name":"X","meta":{"Rating":600,"Ex":true,"Area":"CRU"},"pos2d":{"x":0.1,"y":0.2}}"#;
        let e: Equipment = serde_json::from_str(json).unwrap();
        let card = InfoCard::for_item(MapItem::Equipment(&e));
        assert_eq!(
            card.meta,
            vec![
                ("Area".to_string(), "CRU".to_string()),
                ("Ex".to_string(), "true".to_string()),
                ("Rating".to_string(), "600".to_string()),
            ]
        );
    }

    proptest! {
        #[test]
        fn rectangle_containment_matches_bounds(x in 0.0f64..1.0, y in 0.0f64..1.0) {
            let z = square("R", "Zone 1", 0.2, 0.3, 0.7, 0.8);
            let expected = x > 0.2 && x < 0.7 && y > 0.3 && y < 0.8;
            // Edges are ambiguous under even-odd; only check strict interior/exterior.
            let on_edge = [0.2, 0.7].iter().any(|e| (x - e).abs() < 1e-9)
                || [0.3, 0.8].iter().any(|e| (y - e).abs() < 1e-9);
            prop_assume!(!on_edge);
            prop_assert_eq!(z.contains(Point2::new(x, y)), expected);
        }
    }
}
