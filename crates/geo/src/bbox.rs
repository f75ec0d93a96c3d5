//! Bounding-Box-Stufe
//!
//! Eine Geometrie passiert, wenn mindestens eine ihrer Positionen in der Box
//! liegt (Rand inklusive). Eine `FeatureCollection` passiert, wenn eines
//! ihrer Features passiert. Nicht-Geometrien, unbekannte Geometrietypen und
//! fehlerhafte Koordinaten werden nie verworfen.

use relais_bridge::FilterStufe;
use serde_json::Value;

use crate::geometrie;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub links: f64,
    pub unten: f64,
    pub rechts: f64,
    pub oben: f64,
}

impl Bbox {
    pub fn neu(links: f64, unten: f64, rechts: f64, oben: f64) -> Self {
        Self {
            links,
            unten,
            rechts,
            oben,
        }
    }

    pub fn enthaelt(&self, (x, y): (f64, f64)) -> bool {
        x >= self.links && x <= self.rechts && y >= self.unten && y <= self.oben
    }

    /// Entscheidet ob der Inhalt durchgelassen wird
    pub fn durchlassen(&self, inhalt: &Value) -> bool {
        if let Some(features) = geometrie::features(inhalt) {
            return features.iter().any(|f| self.durchlassen(f));
        }
        let Some((koordinaten, tiefe)) = geometrie::geometrie(inhalt).and_then(geometrie::koordinaten)
        else {
            return true;
        };
        match geometrie::positionen(koordinaten, tiefe) {
            Some(positionen) => positionen.into_iter().any(|p| self.enthaelt(p)),
            None => {
                tracing::debug!("Fehlerhafte Geometrie, BBOX nicht angewendet");
                true
            }
        }
    }
}

/// Filterstufe `bbox`
#[derive(Debug)]
pub struct BboxStufe {
    bbox: Bbox,
}

impl BboxStufe {
    pub const NAME: &'static str = "bbox";

    pub fn neu(bbox: Bbox) -> Self {
        Self { bbox }
    }

    pub fn bbox(&self) -> Bbox {
        self.bbox
    }
}

impl FilterStufe for BboxStufe {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn rang(&self) -> u8 {
        10
    }

    fn anwenden(&self, inhalt: &mut Value) -> bool {
        self.bbox.durchlassen(inhalt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(typ: &str, koordinaten: Value) -> Value {
        json!({
            "type": "Feature",
            "properties": {},
            "geometry": {"type": typ, "coordinates": koordinaten},
        })
    }

    fn box_1234() -> Bbox {
        Bbox::neu(1.0, 2.0, 3.0, 4.0)
    }

    #[test]
    fn punkte() {
        let bbox = box_1234();
        assert!(bbox.durchlassen(&feature("Point", json!([2.1, 3.5]))));
        assert!(!bbox.durchlassen(&feature("Point", json!([0.1, 3.5]))));
    }

    #[test]
    fn rand_gehoert_zur_box() {
        let bbox = box_1234();
        assert!(bbox.durchlassen(&feature("Point", json!([1, 2]))));
        assert!(bbox.durchlassen(&feature("Point", json!([3, 4]))));
        assert!(!bbox.durchlassen(&feature("Point", json!([3.0001, 4]))));
    }

    #[test]
    fn linien_und_polygone() {
        let bbox = box_1234();
        assert!(bbox.durchlassen(&feature("Polygon", json!([[[0.1, 3.5], [2.1, 3.4]]]))));
        assert!(!bbox.durchlassen(&feature("Polygon", json!([[[0.1, 3.5], [5.1, 3.4]]]))));
        assert!(!bbox.durchlassen(&feature("LineString", json!([[0.1, 3.5], [5.1, 3.4]]))));
        assert!(bbox.durchlassen(&feature("LineString", json!([[0.1, 3.5], [2.1, 3.4]]))));
    }

    #[test]
    fn multi_geometrien() {
        let bbox = box_1234();
        assert!(!bbox.durchlassen(&feature("MultiLineString", json!([[[0.1, 3.5], [5.1, 3.4]]]))));
        assert!(bbox.durchlassen(&feature("MultiLineString", json!([[[0.1, 3.5], [2.1, 3.4]]]))));
        assert!(bbox.durchlassen(&feature("MultiPoint", json!([[9, 9], [2, 3]]))));
        assert!(!bbox.durchlassen(&feature(
            "MultiPolygon",
            json!([[[[0, 0], [0, 1]]], [[[9, 9]]]])
        )));
    }

    #[test]
    fn nackte_geometrie() {
        let bbox = box_1234();
        assert!(!bbox.durchlassen(&json!({"type": "Point", "coordinates": [0, 0]})));
        assert!(bbox.durchlassen(&json!({"type": "Point", "coordinates": [2, 3]})));
    }

    #[test]
    fn nicht_geometrien_passieren() {
        let bbox = box_1234();
        assert!(bbox.durchlassen(&feature("Unknown", json!([[0.1, 3.5], [2.1, 3.4]]))));
        assert!(bbox.durchlassen(&json!("PONG")));
        assert!(bbox.durchlassen(&json!({"temp": 20})));
        assert!(bbox.durchlassen(&feature("Point", json!("kaputt"))));
    }

    #[test]
    fn feature_collection() {
        let bbox = box_1234();
        let draussen = feature("Point", json!([0.1, 3.5]));
        let drinnen = feature("Point", json!([2.1, 3.5]));

        let alle_draussen = json!({"type": "FeatureCollection", "features": [draussen.clone(), draussen.clone()]});
        assert!(!bbox.durchlassen(&alle_draussen));

        let gemischt = json!({"type": "FeatureCollection", "features": [draussen, drinnen]});
        assert!(bbox.durchlassen(&gemischt));

        let mit_fremdem = json!({"type": "FeatureCollection", "features": [{"temp": 1}]});
        assert!(bbox.durchlassen(&mit_fremdem));
    }

    #[test]
    fn stufe_veraendert_nichts() {
        let stufe = BboxStufe::neu(box_1234());
        let mut inhalt = feature("Point", json!([2.1, 3.5]));
        let vorher = inhalt.clone();
        assert!(stufe.anwenden(&mut inhalt));
        assert_eq!(inhalt, vorher);
        assert_eq!(stufe.name(), "bbox");
    }
}
