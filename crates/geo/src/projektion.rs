//! Koordinatensysteme und Projektions-Stufe
//!
//! Eingehende Geometrien sind immer EPSG:4326. Eingebaut sind EPSG:4326 und
//! Web Mercator (EPSG:3857 mit den Aliasen 900913 und 3785).
//!
//! Achsenreihenfolge: standardmaessig lon/lat (x/y). Mit strikten Achsen
//! gilt die Reihenfolge der CRS-Definition, EPSG:4326 ist dann lat/lon.
//! EPSG:3857 ist in beiden Modi x/y.

use std::fmt;
use std::str::FromStr;

use relais_bridge::FilterStufe;
use serde_json::Value;

use crate::error::GeoFehler;
use crate::geometrie;

/// Grosse Halbachse des WGS84-Ellipsoids in Metern
pub const ERDRADIUS: f64 = 6_378_137.0;

/// Breitengrenze von Web Mercator; darueber waere `y` unendlich
pub const MAX_BREITE: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// EPSG:4326, geographisch in Grad
    Wgs84,
    /// EPSG:3857, Meter
    WebMercator,
}

impl Crs {
    pub fn code(self) -> &'static str {
        match self {
            Crs::Wgs84 => "EPSG:4326",
            Crs::WebMercator => "EPSG:3857",
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Crs {
    type Err = GeoFehler;

    /// Akzeptiert `epsg:NNNN` (Gross-/Kleinschreibung egal) und
    /// `urn:ogc:def:crs:EPSG::NNNN`
    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let normiert = code.trim().to_ascii_uppercase();
        let nummer = normiert
            .strip_prefix("EPSG:")
            .or_else(|| normiert.strip_prefix("URN:OGC:DEF:CRS:EPSG::"));
        match nummer {
            Some("4326") => Ok(Crs::Wgs84),
            Some("3857" | "900913" | "3785") => Ok(Crs::WebMercator),
            _ => Err(GeoFehler::UnbekanntesCrs(code.to_string())),
        }
    }
}

/// Web Mercator (spherisch) aus lon/lat in Grad
pub fn web_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_BREITE, MAX_BREITE);
    let x = ERDRADIUS * lon.to_radians();
    let y = ERDRADIUS * lat.to_radians().tan().asinh();
    (x, y)
}

/// Transformation von EPSG:4326 in ein Ziel-CRS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformation {
    ziel: Crs,
    strikte_achsen: bool,
}

impl Transformation {
    pub fn neu(ziel: Crs, strikte_achsen: bool) -> Self {
        Self {
            ziel,
            strikte_achsen,
        }
    }

    pub fn ziel(&self) -> Crs {
        self.ziel
    }

    /// Bildet eine Position in der jeweiligen Achsenreihenfolge ab
    pub fn position(&self, a: f64, b: f64) -> (f64, f64) {
        let (lon, lat) = if self.strikte_achsen { (b, a) } else { (a, b) };
        match self.ziel {
            Crs::Wgs84 if self.strikte_achsen => (lat, lon),
            Crs::Wgs84 => (lon, lat),
            Crs::WebMercator => web_mercator(lon, lat),
        }
    }

    /// Transformiert alle Geometrien im Inhalt
    ///
    /// Nicht-Geometrien und fehlerhafte Geometrien bleiben unveraendert.
    pub fn anwenden(&self, inhalt: &mut Value) {
        if let Some(features) = geometrie::features_mut(inhalt) {
            for feature in features {
                self.anwenden(feature);
            }
            return;
        }
        let Some(geo) = geometrie::geometrie_mut(inhalt) else {
            return;
        };
        let neu = geometrie::koordinaten(geo).and_then(|(koordinaten, tiefe)| {
            geometrie::positionen_abbilden(koordinaten, tiefe, &|a, b| self.position(a, b))
        });
        match neu {
            Some(koordinaten) => geo["coordinates"] = koordinaten,
            None => tracing::debug!(ziel = %self.ziel, "Geometrie nicht projiziert"),
        }
    }
}

/// Filterstufe `projektion`; verwirft nie
#[derive(Debug)]
pub struct ProjektionStufe {
    transformation: Transformation,
}

impl ProjektionStufe {
    pub const NAME: &'static str = "projektion";

    pub fn neu(transformation: Transformation) -> Self {
        Self { transformation }
    }

    pub fn ziel(&self) -> Crs {
        self.transformation.ziel()
    }
}

impl FilterStufe for ProjektionStufe {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Nach der Bounding-Box: gefiltert wird in Grad
    fn rang(&self) -> u8 {
        20
    }

    fn anwenden(&self, inhalt: &mut Value) -> bool {
        self.transformation.anwenden(inhalt);
        true
    }
}
