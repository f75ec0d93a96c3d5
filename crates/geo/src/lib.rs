//! relais-geo – Raeumliche Protokoll-Erweiterung
//!
//! Fuegt der Basis-Registry drei Verben hinzu, ohne die Bridge zu aendern:
//!
//! | Verb | Wirkung |
//! |---|---|
//! | `BBOX l u r o` | setzt die Bounding-Box-Stufe, ohne Argumente wird sie entfernt |
//! | `PROJECTION <crs>` | setzt die Projektions-Stufe, `epsg:4326` entfernt sie |
//! | `PGET key [ref] [client_ref] projection=<crs>` | Hash-Werte, projiziert |
//!
//! Beide Stufen wirken nur auf GeoJSON (`Feature`, `FeatureCollection` oder
//! nackte Geometrien). Alles andere wird unveraendert durchgereicht.

pub mod bbox;
pub mod error;
pub mod geometrie;
pub mod handlers;
pub mod projektion;

pub use bbox::{Bbox, BboxStufe};
pub use error::{GeoFehler, GeoResult};
pub use handlers::{BboxHandler, PgetHandler, ProjektionHandler};
pub use projektion::{Crs, ProjektionStufe, Transformation};

use relais_bridge::BefehlsRegistry;

/// Registriert `BBOX`, `PROJECTION` und `PGET`
///
/// Mit `strikte_achsen` folgt die Achsenreihenfolge der CRS-Definition
/// (EPSG:4326 = lat/lon), sonst gilt lon/lat.
pub fn registrieren(registry: &mut BefehlsRegistry, strikte_achsen: bool) {
    registry.registrieren("BBOX", BboxHandler);
    registry.registrieren("PROJECTION", ProjektionHandler::neu(strikte_achsen));
    registry.registrieren("PGET", PgetHandler::neu(strikte_achsen));
    tracing::debug!(strikte_achsen, "Geo-Erweiterung registriert");
}
