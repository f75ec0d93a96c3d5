//! Fehlertypen der Geo-Erweiterung

use relais_bridge::BridgeError;
use relais_protocol::ProtokollFehler;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoFehler {
    /// CRS-Code ist nicht eingebaut
    #[error("Unbekanntes Koordinatensystem: {0}")]
    UnbekanntesCrs(String),
}

pub type GeoResult<T> = Result<T, GeoFehler>;

impl GeoFehler {
    /// Als Protokollfehler des Verbs `verb` (Zeile wird verworfen)
    pub fn fuer_verb(self, verb: &str) -> BridgeError {
        match self {
            GeoFehler::UnbekanntesCrs(code) => BridgeError::Parse(ProtokollFehler::UngueltigesArgument {
                verb: verb.to_string(),
                wert: code,
            }),
        }
    }
}
