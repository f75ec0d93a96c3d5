//! Fehlertypen fuer das Zeilenprotokoll

use thiserror::Error;

/// Fehler beim Parsen oder Kodieren von Protokollzeilen
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    /// Pflicht-Argument fehlt
    #[error("Argument fehlt fuer '{verb}': {name}")]
    FehlendesArgument { verb: String, name: &'static str },

    /// Falsche Anzahl von Argumenten
    #[error("'{verb}' erwartet {erwartet} Argumente, erhalten: {erhalten}")]
    FalscheArgumentAnzahl {
        verb: String,
        erwartet: &'static str,
        erhalten: usize,
    },

    /// Argument hat ein ungueltiges Format
    #[error("Ungueltiges Argument fuer '{verb}': {wert}")]
    UngueltigesArgument { verb: String, wert: String },

    /// Zeile ueberschreitet die maximale Laenge
    #[error("Zeile zu lang (Maximum: {max} Bytes)")]
    ZeileZuLang { max: usize },

    /// JSON-Serialisierung fehlgeschlagen
    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    /// IO-Fehler im Codec
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

/// Result-Typ fuer das Zeilenprotokoll
pub type ProtokollResult<T> = Result<T, ProtokollFehler>;
