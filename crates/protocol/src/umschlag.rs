//! Ausgehender Nachrichten-Umschlag
//!
//! Jede Nachricht an einen Client ist ein JSON-Objekt:
//!
//! ```json
//! {"source": "weather", "content": {"temp": 20}, "timestamp": 1700000000000.0, "client_reference": null}
//! ```
//!
//! `source` ist der Kanalname, der Hash-Key (`"key field"` bei Feldabfragen)
//! oder [`QUELLE_VERBINDUNG`] fuer Nachrichten der Verbindung selbst
//! (PONG, Statusmeldungen, Fehler).

use serde::Serialize;
use serde_json::{json, Value};

use relais_core::zeitstempel_ms;

use crate::error::ProtokollResult;

/// Quelle fuer Nachrichten, die nicht aus einem Kanal stammen
pub const QUELLE_VERBINDUNG: &str = "websocket";

/// Ein ausgehender Nachrichten-Umschlag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Umschlag {
    pub source: String,
    pub content: Value,
    /// Millisekunden seit Epoche
    pub timestamp: f64,
    pub client_reference: Option<String>,
}

impl Umschlag {
    /// Erstellt einen Umschlag mit aktuellem Zeitstempel
    pub fn neu(quelle: impl Into<String>, inhalt: Value) -> Self {
        Self {
            source: quelle.into(),
            content: inhalt,
            timestamp: zeitstempel_ms(),
            client_reference: None,
        }
    }

    /// Setzt die vom Client uebergebene Referenz
    pub fn mit_referenz(mut self, referenz: Option<String>) -> Self {
        self.client_reference = referenz;
        self
    }

    /// Antwort auf `PING`
    pub fn pong() -> Self {
        Self::neu(QUELLE_VERBINDUNG, Value::String("PONG".into()))
    }

    /// Keepalive-Anfrage des Servers an einen stillen Client
    pub fn ping() -> Self {
        Self::neu(QUELLE_VERBINDUNG, Value::String("PING".into()))
    }

    /// Erste Nachricht nach dem Verbindungsaufbau
    pub fn geoeffnet() -> Self {
        Self::neu(QUELLE_VERBINDUNG, json!({ "status": "open" }))
    }

    /// Fehlermeldung an den Client
    pub fn fehler(nachricht: impl Into<String>) -> Self {
        Self::neu(QUELLE_VERBINDUNG, json!({ "error": nachricht.into() }))
    }

    /// Serialisiert den Umschlag als eine JSON-Zeile (ohne Zeilenumbruch)
    pub fn zu_zeile(&self) -> ProtokollResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Dekodiert eine rohe Payload aus dem Speicher
///
/// Gueltiges JSON wird als Wert uebernommen, alles andere als JSON-String
/// durchgereicht.
pub fn inhalt_dekodieren(payload: &str) -> Value {
    serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()))
}
