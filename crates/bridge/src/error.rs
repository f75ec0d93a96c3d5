//! Fehlertypen fuer die Bridge

use relais_protocol::ProtokollFehler;
use relais_store::StoreError;
use thiserror::Error;

/// Fehlertyp fuer die Bridge
///
/// `Parse`, `KanalNichtErlaubt` und `Store` betreffen nur einen Befehl,
/// die Verbindung bleibt offen. Alle anderen Varianten beenden die Session.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Fehlerhafte Befehlszeile
    #[error("Parse-Fehler: {0}")]
    Parse(#[from] ProtokollFehler),

    /// Kanal oder Key durch die Zulassungspolitik abgelehnt
    #[error("Kanal nicht erlaubt: {0}")]
    KanalNichtErlaubt(String),

    /// Broker nicht erreichbar
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Ungueltiges Kanal-Muster in der Zulassungspolitik
    #[error("Ungueltiges Kanal-Muster '{muster}': {grund}")]
    UngueltigesMuster { muster: String, grund: String },

    /// Transport vom Client geschlossen
    #[error("Verbindung getrennt")]
    TransportGeschlossen,

    /// Keine Client-Nachricht innerhalb des Lese-Timeouts
    #[error("Lese-Timeout")]
    LeseTimeout,

    /// Keine Aktivitaet nach Keepalive-Ping
    #[error("Keepalive-Timeout")]
    KeepAliveTimeout,

    /// Ausgangs-Queue uebergelaufen (Strategie `Trennen`)
    #[error("Ausgangs-Queue uebergelaufen")]
    QueueUeberlauf,

    /// Server faehrt herunter
    #[error("Server wird heruntergefahren")]
    Heruntergefahren,

    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Interner Fehler (z.B. abgestuerzter Session-Task)
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl BridgeError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Ob der Fehler die Session beendet
    pub fn beendet_session(&self) -> bool {
        !matches!(
            self,
            Self::Parse(_) | Self::KanalNichtErlaubt(_) | Self::Store(_)
        )
    }
}

/// Result-Typ fuer die Bridge
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn befehlsfehler_beenden_session_nicht() {
        assert!(!BridgeError::KanalNichtErlaubt("x".into()).beendet_session());
        assert!(!BridgeError::Store(StoreError::nicht_verfuegbar("weg")).beendet_session());
        assert!(!BridgeError::Parse(ProtokollFehler::ZeileZuLang { max: 8 }).beendet_session());
    }

    #[test]
    fn timeouts_beenden_session() {
        assert!(BridgeError::LeseTimeout.beendet_session());
        assert!(BridgeError::KeepAliveTimeout.beendet_session());
        assert!(BridgeError::QueueUeberlauf.beendet_session());
        assert!(BridgeError::TransportGeschlossen.beendet_session());
    }
}
