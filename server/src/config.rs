//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist. Einige Umgebungsvariablen ueberschreiben die Datei:
//!
//! | Variable | Feld |
//! |---|---|
//! | `REDIS_DSN` | `speicher.url` |
//! | `HOST` | `netzwerk.bind_adresse` |
//! | `PORT` | `netzwerk.ws_port` |

use std::time::Duration;

use relais_bridge::{
    BridgeConfig, BridgeResult, KanalPolitik, MultiplexerConfig, SessionConfig, UeberlaufStrategie,
};
use relais_observability::logging::{log_format_gueltig, log_level_gueltig};
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub netzwerk: NetzwerkEinstellungen,
    pub session: SessionEinstellungen,
    /// Kanal-Zulassung (Namen und Glob-Muster)
    pub kanaele: KanalEinstellungen,
    /// Redis-Verbindung und Reconnect-Verhalten
    pub speicher: SpeicherEinstellungen,
    /// Protokoll-Erweiterungen
    pub protokoll: ProtokollEinstellungen,
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Listener
    pub bind_adresse: String,
    /// Port fuer das Zeilenprotokoll ueber TCP
    pub tcp_port: u16,
    /// Port fuer WebSocket-Clients
    pub ws_port: u16,
    /// Maximale Laenge einer Befehlszeile in Bytes
    pub max_zeilen_laenge: usize,
    /// Maximale Anzahl gleichzeitiger Verbindungen (beide Transporte)
    pub max_verbindungen: usize,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 8766,
            ws_port: 8765,
            max_zeilen_laenge: relais_bridge::BridgeConfig::default().max_zeilen_laenge,
            max_verbindungen: 1024,
        }
    }
}

/// Session-Einstellungen; Timeouts von 0 deaktivieren den Timer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionEinstellungen {
    pub lese_timeout_sek: u64,
    pub keepalive_timeout_sek: u64,
    /// Kapazitaet der Ausgangs-Queue pro Session
    pub queue_groesse: usize,
    /// "aelteste_verwerfen" oder "trennen"
    pub ueberlauf: UeberlaufStrategie,
}

impl Default for SessionEinstellungen {
    fn default() -> Self {
        Self {
            lese_timeout_sek: 300,
            keepalive_timeout_sek: 60,
            queue_groesse: 256,
            ueberlauf: UeberlaufStrategie::AeltesteVerwerfen,
        }
    }
}

/// Kanal-Zulassung; ohne Namen und Muster ist nichts erlaubt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KanalEinstellungen {
    pub namen: Vec<String>,
    pub muster: Vec<String>,
}

impl Default for KanalEinstellungen {
    fn default() -> Self {
        Self {
            namen: vec![],
            muster: vec!["[a-z]*".into()],
        }
    }
}

/// Redis-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeicherEinstellungen {
    pub url: String,
    pub reconnect_basis_ms: u64,
    pub reconnect_max_ms: u64,
    /// Fehlversuche bis Abonnenten benachrichtigt werden
    pub reconnect_versuche_bis_meldung: u32,
}

impl Default for SpeicherEinstellungen {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1/".into(),
            reconnect_basis_ms: 250,
            reconnect_max_ms: 10_000,
            reconnect_versuche_bis_meldung: 3,
        }
    }
}

/// Protokoll-Erweiterungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtokollEinstellungen {
    /// Aktiviert `BBOX`, `PROJECTION` und `PGET`
    pub geo: bool,
    /// Achsenreihenfolge nach CRS-Definition (EPSG:4326 = lat/lon)
    pub strikte_achsen: bool,
}

impl Default for ProtokollEinstellungen {
    fn default() -> Self {
        Self {
            geo: true,
            strikte_achsen: false,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

fn sekunden(wert: u64) -> Option<Duration> {
    (wert > 0).then(|| Duration::from_secs(wert))
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei und wendet die
    /// Umgebungsvariablen an.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.umgebung_anwenden(|name| std::env::var(name).ok())?;
        config.pruefen()?;
        Ok(config)
    }

    /// Ueberschreibt Felder aus `REDIS_DSN`, `HOST` und `PORT`
    pub fn umgebung_anwenden<F>(&mut self, variable: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = variable("REDIS_DSN") {
            self.speicher.url = url;
        }
        if let Some(host) = variable("HOST") {
            self.netzwerk.bind_adresse = host;
        }
        if let Some(port) = variable("PORT") {
            self.netzwerk.ws_port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT ist kein gueltiger Port: '{port}'"))?;
        }
        Ok(())
    }

    /// Prueft Werte die serde nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiger Log-Level: '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format: '{}'", self.logging.format);
        }
        if self.session.queue_groesse == 0 {
            anyhow::bail!("session.queue_groesse muss groesser als 0 sein");
        }
        if self.netzwerk.max_zeilen_laenge == 0 {
            anyhow::bail!("netzwerk.max_zeilen_laenge muss groesser als 0 sein");
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Gibt die vollstaendige Bind-Adresse fuer WebSocket zurueck
    pub fn ws_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.ws_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port)
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            session: SessionConfig {
                lese_timeout: sekunden(self.session.lese_timeout_sek),
                keepalive_timeout: sekunden(self.session.keepalive_timeout_sek),
                queue_groesse: self.session.queue_groesse,
                ueberlauf: self.session.ueberlauf,
            },
            multiplexer: MultiplexerConfig {
                reconnect_basis: Duration::from_millis(self.speicher.reconnect_basis_ms),
                reconnect_max: Duration::from_millis(self.speicher.reconnect_max_ms),
                versuche_bis_meldung: self.speicher.reconnect_versuche_bis_meldung,
            },
            max_verbindungen: self.netzwerk.max_verbindungen,
            max_zeilen_laenge: self.netzwerk.max_zeilen_laenge,
        }
    }

    /// Baut die Zulassungspolitik; ungueltige Muster sind ein Fehler
    pub fn kanal_politik(&self) -> BridgeResult<KanalPolitik> {
        KanalPolitik::neu(self.kanaele.namen.iter().cloned(), &self.kanaele.muster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert!(cfg.pruefen().is_ok());
        assert_eq!(cfg.netzwerk.ws_port, 8765);
        assert_eq!(cfg.netzwerk.tcp_port, 8766);
        assert_eq!(cfg.session.ueberlauf, UeberlaufStrategie::AeltesteVerwerfen);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.protokoll.geo);
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tcp_bind_adresse(), "0.0.0.0:8766");
        assert_eq!(cfg.ws_bind_adresse(), "0.0.0.0:8765");
        assert_eq!(cfg.observability_bind_adresse(), "0.0.0.0:9300");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [netzwerk]
            ws_port = 10000

            [session]
            lese_timeout_sek = 0
            ueberlauf = "trennen"

            [kanaele]
            namen = ["weather", "traffic"]
            muster = []
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.netzwerk.ws_port, 10000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.tcp_port, 8766);
        assert_eq!(cfg.session.keepalive_timeout_sek, 60);
        assert_eq!(cfg.session.ueberlauf, UeberlaufStrategie::Trennen);

        let bridge = cfg.bridge_config();
        assert_eq!(bridge.session.lese_timeout, None);
        assert_eq!(bridge.session.keepalive_timeout, Some(Duration::from_secs(60)));

        let politik = cfg.kanal_politik().unwrap();
        assert!(politik.erlaubt("weather"));
        assert!(!politik.erlaubt("secret"));
    }

    #[test]
    fn standard_muster_erlaubt_kleinbuchstaben() {
        let politik = ServerConfig::default().kanal_politik().unwrap();
        assert!(politik.erlaubt("weather"));
        assert!(!politik.erlaubt("Weather"));
    }

    #[test]
    fn ungueltiges_muster_ist_fehler() {
        let mut cfg = ServerConfig::default();
        cfg.kanaele.muster = vec!["[".into()];
        assert!(cfg.kanal_politik().is_err());
    }

    #[test]
    fn umgebung_ueberschreibt() {
        let umgebung: HashMap<&str, &str> = [
            ("REDIS_DSN", "redis://cache:6380/"),
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
        ]
        .into_iter()
        .collect();
        let mut cfg = ServerConfig::default();
        cfg.umgebung_anwenden(|name| umgebung.get(name).map(|w| w.to_string()))
            .unwrap();
        assert_eq!(cfg.speicher.url, "redis://cache:6380/");
        assert_eq!(cfg.ws_bind_adresse(), "127.0.0.1:9000");
    }

    #[test]
    fn ungueltiger_port_ist_fehler() {
        let mut cfg = ServerConfig::default();
        assert!(cfg
            .umgebung_anwenden(|name| (name == "PORT").then(|| "abc".to_string()))
            .is_err());
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.pruefen().is_err());

        let mut cfg = ServerConfig::default();
        cfg.session.queue_groesse = 0;
        assert!(cfg.pruefen().is_err());
    }
}
