//! relais-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Redis, Bridge und Observability und stellt den
//! Einstiegspunkt fuer das Binary bereit.

pub mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use config::{ProtokollEinstellungen, ServerConfig};
use relais_bridge::{BefehlsRegistry, BridgeState, Protokoll, WsServer, ZeilenServer};
use relais_observability::{observability_server_starten, HealthState, RelaisMetrics};
use relais_store::RedisSpeicher;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

/// Baut das Protokoll: Basis-Verben plus optional die Geo-Erweiterung
pub fn protokoll_bauen(einstellungen: &ProtokollEinstellungen) -> Protokoll {
    let mut registry = BefehlsRegistry::standard();
    if einstellungen.geo {
        relais_geo::registrieren(&mut registry, einstellungen.strikte_achsen);
    }
    Protokoll::neu(registry)
}

async fn adresse_aufloesen(adresse: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(adresse)
        .await
        .with_context(|| format!("Adresse '{adresse}' nicht aufloesbar"))?
        .next()
        .with_context(|| format!("Adresse '{adresse}' ergibt keine Socket-Adresse"))
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Redis-Verbindung herstellen
    /// 2. Zulassungspolitik und Protokoll bauen
    /// 3. TCP- und WebSocket-Listener starten
    /// 4. Observability-Server starten (optional)
    /// 5. Auf Ctrl-C warten, dann alle Sessions schliessen
    pub async fn starten(self) -> Result<()> {
        let config = &self.config;
        tracing::info!(
            tcp = %config.tcp_bind_adresse(),
            ws = %config.ws_bind_adresse(),
            speicher = %config.speicher.url,
            geo = config.protokoll.geo,
            "Server startet"
        );

        let metriken = RelaisMetrics::neu()?;
        let health = HealthState::neu();

        let speicher = RedisSpeicher::verbinden(&config.speicher.url)
            .await
            .with_context(|| format!("Redis unter '{}' nicht erreichbar", config.speicher.url))?;
        health.speicher_status_setzen(true);
        tracing::info!(url = %config.speicher.url, "Redis verbunden");

        let politik = config.kanal_politik()?;
        let state = BridgeState::neu(
            config.bridge_config(),
            Arc::new(speicher),
            Arc::new(politik),
            protokoll_bauen(&config.protokoll),
            metriken.clone(),
            health.clone(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tcp_server =
            ZeilenServer::binden(Arc::clone(&state), adresse_aufloesen(&config.tcp_bind_adresse()).await?)
                .await
                .context("TCP-Listener konnte nicht gebunden werden")?;
        let ws_server =
            WsServer::binden(Arc::clone(&state), adresse_aufloesen(&config.ws_bind_adresse()).await?)
                .await
                .context("WebSocket-Listener konnte nicht gebunden werden")?;

        let tcp_task = tokio::spawn(tcp_server.starten(shutdown_rx.clone()));
        let ws_task = tokio::spawn(ws_server.starten(shutdown_rx));

        let observability_task = if config.observability.aktiviert {
            let adresse = adresse_aufloesen(&config.observability_bind_adresse()).await?;
            Some(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(adresse, metriken, health).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }))
        } else {
            None
        };

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!(
            verbindungen = state.verbindungen(),
            "Shutdown-Signal empfangen, Server wird beendet"
        );

        let _ = shutdown_tx.send(true);
        for (name, task) in [("tcp", tcp_task), ("websocket", ws_task)] {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(listener = name, fehler = %e, "Listener mit Fehler beendet"),
                Err(e) => tracing::error!(listener = name, fehler = %e, "Listener-Task abgebrochen"),
            }
        }
        if let Some(task) = observability_task {
            task.abort();
        }

        tracing::info!(uptime_sek = state.uptime_sek(), "Server beendet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protokoll_mit_geo() {
        let protokoll = protokoll_bauen(&ProtokollEinstellungen::default());
        assert!(protokoll.registry().kennt("BBOX"));
        assert!(protokoll.registry().kennt("PGET"));
        assert!(protokoll.registry().kennt("GET"));
    }

    #[test]
    fn protokoll_ohne_geo() {
        let einstellungen = ProtokollEinstellungen {
            geo: false,
            strikte_achsen: false,
        };
        let protokoll = protokoll_bauen(&einstellungen);
        assert_eq!(protokoll.registry().verben(), vec!["DEL", "GET", "PING", "SUB"]);
    }

    #[tokio::test]
    async fn adressen_werden_aufgeloest() {
        let adresse = adresse_aufloesen("127.0.0.1:8765").await.unwrap();
        assert_eq!(adresse.port(), 8765);
        assert!(adresse_aufloesen("kein port").await.is_err());
    }
}
