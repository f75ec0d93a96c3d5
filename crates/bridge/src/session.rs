//! Client-Session – Verwaltet eine einzelne Client-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientSession` mit zwei Tasks: der
//! Lese-Task parst Befehle und dispatcht sie, der Schreib-Task leert die
//! Ausgangs-Queue in den Transport. Nur der Schreib-Task schreibt.
//!
//! ## State Machine
//! ```text
//! Aktiv -> Schliessend -> Geschlossen
//! ```
//!
//! ## Timeouts
//! - Lese-Timeout: keine Client-Zeile innerhalb `lese_timeout` -> Schliessen
//! - Keepalive: keine Aktivitaet (gelesen oder geschrieben) innerhalb
//!   `keepalive_timeout` -> Server sendet `PING`; bleibt es danach ein
//!   weiteres Intervall still -> Schliessen

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relais_core::SessionId;
use relais_protocol::Umschlag;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::Instant;

use crate::dispatcher::{Protokoll, SessionAbonnements, SessionKontext};
use crate::error::BridgeError;
use crate::multiplexer::Abonnent;
use crate::queue::{AusgangsQueue, UeberlaufStrategie};
use crate::server_state::BridgeState;
use crate::transport::{Transport, ZeilenQuelle, ZeilenSenke};

/// Konfiguration einer Session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `None` deaktiviert den Lese-Timeout
    pub lese_timeout: Option<Duration>,
    /// `None` deaktiviert Keepalive-Pings
    pub keepalive_timeout: Option<Duration>,
    /// Kapazitaet der Ausgangs-Queue
    pub queue_groesse: usize,
    pub ueberlauf: UeberlaufStrategie,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lese_timeout: Some(Duration::from_secs(300)),
            keepalive_timeout: Some(Duration::from_secs(60)),
            queue_groesse: 256,
            ueberlauf: UeberlaufStrategie::AeltesteVerwerfen,
        }
    }
}

/// Zustand einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    /// Normaler Betrieb
    Aktiv,
    /// Abbau laeuft (Tasks gestoppt, Abonnements werden freigegeben)
    Schliessend,
    /// Endzustand
    Geschlossen,
}

impl SessionZustand {
    /// Erlaubte Uebergaenge; aus `Geschlossen` fuehrt keiner heraus
    pub fn uebergang_erlaubt(self, ziel: SessionZustand) -> bool {
        matches!(
            (self, ziel),
            (Self::Aktiv, Self::Schliessend) | (Self::Schliessend, Self::Geschlossen)
        )
    }
}

/// Zeitpunkt der letzten Aktivitaet (lesen oder schreiben)
type Aktivitaet = Arc<Mutex<Instant>>;

/// Verarbeitet eine einzelne Client-Verbindung
pub struct ClientSession {
    id: SessionId,
    peer: String,
    state: Arc<BridgeState>,
    zustand: watch::Sender<SessionZustand>,
}

impl ClientSession {
    pub fn neu(state: Arc<BridgeState>, peer: impl Into<String>) -> Self {
        let (zustand, _) = watch::channel(SessionZustand::Aktiv);
        Self {
            id: SessionId::new(),
            peer: peer.into(),
            state,
            zustand,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Beobachtet den Zustand, auch nachdem `verarbeiten` die Session
    /// uebernommen hat
    pub fn zustand_beobachten(&self) -> watch::Receiver<SessionZustand> {
        self.zustand.subscribe()
    }

    fn zustand_setzen(&self, ziel: SessionZustand) {
        let aktuell = *self.zustand.borrow();
        if aktuell.uebergang_erlaubt(ziel) {
            tracing::trace!(session = %self.id, von = ?aktuell, nach = ?ziel, "Zustandswechsel");
            self.zustand.send_replace(ziel);
        } else {
            tracing::debug!(session = %self.id, von = ?aktuell, nach = ?ziel, "Zustandswechsel ignoriert");
        }
    }

    /// Startet Lese- und Schreib-Task und laeuft bis die Session endet
    ///
    /// Gibt den Grund des Verbindungsendes zurueck. Beim Verlassen ist die
    /// Session aus allen Kanaelen abgemeldet.
    pub async fn verarbeiten(
        self,
        transport: Transport,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> BridgeError {
        let config = self.state.config.session.clone();
        let protokoll = self.state.protokoll.clone();

        let queue = Arc::new(AusgangsQueue::neu(config.queue_groesse, config.ueberlauf));
        let filter = protokoll.pipeline_erstellen().geteilt();
        let abonnements = SessionAbonnements::default();
        let ctx = SessionKontext {
            session_id: self.id,
            peer: self.peer.clone(),
            abonnent: Abonnent::neu(self.id, Arc::clone(&queue), filter),
            abonnements: Arc::clone(&abonnements),
            multiplexer: self.state.multiplexer.clone(),
            speicher: Arc::clone(&self.state.speicher),
            politik: Arc::clone(&self.state.politik),
        };
        let aktivitaet: Aktivitaet = Arc::new(Mutex::new(Instant::now()));

        tracing::info!(session = %self.id, peer = %self.peer, "Session geoeffnet");
        queue.einreihen(Umschlag::geoeffnet());

        let Transport { quelle, senke } = transport;
        let mut leser = tokio::spawn(lese_schleife(
            quelle,
            ctx,
            protokoll,
            config.lese_timeout,
            Arc::clone(&aktivitaet),
        ));
        let mut schreiber = tokio::spawn(schreib_schleife(
            senke,
            Arc::clone(&queue),
            config.keepalive_timeout,
            aktivitaet,
        ));

        let grund = tokio::select! {
            ergebnis = &mut leser => {
                schreiber.abort();
                let _ = schreiber.await;
                task_grund(ergebnis)
            }
            ergebnis = &mut schreiber => {
                leser.abort();
                let _ = leser.await;
                task_grund(ergebnis)
            }
            // Ueberlauf mit Strategie `Trennen`, auch wenn der Schreib-Task blockiert
            _ = queue.geschlossen() => {
                leser.abort();
                schreiber.abort();
                let _ = leser.await;
                let _ = schreiber.await;
                BridgeError::QueueUeberlauf
            }
            _ = shutdown_abwarten(&mut shutdown_rx) => {
                leser.abort();
                schreiber.abort();
                let _ = leser.await;
                let _ = schreiber.await;
                BridgeError::Heruntergefahren
            }
        };

        self.zustand_setzen(SessionZustand::Schliessend);
        match &grund {
            BridgeError::TransportGeschlossen => {
                tracing::info!(session = %self.id, peer = %self.peer, "Verbindung vom Client getrennt");
            }
            BridgeError::LeseTimeout
            | BridgeError::KeepAliveTimeout
            | BridgeError::Heruntergefahren => {
                tracing::info!(session = %self.id, peer = %self.peer, grund = %grund, "Session wird geschlossen");
            }
            anderer => {
                tracing::warn!(session = %self.id, peer = %self.peer, fehler = %anderer, "Session wegen Fehler geschlossen");
            }
        }

        let kanaele: Vec<String> = abonnements.lock().drain().collect();
        let freigegeben = self.state.multiplexer.alle_freigeben(self.id, kanaele);
        queue.schliessen();
        self.zustand_setzen(SessionZustand::Geschlossen);

        tracing::info!(session = %self.id, kanaele = freigegeben, "Session geschlossen");
        grund
    }
}

/// Liest Zeilen, setzt den Lese-Timeout zurueck und dispatcht
async fn lese_schleife(
    mut quelle: ZeilenQuelle,
    mut ctx: SessionKontext,
    protokoll: Protokoll,
    lese_timeout: Option<Duration>,
    aktivitaet: Aktivitaet,
) -> BridgeError {
    loop {
        let naechste = match lese_timeout {
            Some(dauer) => match tokio::time::timeout(dauer, quelle.next()).await {
                Ok(naechste) => naechste,
                Err(_) => return BridgeError::LeseTimeout,
            },
            None => quelle.next().await,
        };

        let zeile = match naechste {
            Some(Ok(zeile)) => zeile,
            Some(Err(e)) => return e,
            None => return BridgeError::TransportGeschlossen,
        };
        *aktivitaet.lock() = Instant::now();

        if let Err(e) = protokoll.registry().dispatch(&zeile, &mut ctx).await {
            match e {
                BridgeError::Parse(fehler) => {
                    tracing::debug!(session = %ctx.session_id, fehler = %fehler, "Befehl verworfen");
                }
                BridgeError::KanalNichtErlaubt(kanal) => {
                    tracing::info!(session = %ctx.session_id, kanal = %kanal, "Kanal nicht erlaubt – ignoriert");
                }
                BridgeError::Store(fehler) => {
                    tracing::warn!(session = %ctx.session_id, fehler = %fehler, "Speicher nicht verfuegbar");
                    ctx.senden(Umschlag::fehler(fehler.to_string()));
                }
                anderer => return anderer,
            }
        }
    }
}

/// Leert die Ausgangs-Queue und haelt die Verbindung per Keepalive am Leben
async fn schreib_schleife(
    mut senke: ZeilenSenke,
    queue: Arc<AusgangsQueue>,
    keepalive: Option<Duration>,
    aktivitaet: Aktivitaet,
) -> BridgeError {
    let mut ping_ausstehend = false;

    loop {
        let frist = keepalive.map(|dauer| *aktivitaet.lock() + dauer);

        tokio::select! {
            naechste = queue.naechste() => {
                let Some(umschlag) = naechste else {
                    let _ = senke.close().await;
                    return if queue.ist_uebergelaufen() {
                        BridgeError::QueueUeberlauf
                    } else {
                        BridgeError::TransportGeschlossen
                    };
                };
                if let Err(e) = zeile_senden(&mut senke, &umschlag).await {
                    return e;
                }
                ping_ausstehend = false;
                *aktivitaet.lock() = Instant::now();
            }
            _ = frist_abwarten(frist) => {
                let Some(dauer) = keepalive else {
                    continue;
                };
                let letzte = *aktivitaet.lock();
                if Instant::now() < letzte + dauer {
                    // zwischenzeitlich Aktivitaet
                    ping_ausstehend = false;
                    continue;
                }
                if ping_ausstehend {
                    return BridgeError::KeepAliveTimeout;
                }
                if let Err(e) = zeile_senden(&mut senke, &Umschlag::ping()).await {
                    return e;
                }
                ping_ausstehend = true;
                *aktivitaet.lock() = Instant::now();
            }
        }
    }
}

async fn zeile_senden(senke: &mut ZeilenSenke, umschlag: &Umschlag) -> Result<(), BridgeError> {
    let zeile = umschlag.zu_zeile()?;
    senke.send(zeile).await
}

async fn frist_abwarten(frist: Option<Instant>) {
    match frist {
        Some(frist) => tokio::time::sleep_until(frist).await,
        None => std::future::pending().await,
    }
}

async fn shutdown_abwarten(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender weg: kein Shutdown mehr moeglich
            std::future::pending::<()>().await;
        }
    }
}

fn task_grund(ergebnis: Result<BridgeError, JoinError>) -> BridgeError {
    match ergebnis {
        Ok(grund) => grund,
        Err(e) => BridgeError::intern(format!("Session-Task beendet: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zustandsuebergaenge() {
        use SessionZustand::*;
        assert!(Aktiv.uebergang_erlaubt(Schliessend));
        assert!(Schliessend.uebergang_erlaubt(Geschlossen));
        assert!(!Aktiv.uebergang_erlaubt(Geschlossen));
        assert!(!Geschlossen.uebergang_erlaubt(Aktiv));
        assert!(!Geschlossen.uebergang_erlaubt(Schliessend));
        assert!(!Schliessend.uebergang_erlaubt(Aktiv));
    }

    #[test]
    fn standard_config() {
        let config = SessionConfig::default();
        assert_eq!(config.lese_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.keepalive_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.ueberlauf, UeberlaufStrategie::AeltesteVerwerfen);
    }
}
