//! Gemeinsamer Server-Zustand fuer die Bridge
//!
//! Haelt Speicher, Zulassungspolitik, Multiplexer und Protokoll als
//! geteilte Referenzen. Wird einmal beim Start gebaut und an TCP- und
//! WebSocket-Server weitergereicht.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use relais_observability::{HealthState, RelaisMetrics};
use relais_store::Speicher;

use crate::dispatcher::Protokoll;
use crate::multiplexer::{KanalMultiplexer, MultiplexerConfig};
use crate::session::SessionConfig;
use crate::zulassung::KanalPolitik;

/// Konfiguration fuer die Bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub session: SessionConfig,
    pub multiplexer: MultiplexerConfig,
    /// Maximale gleichzeitige Verbindungen (TCP und WebSocket zusammen)
    pub max_verbindungen: usize,
    /// Maximale Laenge einer Befehlszeile in Bytes
    pub max_zeilen_laenge: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            multiplexer: MultiplexerConfig::default(),
            max_verbindungen: 1024,
            max_zeilen_laenge: relais_protocol::wire::DEFAULT_MAX_ZEILEN_LAENGE,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct BridgeState {
    pub config: Arc<BridgeConfig>,
    /// Backend fuer Hash-Abfragen und Abonnements
    pub speicher: Arc<dyn Speicher>,
    pub politik: Arc<KanalPolitik>,
    pub multiplexer: KanalMultiplexer,
    /// Befehls-Registry und Start-Pipeline fuer neue Sessions
    pub protokoll: Protokoll,
    pub metriken: RelaisMetrics,
    pub health: HealthState,
    verbindungen: AtomicUsize,
    start_time: Instant,
}

impl BridgeState {
    pub fn neu(
        config: BridgeConfig,
        speicher: Arc<dyn Speicher>,
        politik: Arc<KanalPolitik>,
        protokoll: Protokoll,
        metriken: RelaisMetrics,
        health: HealthState,
    ) -> Arc<Self> {
        let multiplexer = KanalMultiplexer::neu(
            Arc::clone(&speicher),
            Arc::clone(&politik),
            config.multiplexer.clone(),
            metriken.clone(),
            health.clone(),
        );
        Arc::new(Self {
            config: Arc::new(config),
            speicher,
            politik,
            multiplexer,
            protokoll,
            metriken,
            health,
            verbindungen: AtomicUsize::new(0),
            start_time: Instant::now(),
        })
    }

    /// Reserviert einen Verbindungsplatz
    ///
    /// `None` wenn `max_verbindungen` erreicht ist. Der Platz wird beim
    /// Droppen des Guards wieder frei.
    pub fn platz_reservieren(self: &Arc<Self>) -> Option<VerbindungsPlatz> {
        let max = self.config.max_verbindungen;
        self.verbindungen
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        self.metriken.sessions_active.inc();
        Some(VerbindungsPlatz {
            state: Arc::clone(self),
        })
    }

    /// Aktuell offene Verbindungen
    pub fn verbindungen(&self) -> usize {
        self.verbindungen.load(Ordering::SeqCst)
    }

    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Belegter Verbindungsplatz, gibt ihn beim Droppen frei
pub struct VerbindungsPlatz {
    state: Arc<BridgeState>,
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.state.verbindungen.fetch_sub(1, Ordering::SeqCst);
        self.state.metriken.sessions_active.dec();
    }
}
