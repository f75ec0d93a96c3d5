//! Kanal-Multiplexer – viele Sessions, ein Upstream-Abonnement pro Kanal
//!
//! Der Multiplexer besitzt exklusiv die Zuordnung Kanal -> Abonnenten und
//! die Upstream-Abonnements. Das erste `abonnieren` eines Kanals startet einen
//! Upstream-Task, das letzte `abbestellen` bricht ihn ab.
//!
//! ## Nebenlaeufigkeit
//! - Die Kanal-Map ist eine `DashMap`; An- und Abmeldung laufen ueber die
//!   Entry-API und sind pro Kanal serialisiert.
//! - `zustellen` arbeitet auf einer Momentaufnahme der Abonnenten. Waehrend
//!   Nachrichten eingereiht werden, ist keine Sperre der Map gehalten.
//! - Einreihen blockiert nie, eine volle Queue bremst keine anderen
//!   Abonnenten (siehe [`UeberlaufStrategie`](crate::queue::UeberlaufStrategie)).
//!
//! ## Upstream-Ausfall
//! Scheitert das Oeffnen oder endet der Nachrichtenstrom, versucht der Task
//! es mit exponentiellem Backoff erneut. Nach `versuche_bis_meldung`
//! Fehlversuchen bekommen alle Abonnenten einmalig eine Fehlermeldung,
//! bleiben aber abonniert.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::StreamExt;
use relais_core::SessionId;
use relais_observability::{HealthState, RelaisMetrics};
use relais_protocol::{inhalt_dekodieren, Umschlag};
use relais_store::{Speicher, StoreError};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::error::{BridgeError, BridgeResult};
use crate::filter::GeteiltePipeline;
use crate::queue::{AusgangsQueue, EinreihErgebnis};
use crate::zulassung::KanalPolitik;

/// Reconnect-Verhalten der Upstream-Tasks
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Wartezeit nach dem ersten Fehlversuch
    pub reconnect_basis: Duration,
    /// Obergrenze fuer die Wartezeit
    pub reconnect_max: Duration,
    /// Nach so vielen Fehlversuchen werden die Abonnenten benachrichtigt
    pub versuche_bis_meldung: u32,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            reconnect_basis: Duration::from_millis(250),
            reconnect_max: Duration::from_secs(10),
            versuche_bis_meldung: 3,
        }
    }
}

impl MultiplexerConfig {
    /// Wartezeit vor dem naechsten Versuch (verdoppelt sich je Fehlversuch)
    pub fn wartezeit(&self, fehlversuche: u32) -> Duration {
        let faktor = 2u32.saturating_pow(fehlversuche.saturating_sub(1));
        self.reconnect_basis
            .saturating_mul(faktor)
            .min(self.reconnect_max)
    }
}

/// Zustand des Upstream-Abonnements eines Kanals
#[derive(Debug, Clone, PartialEq, Eq)]
enum UpstreamStatus {
    Verbindend,
    Offen,
    Gestoert(String),
}

/// Handle auf eine Session, wie der Multiplexer sie sieht
///
/// Nicht-besitzende Rueckreferenz: Queue und Filter gehoeren der Session.
#[derive(Clone)]
pub struct Abonnent {
    session: SessionId,
    queue: Arc<AusgangsQueue>,
    filter: GeteiltePipeline,
}

impl Abonnent {
    pub fn neu(session: SessionId, queue: Arc<AusgangsQueue>, filter: GeteiltePipeline) -> Self {
        Self {
            session,
            queue,
            filter,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn queue(&self) -> &Arc<AusgangsQueue> {
        &self.queue
    }

    pub fn filter(&self) -> &GeteiltePipeline {
        &self.filter
    }

    /// Filtert eine Kanal-Nachricht und reiht sie ein
    fn zustellen(&self, kanal: &str, inhalt: &Value, metriken: &RelaisMetrics) {
        let mut inhalt = inhalt.clone();
        if !self.filter.read().anwenden(&mut inhalt) {
            metriken.messages_filtered_total.inc();
            return;
        }
        self.einreihen(Umschlag::neu(kanal, inhalt), metriken);
    }

    fn einreihen(&self, umschlag: Umschlag, metriken: &RelaisMetrics) {
        match self.queue.einreihen(umschlag) {
            EinreihErgebnis::Eingereiht => metriken.messages_delivered_total.inc(),
            EinreihErgebnis::AeltesteVerworfen => {
                metriken.messages_delivered_total.inc();
                metriken.messages_dropped_total.inc();
                tracing::debug!(session = %self.session, "Ausgangs-Queue voll – aelteste Nachricht verworfen");
            }
            EinreihErgebnis::Ueberlauf => {
                metriken.messages_dropped_total.inc();
                tracing::warn!(session = %self.session, "Ausgangs-Queue uebergelaufen – Session wird getrennt");
            }
            EinreihErgebnis::Geschlossen => {}
        }
    }
}

struct KanalEintrag {
    abonnenten: HashMap<SessionId, Abonnent>,
    upstream: AbortHandle,
    status: watch::Receiver<UpstreamStatus>,
}

struct MuxInner {
    kanaele: DashMap<String, KanalEintrag>,
    speicher: Arc<dyn Speicher>,
    politik: Arc<KanalPolitik>,
    config: MultiplexerConfig,
    metriken: RelaisMetrics,
    health: HealthState,
}

impl MuxInner {
    fn abonnenten_momentaufnahme(&self, kanal: &str) -> Vec<Abonnent> {
        self.kanaele
            .get(kanal)
            .map(|eintrag| eintrag.abonnenten.values().cloned().collect())
            .unwrap_or_default()
    }

    fn zustellen(&self, kanal: &str, payload: &str) -> usize {
        let abonnenten = self.abonnenten_momentaufnahme(kanal);
        if abonnenten.is_empty() {
            return 0;
        }
        let inhalt = inhalt_dekodieren(payload);
        for abonnent in &abonnenten {
            abonnent.zustellen(kanal, &inhalt, &self.metriken);
        }
        abonnenten.len()
    }

    fn benachrichtigen(&self, kanal: &str, umschlag: Umschlag) {
        for abonnent in self.abonnenten_momentaufnahme(kanal) {
            abonnent.einreihen(umschlag.clone(), &self.metriken);
        }
    }
}

/// Kanal-Multiplexer
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct KanalMultiplexer {
    inner: Arc<MuxInner>,
}

impl KanalMultiplexer {
    pub fn neu(
        speicher: Arc<dyn Speicher>,
        politik: Arc<KanalPolitik>,
        config: MultiplexerConfig,
        metriken: RelaisMetrics,
        health: HealthState,
    ) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                kanaele: DashMap::new(),
                speicher,
                politik,
                config,
                metriken,
                health,
            }),
        }
    }

    /// Meldet eine Session fuer einen Kanal an
    ///
    /// Der erste Abonnent eines Kanals startet das Upstream-Abonnement; der
    /// Aufruf wartet bis der erste Verbindungsversuch entschieden ist.
    /// Scheitert dieser, kommt `BridgeError::Store` zurueck, die Session
    /// bleibt aber angemeldet und erhaelt Nachrichten sobald der Upstream
    /// wieder steht.
    pub async fn abonnieren(&self, abonnent: &Abonnent, kanal: &str) -> BridgeResult<()> {
        if !self.inner.politik.erlaubt(kanal) {
            return Err(BridgeError::KanalNichtErlaubt(kanal.to_string()));
        }

        let mut status = match self.inner.kanaele.entry(kanal.to_string()) {
            Entry::Occupied(mut eintrag) => {
                eintrag
                    .get_mut()
                    .abonnenten
                    .insert(abonnent.session, abonnent.clone());
                eintrag.get().status.clone()
            }
            Entry::Vacant(frei) => {
                let (status_tx, status_rx) = watch::channel(UpstreamStatus::Verbindend);
                let upstream = tokio::spawn(upstream_schleife(
                    Arc::downgrade(&self.inner),
                    kanal.to_string(),
                    status_tx,
                ))
                .abort_handle();

                let mut abonnenten = HashMap::new();
                abonnenten.insert(abonnent.session, abonnent.clone());
                frei.insert(KanalEintrag {
                    abonnenten,
                    upstream,
                    status: status_rx.clone(),
                });
                self.inner.metriken.channels_active.inc();
                tracing::info!(kanal = kanal, "Upstream-Abonnement gestartet");
                status_rx
            }
        };

        tracing::debug!(session = %abonnent.session, kanal = kanal, "Kanal abonniert");

        let entschieden = status
            .wait_for(|s| *s != UpstreamStatus::Verbindend)
            .await
            .map(|s| (*s).clone());
        match entschieden {
            Ok(UpstreamStatus::Gestoert(grund)) => {
                Err(BridgeError::Store(StoreError::nicht_verfuegbar(grund)))
            }
            // Abgebrochen (letzter Abonnent ging parallel) oder offen
            _ => Ok(()),
        }
    }

    /// Meldet eine Session von einem Kanal ab
    ///
    /// Idempotent. Gibt `true` zurueck wenn die Session angemeldet war.
    pub fn abbestellen(&self, session: SessionId, kanal: &str) -> bool {
        match self.inner.kanaele.entry(kanal.to_string()) {
            Entry::Occupied(mut eintrag) => {
                let entfernt = eintrag.get_mut().abonnenten.remove(&session).is_some();
                if eintrag.get().abonnenten.is_empty() {
                    let (_, alt) = eintrag.remove_entry();
                    alt.upstream.abort();
                    self.inner.metriken.channels_active.dec();
                    tracing::info!(kanal = kanal, "Letzter Abonnent weg – Upstream-Abonnement geschlossen");
                }
                if entfernt {
                    tracing::debug!(session = %session, kanal = kanal, "Kanal abbestellt");
                }
                entfernt
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Entfernt eine Session aus allen ihren Kanaelen
    ///
    /// `kanaele` ist die Abonnement-Liste der Session. Gibt die Anzahl der
    /// Kanaele zurueck, in denen sie angemeldet war. Ein zweiter Aufruf ist
    /// ein No-op.
    pub fn alle_freigeben<I, S>(&self, session: SessionId, kanaele: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        kanaele
            .into_iter()
            .filter(|kanal| self.abbestellen(session, kanal.as_ref()))
            .count()
    }

    /// Verteilt eine Upstream-Nachricht an alle aktuellen Abonnenten
    ///
    /// Gibt die Anzahl der Abonnenten zurueck (vor dem Filtern).
    pub fn zustellen(&self, kanal: &str, payload: &str) -> usize {
        self.inner.zustellen(kanal, payload)
    }

    /// Aktuelle Abonnenten eines Kanals
    pub fn abonnenten(&self, kanal: &str) -> Vec<SessionId> {
        self.inner
            .kanaele
            .get(kanal)
            .map(|eintrag| eintrag.abonnenten.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn ist_abonniert(&self, session: SessionId, kanal: &str) -> bool {
        self.inner
            .kanaele
            .get(kanal)
            .is_some_and(|eintrag| eintrag.abonnenten.contains_key(&session))
    }

    /// Kanaele mit laufendem Upstream-Task, sortiert
    pub fn kanaele(&self) -> Vec<String> {
        let mut namen: Vec<String> = self
            .inner
            .kanaele
            .iter()
            .map(|eintrag| eintrag.key().clone())
            .collect();
        namen.sort();
        namen
    }

    pub fn kanal_anzahl(&self) -> usize {
        self.inner.kanaele.len()
    }
}

/// Upstream-Task eines Kanals
///
/// Haelt nur eine schwache Referenz auf den Multiplexer und endet, wenn
/// dieser verschwindet oder der Task abgebrochen wird.
async fn upstream_schleife(
    mux: Weak<MuxInner>,
    kanal: String,
    status: watch::Sender<UpstreamStatus>,
) {
    let mut fehlversuche: u32 = 0;

    loop {
        let Some(inner) = mux.upgrade() else {
            return;
        };
        let speicher = Arc::clone(&inner.speicher);
        let config = inner.config.clone();
        drop(inner);

        let grund = match speicher.abonnement_oeffnen(&kanal).await {
            Ok(mut strom) => {
                if fehlversuche > 0 {
                    tracing::info!(kanal = %kanal, "Upstream-Abonnement wiederhergestellt");
                }
                fehlversuche = 0;
                status.send_replace(UpstreamStatus::Offen);
                if let Some(inner) = mux.upgrade() {
                    inner.health.speicher_status_setzen(true);
                }

                while let Some(nachricht) = strom.next().await {
                    let Some(inner) = mux.upgrade() else {
                        return;
                    };
                    inner.zustellen(&kanal, &nachricht.payload);
                }
                "Verbindung zum Broker verloren".to_string()
            }
            Err(e) => e.to_string(),
        };

        fehlversuche = fehlversuche.saturating_add(1);
        let wartezeit = config.wartezeit(fehlversuche);
        tracing::warn!(
            kanal = %kanal,
            fehlversuche,
            wartezeit_ms = wartezeit.as_millis() as u64,
            fehler = %grund,
            "Upstream-Abonnement gestoert – neuer Versuch"
        );
        status.send_replace(UpstreamStatus::Gestoert(grund));

        if let Some(inner) = mux.upgrade() {
            inner.metriken.upstream_failures_total.inc();
            inner.health.speicher_status_setzen(false);
            if fehlversuche == config.versuche_bis_meldung.max(1) {
                inner.benachrichtigen(
                    &kanal,
                    Umschlag::neu(kanal.clone(), json!({ "error": "channel unavailable" })),
                );
            }
        }

        tokio::time::sleep(wartezeit).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterPipeline;
    use crate::queue::UeberlaufStrategie;
    use relais_store::MemorySpeicher;

    fn multiplexer(speicher: &MemorySpeicher, politik: KanalPolitik) -> KanalMultiplexer {
        KanalMultiplexer::neu(
            Arc::new(speicher.clone()),
            Arc::new(politik),
            MultiplexerConfig {
                reconnect_basis: Duration::from_millis(1),
                reconnect_max: Duration::from_millis(5),
                versuche_bis_meldung: 3,
            },
            RelaisMetrics::neu().unwrap(),
            HealthState::neu(),
        )
    }

    fn abonnent() -> Abonnent {
        Abonnent::neu(
            SessionId::new(),
            Arc::new(AusgangsQueue::neu(16, UeberlaufStrategie::AeltesteVerwerfen)),
            FilterPipeline::neu().geteilt(),
        )
    }

    async fn warten_bis(bedingung: impl Fn() -> bool) {
        for _ in 0..200 {
            if bedingung() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("Bedingung nicht erreicht");
    }

    #[test]
    fn backoff_verdoppelt_bis_maximum() {
        let config = MultiplexerConfig {
            reconnect_basis: Duration::from_millis(100),
            reconnect_max: Duration::from_millis(500),
            versuche_bis_meldung: 3,
        };
        assert_eq!(config.wartezeit(1), Duration::from_millis(100));
        assert_eq!(config.wartezeit(2), Duration::from_millis(200));
        assert_eq!(config.wartezeit(3), Duration::from_millis(400));
        assert_eq!(config.wartezeit(4), Duration::from_millis(500));
        assert_eq!(config.wartezeit(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn ein_upstream_fuer_mehrere_abonnenten() {
        let speicher = MemorySpeicher::neu();
        let mux = multiplexer(&speicher, KanalPolitik::alle_erlauben());
        let (a, b) = (abonnent(), abonnent());

        mux.abonnieren(&a, "weather").await.unwrap();
        mux.abonnieren(&b, "weather").await.unwrap();
        mux.abonnieren(&b, "weather").await.unwrap();

        assert_eq!(speicher.abonnements_geoeffnet("weather"), 1);
        assert_eq!(speicher.offene_abonnements("weather"), 1);
        assert_eq!(mux.abonnenten("weather").len(), 2);
    }

    #[tokio::test]
    async fn letzter_abonnent_schliesst_upstream() {
        let speicher = MemorySpeicher::neu();
        let mux = multiplexer(&speicher, KanalPolitik::alle_erlauben());
        let (a, b) = (abonnent(), abonnent());

        mux.abonnieren(&a, "weather").await.unwrap();
        mux.abonnieren(&b, "weather").await.unwrap();

        assert!(mux.abbestellen(a.session_id(), "weather"));
        assert_eq!(mux.kanal_anzahl(), 1);
        assert!(mux.abbestellen(b.session_id(), "weather"));
        assert_eq!(mux.kanal_anzahl(), 0);
        warten_bis(|| speicher.offene_abonnements("weather") == 0).await;

        // idempotent
        assert!(!mux.abbestellen(b.session_id(), "weather"));
    }

    #[tokio::test]
    async fn nicht_erlaubter_kanal_wird_abgelehnt() {
        let speicher = MemorySpeicher::neu();
        let politik = KanalPolitik::neu(["weather"], Vec::<String>::new()).unwrap();
        let mux = multiplexer(&speicher, politik);
        let a = abonnent();

        let ergebnis = mux.abonnieren(&a, "secret").await;
        assert!(matches!(ergebnis, Err(BridgeError::KanalNichtErlaubt(_))));
        assert_eq!(mux.kanal_anzahl(), 0);
        assert_eq!(speicher.abonnements_geoeffnet("secret"), 0);
    }

    #[tokio::test]
    async fn zustellung_nur_an_abonnenten() {
        let speicher = MemorySpeicher::neu();
        let mux = multiplexer(&speicher, KanalPolitik::alle_erlauben());
        let (a, b) = (abonnent(), abonnent());

        mux.abonnieren(&a, "weather").await.unwrap();
        mux.abonnieren(&b, "traffic").await.unwrap();

        assert_eq!(mux.zustellen("weather", r#"{"temp":20}"#), 1);
        assert_eq!(a.queue().laenge(), 1);
        assert_eq!(b.queue().laenge(), 0);

        let umschlag = a.queue().naechste().await.unwrap();
        assert_eq!(umschlag.source, "weather");
        assert_eq!(umschlag.content, json!({"temp": 20}));
    }

    #[tokio::test]
    async fn upstream_nachrichten_in_reihenfolge() {
        let speicher = MemorySpeicher::neu();
        let mux = multiplexer(&speicher, KanalPolitik::alle_erlauben());
        let a = abonnent();
        mux.abonnieren(&a, "weather").await.unwrap();

        for n in 0..5 {
            speicher.veroeffentlichen("weather", &n.to_string());
        }
        for n in 0..5 {
            let umschlag = a.queue().naechste().await.unwrap();
            assert_eq!(umschlag.content, json!(n));
        }
    }

    #[tokio::test]
    async fn alle_freigeben_ist_idempotent() {
        let speicher = MemorySpeicher::neu();
        let mux = multiplexer(&speicher, KanalPolitik::alle_erlauben());
        let a = abonnent();
        mux.abonnieren(&a, "weather").await.unwrap();
        mux.abonnieren(&a, "traffic").await.unwrap();

        let kanaele = ["weather", "traffic", "news"];
        assert_eq!(mux.alle_freigeben(a.session_id(), kanaele), 2);
        assert_eq!(mux.alle_freigeben(a.session_id(), kanaele), 0);
        assert_eq!(mux.kanal_anzahl(), 0);
    }

    #[tokio::test]
    async fn ausfall_meldet_einmal_und_erholt_sich() {
        let speicher = MemorySpeicher::neu();
        let mux = multiplexer(&speicher, KanalPolitik::alle_erlauben());
        let a = abonnent();
        mux.abonnieren(&a, "weather").await.unwrap();

        speicher.stoerung_setzen(true);
        let meldung = tokio::time::timeout(Duration::from_secs(2), a.queue().naechste())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meldung.source, "weather");
        assert_eq!(meldung.content, json!({"error": "channel unavailable"}));
        assert!(mux.ist_abonniert(a.session_id(), "weather"));

        speicher.stoerung_setzen(false);
        warten_bis(|| speicher.offene_abonnements("weather") == 1).await;
        speicher.veroeffentlichen("weather", r#"{"temp":21}"#);

        let nachricht = tokio::time::timeout(Duration::from_secs(2), a.queue().naechste())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(nachricht.content, json!({"temp": 21}));
    }

    #[tokio::test]
    async fn erster_versuch_gescheitert_bleibt_abonniert() {
        let speicher = MemorySpeicher::neu();
        speicher.stoerung_setzen(true);
        let mux = multiplexer(&speicher, KanalPolitik::alle_erlauben());
        let a = abonnent();

        let ergebnis = mux.abonnieren(&a, "weather").await;
        assert!(matches!(ergebnis, Err(BridgeError::Store(_))));
        assert!(mux.ist_abonniert(a.session_id(), "weather"));
        mux.alle_freigeben(a.session_id(), ["weather"]);
    }

    #[tokio::test]
    async fn kanal_wechsel_bei_ausfall_haelt_metriken_klein() {
        let speicher = MemorySpeicher::neu();
        speicher.stoerung_setzen(true);
        let mux = multiplexer(&speicher, KanalPolitik::alle_erlauben());

        for n in 0..50 {
            let a = abonnent();
            let kanal = format!("kanal{n}");
            assert!(mux.abonnieren(&a, &kanal).await.is_err());
            assert_eq!(mux.alle_freigeben(a.session_id(), [&kanal]), 1);
        }
        assert_eq!(mux.kanal_anzahl(), 0);

        let metriken = &mux.inner.metriken;
        assert!(metriken.upstream_failures_total.get() > 0);
        assert_eq!(metriken.channels_active.get(), 0);
        let serien: usize = metriken
            .registry
            .gather()
            .iter()
            .map(|familie| familie.get_metric().len())
            .sum();
        assert_eq!(serien, metriken.registry.gather().len());
    }
}
