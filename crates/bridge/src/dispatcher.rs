//! Befehls-Dispatcher – Routet Befehlszeilen an registrierte Handler
//!
//! Die Registry bildet Verben auf Handler ab. Erweiterungen (z.B. `BBOX`,
//! `PROJECTION`) registrieren zusaetzliche Handler, ohne die Basis-Verben
//! anzufassen. Unbekannte Verben werden ignoriert und nur geloggt.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use relais_core::SessionId;
use relais_protocol::{parse_zeile, Befehl, Umschlag};
use relais_store::Speicher;

use crate::error::BridgeResult;
use crate::filter::{FilterPipeline, GeteiltePipeline};
use crate::handlers::{DelHandler, GetHandler, PingHandler, SubHandler};
use crate::multiplexer::{Abonnent, KanalMultiplexer};
use crate::queue::EinreihErgebnis;
use crate::zulassung::KanalPolitik;

/// Von einer Session abonnierte Kanaele
///
/// Geteilt zwischen Lese-Task und Session, damit das Freigeben auch nach
/// einem Abbruch des Lese-Tasks die vollstaendige Liste sieht.
pub type SessionAbonnements = Arc<Mutex<HashSet<String>>>;

/// Dispatcher-Kontext – Zustand und Dienste einer Session
pub struct SessionKontext {
    pub session_id: SessionId,
    /// Peer-Adresse (nur fuer Logs)
    pub peer: String,
    /// Eigene Queue und Filter-Pipeline, so wie der Multiplexer sie sieht
    pub abonnent: Abonnent,
    /// Von dieser Session abonnierte Kanaele
    pub abonnements: SessionAbonnements,
    pub multiplexer: KanalMultiplexer,
    pub speicher: Arc<dyn Speicher>,
    pub politik: Arc<KanalPolitik>,
}

impl SessionKontext {
    /// Reiht eine direkte Antwort in die Ausgangs-Queue ein
    pub fn senden(&self, umschlag: Umschlag) -> EinreihErgebnis {
        self.abonnent.queue().einreihen(umschlag)
    }

    /// Filter-Pipeline der Session
    pub fn filter(&self) -> &GeteiltePipeline {
        self.abonnent.filter()
    }
}

/// Handler fuer ein Verb
#[async_trait]
pub trait BefehlsHandler: Send + Sync {
    async fn ausfuehren(&self, befehl: &Befehl, ctx: &mut SessionKontext) -> BridgeResult<()>;
}

/// Zuordnung Verb -> Handler
#[derive(Clone, Default)]
pub struct BefehlsRegistry {
    handler: HashMap<String, Arc<dyn BefehlsHandler>>,
}

impl BefehlsRegistry {
    /// Leere Registry
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registry mit den Basis-Verben `GET`, `SUB`, `DEL`, `PING`
    pub fn standard() -> Self {
        let mut registry = Self::neu();
        registry.registrieren("GET", GetHandler);
        registry.registrieren("SUB", SubHandler);
        registry.registrieren("DEL", DelHandler);
        registry.registrieren("PING", PingHandler);
        registry
    }

    /// Registriert einen Handler; ein vorhandener Handler gleichen Verbs
    /// wird ersetzt und zurueckgegeben
    pub fn registrieren(
        &mut self,
        verb: &str,
        handler: impl BefehlsHandler + 'static,
    ) -> Option<Arc<dyn BefehlsHandler>> {
        self.handler.insert(verb.to_uppercase(), Arc::new(handler))
    }

    /// Registrierte Verben, sortiert
    pub fn verben(&self) -> Vec<&str> {
        let mut verben: Vec<&str> = self.handler.keys().map(String::as_str).collect();
        verben.sort_unstable();
        verben
    }

    pub fn kennt(&self, verb: &str) -> bool {
        self.handler.contains_key(&verb.to_uppercase())
    }

    /// Parst eine Zeile und fuehrt den passenden Handler aus
    ///
    /// Leere Zeilen und unbekannte Verben sind ein No-op.
    pub async fn dispatch(&self, zeile: &str, ctx: &mut SessionKontext) -> BridgeResult<()> {
        let Some(befehl) = parse_zeile(zeile) else {
            return Ok(());
        };

        match self.handler.get(&befehl.verb) {
            Some(handler) => {
                tracing::debug!(
                    session = %ctx.session_id,
                    verb = %befehl.verb,
                    argumente = befehl.anzahl(),
                    "Befehl"
                );
                handler.ausfuehren(&befehl, ctx).await
            }
            None => {
                tracing::info!(
                    session = %ctx.session_id,
                    peer = %ctx.peer,
                    verb = %befehl.verb,
                    "Unbekannter Befehl ignoriert"
                );
                Ok(())
            }
        }
    }
}

type PipelineFabrik = Arc<dyn Fn() -> FilterPipeline + Send + Sync>;

/// Zusammengesetztes Protokoll: Befehls-Registry plus Start-Pipeline
///
/// Wird einmal beim Serverstart gebaut und fuer jede Session geteilt.
#[derive(Clone)]
pub struct Protokoll {
    registry: Arc<BefehlsRegistry>,
    pipeline_fabrik: PipelineFabrik,
}

impl Protokoll {
    pub fn neu(registry: BefehlsRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            pipeline_fabrik: Arc::new(FilterPipeline::neu),
        }
    }

    /// Basis-Protokoll mit leerer Start-Pipeline
    pub fn standard() -> Self {
        Self::neu(BefehlsRegistry::standard())
    }

    /// Setzt die Fabrik fuer die Start-Pipeline neuer Sessions
    pub fn mit_pipeline(
        mut self,
        fabrik: impl Fn() -> FilterPipeline + Send + Sync + 'static,
    ) -> Self {
        self.pipeline_fabrik = Arc::new(fabrik);
        self
    }

    pub fn registry(&self) -> &BefehlsRegistry {
        &self.registry
    }

    /// Neue Pipeline fuer eine Session
    pub fn pipeline_erstellen(&self) -> FilterPipeline {
        (self.pipeline_fabrik)()
    }
}

impl Default for Protokoll {
    fn default() -> Self {
        Self::standard()
    }
}
