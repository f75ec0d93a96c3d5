//! In-Memory-Speicher
//!
//! Vollstaendige `Speicher`-Implementierung ohne externen Broker. Wird fuer
//! Tests und lokale Entwicklung verwendet und zaehlt offene Abonnements pro
//! Kanal, damit das Multiplexing von aussen beobachtbar ist.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::error::{StoreError, StoreResult};
use crate::repository::{KanalNachricht, NachrichtenStrom, Speicher};

/// Puffer pro Abonnement
const ABO_PUFFER: usize = 1024;

/// Ein offenes Abonnement auf einem Kanal
struct AboEintrag {
    id: u64,
    tx: mpsc::Sender<KanalNachricht>,
}

#[derive(Default)]
struct KanalZustand {
    offen: Vec<AboEintrag>,
    /// Wie oft fuer diesen Kanal ein Abonnement geoeffnet wurde
    geoeffnet_gesamt: usize,
}

/// In-Memory-Implementierung von [`Speicher`]
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct MemorySpeicher {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    hashes: RwLock<HashMap<String, BTreeMap<String, String>>>,
    kanaele: Mutex<HashMap<String, KanalZustand>>,
    naechste_id: AtomicU64,
    gestoert: AtomicBool,
}

/// Entfernt das Abonnement aus dem Kanal wenn der Strom gedroppt wird
struct AboWaechter {
    inner: Arc<MemoryInner>,
    kanal: String,
    id: u64,
}

impl Drop for AboWaechter {
    fn drop(&mut self) {
        let mut kanaele = self.inner.kanaele.lock();
        if let Some(zustand) = kanaele.get_mut(&self.kanal) {
            zustand.offen.retain(|abo| abo.id != self.id);
        }
    }
}

impl MemorySpeicher {
    /// Erstellt einen leeren Speicher
    pub fn neu() -> Self {
        Self::default()
    }

    /// Setzt ein Feld in einem Hash (HSET)
    pub fn hash_setzen(&self, key: &str, feld: &str, wert: &str) {
        self.inner
            .hashes
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(feld.to_string(), wert.to_string());
    }

    /// Veroeffentlicht eine Nachricht (PUBLISH)
    ///
    /// Gibt die Anzahl der Abonnements zurueck, die sie erhalten haben.
    pub fn veroeffentlichen(&self, kanal: &str, payload: &str) -> usize {
        let kanaele = self.inner.kanaele.lock();
        let Some(zustand) = kanaele.get(kanal) else {
            return 0;
        };

        let mut zugestellt = 0;
        for abo in &zustand.offen {
            let nachricht = KanalNachricht {
                kanal: kanal.to_string(),
                payload: payload.to_string(),
            };
            match abo.tx.try_send(nachricht) {
                Ok(()) => zugestellt += 1,
                Err(e) => {
                    tracing::warn!(kanal = kanal, fehler = %e, "Abonnement-Puffer voll – Nachricht verworfen");
                }
            }
        }
        zugestellt
    }

    /// Anzahl aktuell offener Abonnements fuer einen Kanal
    pub fn offene_abonnements(&self, kanal: &str) -> usize {
        self.inner
            .kanaele
            .lock()
            .get(kanal)
            .map(|z| z.offen.iter().filter(|abo| !abo.tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Wie oft insgesamt ein Abonnement fuer den Kanal geoeffnet wurde
    pub fn abonnements_geoeffnet(&self, kanal: &str) -> usize {
        self.inner
            .kanaele
            .lock()
            .get(kanal)
            .map(|z| z.geoeffnet_gesamt)
            .unwrap_or(0)
    }

    /// Simuliert einen Broker-Ausfall
    ///
    /// Waehrend der Stoerung schlagen alle Operationen fehl; offene
    /// Abonnements werden beendet, so wie beim Verbindungsverlust.
    pub fn stoerung_setzen(&self, gestoert: bool) {
        self.inner.gestoert.store(gestoert, Ordering::SeqCst);
        if gestoert {
            for zustand in self.inner.kanaele.lock().values_mut() {
                zustand.offen.clear();
            }
        }
    }

    fn verfuegbarkeit_pruefen(&self) -> StoreResult<()> {
        if self.inner.gestoert.load(Ordering::SeqCst) {
            return Err(StoreError::nicht_verfuegbar("In-Memory-Speicher gestoert"));
        }
        Ok(())
    }
}

#[async_trait]
impl Speicher for MemorySpeicher {
    async fn hash_alle(&self, key: &str) -> StoreResult<Vec<(String, String)>> {
        self.verfuegbarkeit_pruefen()?;
        Ok(self
            .inner
            .hashes
            .read()
            .get(key)
            .map(|hash| hash.iter().map(|(f, w)| (f.clone(), w.clone())).collect())
            .unwrap_or_default())
    }

    async fn hash_feld(&self, key: &str, feld: &str) -> StoreResult<Option<String>> {
        self.verfuegbarkeit_pruefen()?;
        Ok(self
            .inner
            .hashes
            .read()
            .get(key)
            .and_then(|hash| hash.get(feld).cloned()))
    }

    async fn hash_werte(&self, key: &str) -> StoreResult<Vec<String>> {
        self.verfuegbarkeit_pruefen()?;
        Ok(self
            .inner
            .hashes
            .read()
            .get(key)
            .map(|hash| hash.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn abonnement_oeffnen(&self, kanal: &str) -> StoreResult<NachrichtenStrom> {
        self.verfuegbarkeit_pruefen()?;

        let id = self.inner.naechste_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(ABO_PUFFER);
        {
            let mut kanaele = self.inner.kanaele.lock();
            let zustand = kanaele.entry(kanal.to_string()).or_default();
            zustand.offen.push(AboEintrag { id, tx });
            zustand.geoeffnet_gesamt += 1;
        }
        tracing::debug!(kanal = kanal, abo_id = id, "In-Memory-Abonnement geoeffnet");

        let waechter = AboWaechter {
            inner: Arc::clone(&self.inner),
            kanal: kanal.to_string(),
            id,
        };
        let strom = stream::unfold((rx, waechter), |(mut rx, waechter)| async move {
            rx.recv().await.map(|nachricht| (nachricht, (rx, waechter)))
        });
        Ok(strom.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_lesen_und_schreiben() {
        let speicher = MemorySpeicher::neu();
        speicher.hash_setzen("egg", "a", "1");
        speicher.hash_setzen("egg", "b", "2");

        let alle = speicher.hash_alle("egg").await.unwrap();
        assert_eq!(
            alle,
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
        assert_eq!(speicher.hash_feld("egg", "b").await.unwrap().as_deref(), Some("2"));
        assert_eq!(speicher.hash_werte("egg").await.unwrap(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn fehlender_key_ist_leer() {
        let speicher = MemorySpeicher::neu();
        assert!(speicher.hash_alle("fehlt").await.unwrap().is_empty());
        assert!(speicher.hash_feld("fehlt", "x").await.unwrap().is_none());
        assert!(speicher.hash_werte("fehlt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stoerung_laesst_operationen_fehlschlagen() {
        let speicher = MemorySpeicher::neu();
        speicher.stoerung_setzen(true);
        assert!(speicher.hash_alle("egg").await.is_err());
        assert!(speicher.abonnement_oeffnen("egg").await.is_err());

        speicher.stoerung_setzen(false);
        assert!(speicher.hash_alle("egg").await.is_ok());
    }
}
