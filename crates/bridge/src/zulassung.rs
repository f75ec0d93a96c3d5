//! Kanal-Zulassung
//!
//! Ein Kanal (oder Hash-Key bei `GET`) ist erlaubt, wenn er in der Namensliste
//! steht oder auf eines der Glob-Muster passt. Die Politik wird bei jedem
//! Aufruf neu ausgewertet, Aenderungen wirken also sofort.

use std::collections::HashSet;

use globset::{GlobBuilder, GlobMatcher};
use parking_lot::RwLock;

use crate::error::{BridgeError, BridgeResult};

/// Zulassungspolitik fuer Kanaele
#[derive(Debug, Default)]
pub struct KanalPolitik {
    namen: RwLock<HashSet<String>>,
    muster: RwLock<Vec<GlobMatcher>>,
}

impl KanalPolitik {
    /// Erstellt eine Politik aus Namensliste und Glob-Mustern
    ///
    /// Ohne Namen und Muster ist kein Kanal erlaubt.
    pub fn neu<N, M>(namen: N, muster: M) -> BridgeResult<Self>
    where
        N: IntoIterator,
        N::Item: Into<String>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        let politik = Self {
            namen: RwLock::new(namen.into_iter().map(Into::into).collect()),
            muster: RwLock::new(Vec::new()),
        };
        for m in muster {
            politik.muster_hinzufuegen(m.as_ref())?;
        }
        Ok(politik)
    }

    /// Politik die jeden Kanal erlaubt
    pub fn alle_erlauben() -> Self {
        let politik = Self::default();
        // "*" ist immer gueltig
        let _ = politik.muster_hinzufuegen("*");
        politik
    }

    /// Prueft ob ein Kanal erlaubt ist
    pub fn erlaubt(&self, kanal: &str) -> bool {
        if kanal.is_empty() {
            return false;
        }
        if self.namen.read().contains(kanal) {
            return true;
        }
        self.muster.read().iter().any(|m| m.is_match(kanal))
    }

    /// Nimmt einen Kanalnamen in die Liste auf
    pub fn name_erlauben(&self, name: impl Into<String>) {
        self.namen.write().insert(name.into());
    }

    /// Entfernt einen Kanalnamen aus der Liste
    pub fn name_entziehen(&self, name: &str) -> bool {
        self.namen.write().remove(name)
    }

    /// Fuegt ein Glob-Muster hinzu (z.B. `sensor.*`)
    pub fn muster_hinzufuegen(&self, muster: &str) -> BridgeResult<()> {
        let glob = GlobBuilder::new(muster)
            .literal_separator(false)
            .build()
            .map_err(|e| BridgeError::UngueltigesMuster {
                muster: muster.to_string(),
                grund: e.to_string(),
            })?;
        self.muster.write().push(glob.compile_matcher());
        Ok(())
    }

    /// Entfernt alle Muster
    pub fn muster_leeren(&self) {
        self.muster.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namensliste_erlaubt_exakt() {
        let politik = KanalPolitik::neu(["weather", "traffic"], Vec::<String>::new()).unwrap();
        assert!(politik.erlaubt("weather"));
        assert!(politik.erlaubt("traffic"));
        assert!(!politik.erlaubt("weather2"));
    }

    #[test]
    fn muster_erlaubt_passende_namen() {
        let politik = KanalPolitik::neu(Vec::<String>::new(), ["sensor.*"]).unwrap();
        assert!(politik.erlaubt("sensor.temp"));
        assert!(!politik.erlaubt("weather"));
    }

    #[test]
    fn leere_politik_erlaubt_nichts() {
        let politik = KanalPolitik::default();
        assert!(!politik.erlaubt("weather"));
    }

    #[test]
    fn leerer_kanalname_nie_erlaubt() {
        assert!(!KanalPolitik::alle_erlauben().erlaubt(""));
        assert!(KanalPolitik::alle_erlauben().erlaubt("beliebig"));
    }

    #[test]
    fn aenderungen_wirken_sofort() {
        let politik = KanalPolitik::default();
        assert!(!politik.erlaubt("weather"));
        politik.name_erlauben("weather");
        assert!(politik.erlaubt("weather"));
        assert!(politik.name_entziehen("weather"));
        assert!(!politik.erlaubt("weather"));

        politik.muster_hinzufuegen("w*").unwrap();
        assert!(politik.erlaubt("weather"));
        politik.muster_leeren();
        assert!(!politik.erlaubt("weather"));
    }

    #[test]
    fn ungueltiges_muster_abgelehnt() {
        let ergebnis = KanalPolitik::neu(Vec::<String>::new(), ["[a-"]);
        assert!(matches!(
            ergebnis,
            Err(BridgeError::UngueltigesMuster { .. })
        ));
    }
}
