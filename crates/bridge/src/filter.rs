//! Filter-Pipeline fuer ausgehende Kanal-Nachrichten
//!
//! Jede Session besitzt eine geordnete Liste von Stufen. Eine Stufe darf den
//! dekodierten Inhalt veraendern oder die Nachricht verwerfen. Die Reihenfolge
//! ergibt sich aus dem Rang der Stufe, nicht aus der Reihenfolge der Befehle.
//! Die Standard-Pipeline ist leer.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Eine Stufe der Filter-Pipeline
pub trait FilterStufe: Send + Sync {
    /// Eindeutiger Name; eine neue Stufe gleichen Namens ersetzt die alte
    fn name(&self) -> &'static str;

    /// Position in der Pipeline (kleiner = frueher)
    fn rang(&self) -> u8;

    /// Wendet die Stufe an; `false` verwirft die Nachricht
    fn anwenden(&self, inhalt: &mut Value) -> bool;
}

/// Geordnete Liste von Filterstufen
#[derive(Default)]
pub struct FilterPipeline {
    stufen: Vec<Box<dyn FilterStufe>>,
}

/// Pipeline die zwischen Session und Multiplexer geteilt wird
pub type GeteiltePipeline = Arc<RwLock<FilterPipeline>>;

impl FilterPipeline {
    /// Leere Pipeline (alles wird unveraendert durchgereicht)
    pub fn neu() -> Self {
        Self::default()
    }

    /// Verpackt die Pipeline fuer die gemeinsame Nutzung
    pub fn geteilt(self) -> GeteiltePipeline {
        Arc::new(RwLock::new(self))
    }

    /// Setzt eine Stufe oder ersetzt die gleichnamige
    pub fn setzen(&mut self, stufe: Box<dyn FilterStufe>) {
        self.stufen.retain(|s| s.name() != stufe.name());
        // stabile Sortierung: gleicher Rang behaelt Einfuegereihenfolge
        let pos = self
            .stufen
            .iter()
            .position(|s| s.rang() > stufe.rang())
            .unwrap_or(self.stufen.len());
        self.stufen.insert(pos, stufe);
    }

    /// Entfernt die Stufe mit diesem Namen
    pub fn entfernen(&mut self, name: &str) -> bool {
        let vorher = self.stufen.len();
        self.stufen.retain(|s| s.name() != name);
        self.stufen.len() != vorher
    }

    pub fn enthaelt(&self, name: &str) -> bool {
        self.stufen.iter().any(|s| s.name() == name)
    }

    pub fn namen(&self) -> Vec<&'static str> {
        self.stufen.iter().map(|s| s.name()).collect()
    }

    pub fn ist_leer(&self) -> bool {
        self.stufen.is_empty()
    }

    /// Wendet alle Stufen der Reihe nach an
    pub fn anwenden(&self, inhalt: &mut Value) -> bool {
        self.stufen.iter().all(|s| s.anwenden(inhalt))
    }

    /// Wie [`anwenden`](Self::anwenden), aber ohne die Stufe `ausgenommen`
    pub fn anwenden_ohne(&self, inhalt: &mut Value, ausgenommen: &str) -> bool {
        self.stufen
            .iter()
            .filter(|s| s.name() != ausgenommen)
            .all(|s| s.anwenden(inhalt))
    }
}

impl std::fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.namen()).finish()
    }
}
