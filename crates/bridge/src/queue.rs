//! Begrenzte Ausgangs-Queue pro Session
//!
//! Der Multiplexer reiht Nachrichten nicht-blockierend ein; der Schreib-Task
//! der Session wartet auf `naechste()`. Bei voller Queue entscheidet die
//! [`UeberlaufStrategie`].

use std::collections::VecDeque;

use parking_lot::Mutex;
use relais_protocol::Umschlag;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Verhalten bei voller Queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UeberlaufStrategie {
    /// Aelteste Nachricht verwerfen und die neue einreihen
    #[default]
    AeltesteVerwerfen,
    /// Queue schliessen, die Session wird getrennt
    Trennen,
}

/// Ergebnis von [`AusgangsQueue::einreihen`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EinreihErgebnis {
    Eingereiht,
    /// Eingereiht, dafuer wurde die aelteste Nachricht verworfen
    AeltesteVerworfen,
    /// Queue voll und Strategie `Trennen`, Queue ist jetzt geschlossen
    Ueberlauf,
    /// Queue war bereits geschlossen
    Geschlossen,
}

struct QueueInner {
    eintraege: VecDeque<Umschlag>,
    geschlossen: bool,
    uebergelaufen: bool,
}

/// Begrenzte Queue mit genau einem Konsumenten
pub struct AusgangsQueue {
    inner: Mutex<QueueInner>,
    signal: Notify,
    schliess_signal: Notify,
    kapazitaet: usize,
    strategie: UeberlaufStrategie,
}

impl AusgangsQueue {
    pub fn neu(kapazitaet: usize, strategie: UeberlaufStrategie) -> Self {
        let kapazitaet = kapazitaet.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                eintraege: VecDeque::with_capacity(kapazitaet.min(64)),
                geschlossen: false,
                uebergelaufen: false,
            }),
            signal: Notify::new(),
            schliess_signal: Notify::new(),
            kapazitaet,
            strategie,
        }
    }

    /// Reiht eine Nachricht ein, blockiert nie
    pub fn einreihen(&self, umschlag: Umschlag) -> EinreihErgebnis {
        let ergebnis = {
            let mut inner = self.inner.lock();
            if inner.geschlossen {
                return EinreihErgebnis::Geschlossen;
            }
            if inner.eintraege.len() < self.kapazitaet {
                inner.eintraege.push_back(umschlag);
                EinreihErgebnis::Eingereiht
            } else {
                match self.strategie {
                    UeberlaufStrategie::AeltesteVerwerfen => {
                        inner.eintraege.pop_front();
                        inner.eintraege.push_back(umschlag);
                        EinreihErgebnis::AeltesteVerworfen
                    }
                    UeberlaufStrategie::Trennen => {
                        inner.geschlossen = true;
                        inner.uebergelaufen = true;
                        inner.eintraege.clear();
                        EinreihErgebnis::Ueberlauf
                    }
                }
            }
        };
        self.signal.notify_one();
        if ergebnis == EinreihErgebnis::Ueberlauf {
            self.schliess_signal.notify_waiters();
        }
        ergebnis
    }

    /// Wartet auf die naechste Nachricht
    ///
    /// `None` sobald die Queue geschlossen ist; verbleibende Eintraege werden
    /// dabei verworfen.
    pub async fn naechste(&self) -> Option<Umschlag> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.geschlossen {
                    return None;
                }
                if let Some(umschlag) = inner.eintraege.pop_front() {
                    return Some(umschlag);
                }
            }
            self.signal.notified().await;
        }
    }

    /// Schliesst die Queue und verwirft alle Eintraege
    pub fn schliessen(&self) {
        {
            let mut inner = self.inner.lock();
            inner.geschlossen = true;
            inner.eintraege.clear();
        }
        self.signal.notify_one();
        self.schliess_signal.notify_waiters();
    }

    /// Wartet bis die Queue geschlossen ist
    ///
    /// Anders als `naechste()` auch dann verwendbar, wenn der Konsument gerade
    /// in einem blockierten Schreibvorgang steckt.
    pub async fn geschlossen(&self) {
        loop {
            let signal = self.schliess_signal.notified();
            tokio::pin!(signal);
            signal.as_mut().enable();
            if self.ist_geschlossen() {
                return;
            }
            signal.await;
        }
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.inner.lock().geschlossen
    }

    /// Ob die Queue wegen Ueberlauf geschlossen wurde
    pub fn ist_uebergelaufen(&self) -> bool {
        self.inner.lock().uebergelaufen
    }

    pub fn laenge(&self) -> usize {
        self.inner.lock().eintraege.len()
    }

    pub fn kapazitaet(&self) -> usize {
        self.kapazitaet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn nachricht(n: i64) -> Umschlag {
        Umschlag::neu("test", json!(n))
    }

    #[tokio::test]
    async fn fifo_reihenfolge() {
        let queue = AusgangsQueue::neu(4, UeberlaufStrategie::AeltesteVerwerfen);
        for n in 0..3 {
            assert_eq!(queue.einreihen(nachricht(n)), EinreihErgebnis::Eingereiht);
        }
        for n in 0..3 {
            assert_eq!(queue.naechste().await.unwrap().content, json!(n));
        }
    }

    #[tokio::test]
    async fn aelteste_verwerfen_bei_ueberlauf() {
        let queue = AusgangsQueue::neu(2, UeberlaufStrategie::AeltesteVerwerfen);
        queue.einreihen(nachricht(1));
        queue.einreihen(nachricht(2));
        assert_eq!(
            queue.einreihen(nachricht(3)),
            EinreihErgebnis::AeltesteVerworfen
        );
        assert_eq!(queue.laenge(), 2);
        assert_eq!(queue.naechste().await.unwrap().content, json!(2));
        assert_eq!(queue.naechste().await.unwrap().content, json!(3));
        assert!(!queue.ist_uebergelaufen());
    }

    #[tokio::test]
    async fn trennen_schliesst_queue() {
        let queue = AusgangsQueue::neu(1, UeberlaufStrategie::Trennen);
        queue.einreihen(nachricht(1));
        assert_eq!(queue.einreihen(nachricht(2)), EinreihErgebnis::Ueberlauf);
        assert!(queue.ist_geschlossen());
        assert!(queue.ist_uebergelaufen());
        assert!(queue.naechste().await.is_none());
        assert_eq!(queue.einreihen(nachricht(3)), EinreihErgebnis::Geschlossen);
    }

    #[tokio::test]
    async fn naechste_wartet_auf_einreihen() {
        let queue = Arc::new(AusgangsQueue::neu(4, UeberlaufStrategie::AeltesteVerwerfen));
        let konsument = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.naechste().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.einreihen(nachricht(7));
        let erhalten = konsument.await.unwrap().unwrap();
        assert_eq!(erhalten.content, json!(7));
    }

    #[tokio::test]
    async fn schliessen_weckt_wartenden_konsumenten() {
        let queue = Arc::new(AusgangsQueue::neu(4, UeberlaufStrategie::AeltesteVerwerfen));
        let konsument = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.naechste().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.schliessen();
        assert!(konsument.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn geschlossen_wartet_auf_ueberlauf() {
        let queue = Arc::new(AusgangsQueue::neu(1, UeberlaufStrategie::Trennen));
        let wartend = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.geschlossen().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!wartend.is_finished());

        queue.einreihen(nachricht(1));
        queue.einreihen(nachricht(2));
        tokio::time::timeout(Duration::from_secs(1), wartend)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn strategie_aus_config_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            ueberlauf: UeberlaufStrategie,
        }
        let w: Wrapper = serde_json::from_str(r#"{"ueberlauf":"trennen"}"#).unwrap();
        assert_eq!(w.ueberlauf, UeberlaufStrategie::Trennen);
        let w: Wrapper = serde_json::from_str(r#"{"ueberlauf":"aelteste_verwerfen"}"#).unwrap();
        assert_eq!(w.ueberlauf, UeberlaufStrategie::AeltesteVerwerfen);
    }
}
