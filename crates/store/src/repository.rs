//! Repository-Trait fuer den Nachrichtenspeicher
//!
//! Das Repository-Pattern entkoppelt die Bridge vom konkreten Broker.
//! Der Trait ist objektsicher (`Arc<dyn Speicher>`), damit der Server das
//! Backend zur Laufzeit aus der Konfiguration waehlen kann.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::StoreResult;

/// Eine auf einem Kanal veroeffentlichte Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KanalNachricht {
    /// Kanal auf dem die Nachricht veroeffentlicht wurde
    pub kanal: String,
    /// Rohe Payload (ueblicherweise JSON)
    pub payload: String,
}

/// Strom eingehender Nachrichten eines Upstream-Abonnements
///
/// Das Abonnement lebt genau so lange wie der Strom: Droppen schliesst es.
/// Endet der Strom von selbst (`None`), ist die Broker-Verbindung verloren.
pub type NachrichtenStrom = BoxStream<'static, KanalNachricht>;

/// Zugriff auf Hashes und Kanal-Abonnements des Brokers
#[async_trait]
pub trait Speicher: Send + Sync + 'static {
    /// Alle Feld/Wert-Paare eines Hashes (leer wenn der Key fehlt)
    async fn hash_alle(&self, key: &str) -> StoreResult<Vec<(String, String)>>;

    /// Ein einzelnes Feld eines Hashes
    async fn hash_feld(&self, key: &str, feld: &str) -> StoreResult<Option<String>>;

    /// Alle Werte eines Hashes ohne Feldnamen
    async fn hash_werte(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Oeffnet ein Upstream-Abonnement fuer genau einen Kanal
    async fn abonnement_oeffnen(&self, kanal: &str) -> StoreResult<NachrichtenStrom>;
}
