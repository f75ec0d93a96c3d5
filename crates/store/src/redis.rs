//! Redis-Backend
//!
//! Hash-Befehle laufen ueber einen `ConnectionManager`, der die Verbindung
//! selbststaendig wiederherstellt. Jedes Kanal-Abonnement bekommt eine
//! eigene Pub/Sub-Verbindung, damit Droppen des Stroms genau diesen einen
//! Kanal abbestellt.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::{future, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::repository::{KanalNachricht, NachrichtenStrom, Speicher};

/// Redis-Implementierung von [`Speicher`]
#[derive(Clone)]
pub struct RedisSpeicher {
    client: redis::Client,
    verbindung: ConnectionManager,
}

impl RedisSpeicher {
    /// Verbindet sich mit dem Broker unter `url` (z.B. `redis://localhost:6379`)
    pub async fn verbinden(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let verbindung = ConnectionManager::new(client.clone()).await?;
        info!(url = %url, "Redis-Verbindung hergestellt");
        Ok(Self { client, verbindung })
    }
}

#[async_trait]
impl Speicher for RedisSpeicher {
    async fn hash_alle(&self, key: &str) -> StoreResult<Vec<(String, String)>> {
        let mut con = self.verbindung.clone();
        let hash: BTreeMap<String, String> = con.hgetall(key).await?;
        Ok(hash.into_iter().collect())
    }

    async fn hash_feld(&self, key: &str, feld: &str) -> StoreResult<Option<String>> {
        let mut con = self.verbindung.clone();
        let wert: Option<String> = con.hget(key, feld).await?;
        Ok(wert)
    }

    async fn hash_werte(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut con = self.verbindung.clone();
        let werte: Vec<String> = con.hvals(key).await?;
        Ok(werte)
    }

    async fn abonnement_oeffnen(&self, kanal: &str) -> StoreResult<NachrichtenStrom> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(kanal).await?;
        debug!(kanal = kanal, "Redis-Abonnement geoeffnet");

        let strom = pubsub.into_on_message().filter_map(|msg| {
            let kanal = msg.get_channel_name().to_string();
            let nachricht = match msg.get_payload::<String>() {
                Ok(payload) => Some(KanalNachricht { kanal, payload }),
                Err(e) => {
                    warn!(kanal = %kanal, fehler = %e, "Payload ist kein UTF-8 – verworfen");
                    None
                }
            };
            future::ready(nachricht)
        });
        Ok(strom.boxed())
    }
}
