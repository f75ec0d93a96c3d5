//! relais-store – Speicher-Abstraktion
//!
//! Dieses Crate stellt das Repository-Pattern fuer den Nachrichtenspeicher
//! bereit: Hash-Lookups (`HGETALL`, `HGET`, `HVALS`) und Kanal-Abonnements.
//! Die Bridge kennt nur den Trait [`Speicher`]; Redis und eine In-Memory-
//! Variante (Tests, Entwicklung) sind austauschbare Backends.

pub mod error;
pub mod memory;
pub mod redis;
pub mod repository;

pub use error::{StoreError, StoreResult};
pub use memory::MemorySpeicher;
pub use self::redis::RedisSpeicher;
pub use repository::{KanalNachricht, NachrichtenStrom, Speicher};
