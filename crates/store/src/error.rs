//! Fehlertypen fuer das Speicher-Crate

use thiserror::Error;

/// Speicher-Fehlertypen
///
/// Jeder dieser Fehler bedeutet fuer die Bridge "Speicher nicht verfuegbar":
/// der betroffene Befehl schlaegt fehl, die Verbindung bleibt bestehen.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Speicher nicht verfuegbar: {0}")]
    NichtVerfuegbar(String),

    #[error("Redis-Fehler: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StoreError {
    pub fn nicht_verfuegbar(msg: impl Into<String>) -> Self {
        Self::NichtVerfuegbar(msg.into())
    }
}

/// Result-Typ fuer Speicherzugriffe
pub type StoreResult<T> = Result<T, StoreError>;
