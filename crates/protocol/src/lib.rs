//! relais-protocol – Zeilenbasiertes Client-Protokoll
//!
//! Clients senden genau einen Befehl pro Zeile:
//!
//! ```text
//! GET <key> [<subkey>]
//! SUB <channel>
//! DEL <channel>
//! PING
//! ```
//!
//! Der Server antwortet mit JSON-Umschlaegen (ebenfalls eine Zeile pro
//! Nachricht), siehe [`umschlag::Umschlag`].

pub mod befehl;
pub mod error;
pub mod umschlag;
pub mod wire;

pub use befehl::{parse_zeile, Befehl};
pub use error::{ProtokollFehler, ProtokollResult};
pub use umschlag::{inhalt_dekodieren, Umschlag, QUELLE_VERBINDUNG};
pub use wire::ZeilenCodec;
