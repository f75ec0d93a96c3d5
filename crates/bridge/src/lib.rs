//! relais-bridge – Session- und Kanal-Multiplexing
//!
//! Dieser Crate verbindet viele kurzlebige Client-Verbindungen mit einem
//! gemeinsamen Pub/Sub-Broker. Jede Verbindung bekommt eine `ClientSession`
//! mit eigenem Lese- und Schreib-Task; Kanal-Abonnements laufen ueber den
//! `KanalMultiplexer`, der pro Kanal genau ein Upstream-Abonnement haelt.
//!
//! ## Architektur
//!
//! ```text
//! ZeilenServer (TCP) / ws_router (WebSocket)
//!     |
//!     v
//! ClientSession (pro Verbindung ein Lese- und ein Schreib-Task)
//!     |  State Machine: Aktiv -> Schliessend -> Geschlossen
//!     |
//!     v
//! BefehlsRegistry
//!     |
//!     +-- GetHandler   (GET key [feld])
//!     +-- SubHandler   (SUB kanal)
//!     +-- DelHandler   (DEL kanal)
//!     +-- PingHandler  (PING)
//!     +-- ...          (Erweiterungen, z.B. BBOX/PROJECTION)
//!
//! KanalMultiplexer – Kanal -> Abonnenten, ein Upstream-Task pro Kanal
//!     |
//!     v
//! FilterPipeline (pro Session) -> AusgangsQueue (pro Session) -> Transport
//! ```

pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod multiplexer;
pub mod queue;
pub mod server_state;
pub mod session;
pub mod tcp;
pub mod transport;
pub mod ws;
pub mod zulassung;

// Bequeme Re-Exporte
pub use dispatcher::{BefehlsHandler, BefehlsRegistry, Protokoll, SessionKontext};
pub use error::{BridgeError, BridgeResult};
pub use filter::{FilterPipeline, FilterStufe, GeteiltePipeline};
pub use multiplexer::{Abonnent, KanalMultiplexer, MultiplexerConfig};
pub use queue::{AusgangsQueue, EinreihErgebnis, UeberlaufStrategie};
pub use server_state::{BridgeConfig, BridgeState};
pub use session::{ClientSession, SessionConfig, SessionZustand};
pub use tcp::ZeilenServer;
pub use transport::Transport;
pub use ws::{ws_router, WsServer};
pub use zulassung::KanalPolitik;
