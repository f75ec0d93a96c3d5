//! Handler fuer die Basis-Verben

pub mod get_handler;
pub mod kanal_handler;
pub mod ping_handler;

pub use get_handler::GetHandler;
pub use kanal_handler::{DelHandler, SubHandler};
pub use ping_handler::PingHandler;
