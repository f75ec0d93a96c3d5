//! Ping-Handler – Keepalive vom Client

use async_trait::async_trait;
use relais_protocol::{Befehl, Umschlag};

use crate::dispatcher::{BefehlsHandler, SessionKontext};
use crate::error::BridgeResult;

/// `PING` – antwortet immer mit genau einem `PONG`
pub struct PingHandler;

#[async_trait]
impl BefehlsHandler for PingHandler {
    async fn ausfuehren(&self, _befehl: &Befehl, ctx: &mut SessionKontext) -> BridgeResult<()> {
        ctx.senden(Umschlag::pong());
        Ok(())
    }
}
