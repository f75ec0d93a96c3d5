//! Kanal-Handler – SUB und DEL

use async_trait::async_trait;
use relais_protocol::Befehl;

use crate::dispatcher::{BefehlsHandler, SessionKontext};
use crate::error::{BridgeError, BridgeResult};

/// `SUB <kanal>`
///
/// Keine direkte Antwort; ab jetzt werden Nachrichten des Kanals zugestellt.
pub struct SubHandler;

#[async_trait]
impl BefehlsHandler for SubHandler {
    async fn ausfuehren(&self, befehl: &Befehl, ctx: &mut SessionKontext) -> BridgeResult<()> {
        let kanal = befehl.pflicht_argument(0, "kanal")?;

        // Vor dem Warten eintragen: wird der Lese-Task hier abgebrochen,
        // gibt die Session den Kanal trotzdem frei
        let neu = ctx.abonnements.lock().insert(kanal.to_string());
        let ergebnis = ctx.multiplexer.abonnieren(&ctx.abonnent, kanal).await;
        // Bei Store-Fehlern bleibt das Abonnement bestehen
        if neu && matches!(ergebnis, Err(BridgeError::KanalNichtErlaubt(_))) {
            ctx.abonnements.lock().remove(kanal);
        }
        ergebnis
    }
}

/// `DEL <kanal>`
///
/// Keine direkte Antwort; Abbestellen eines nicht abonnierten Kanals ist
/// ein No-op.
pub struct DelHandler;

#[async_trait]
impl BefehlsHandler for DelHandler {
    async fn ausfuehren(&self, befehl: &Befehl, ctx: &mut SessionKontext) -> BridgeResult<()> {
        let kanal = befehl.pflicht_argument(0, "kanal")?;
        ctx.multiplexer.abbestellen(ctx.session_id, kanal);
        ctx.abonnements.lock().remove(kanal);
        Ok(())
    }
}
