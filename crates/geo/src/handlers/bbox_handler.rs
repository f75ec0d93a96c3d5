//! `BBOX <links> <unten> <rechts> <oben>`
//!
//! Ohne Argumente wird die Stufe entfernt. Jede andere Anzahl als 0 oder 4
//! ist ein Parse-Fehler.

use async_trait::async_trait;
use relais_bridge::{BefehlsHandler, BridgeResult, SessionKontext};
use relais_protocol::{Befehl, ProtokollFehler};

use crate::bbox::{Bbox, BboxStufe};

pub struct BboxHandler;

#[async_trait]
impl BefehlsHandler for BboxHandler {
    async fn ausfuehren(&self, befehl: &Befehl, ctx: &mut SessionKontext) -> BridgeResult<()> {
        match befehl.anzahl() {
            0 => {
                if ctx.filter().write().entfernen(BboxStufe::NAME) {
                    tracing::debug!(session = %ctx.session_id, "BBOX entfernt");
                }
            }
            4 => {
                let werte = befehl.zahlen()?;
                let bbox = Bbox::neu(werte[0], werte[1], werte[2], werte[3]);
                ctx.filter().write().setzen(Box::new(BboxStufe::neu(bbox)));
                tracing::debug!(session = %ctx.session_id, ?bbox, "BBOX gesetzt");
            }
            erhalten => {
                return Err(ProtokollFehler::FalscheArgumentAnzahl {
                    verb: befehl.verb.clone(),
                    erwartet: "0 oder 4",
                    erhalten,
                }
                .into());
            }
        }
        Ok(())
    }
}
