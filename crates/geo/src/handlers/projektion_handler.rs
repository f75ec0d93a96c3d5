//! `PROJECTION <crs>`
//!
//! `epsg:4326` ist das Quell-CRS und entfernt die Stufe. Unbekannte Codes
//! werden protokolliert und ignoriert, die bisherige Stufe bleibt.

use async_trait::async_trait;
use relais_bridge::{BefehlsHandler, BridgeResult, SessionKontext};
use relais_protocol::{Befehl, ProtokollFehler};

use crate::projektion::{Crs, ProjektionStufe, Transformation};

pub struct ProjektionHandler {
    strikte_achsen: bool,
}

impl ProjektionHandler {
    pub fn neu(strikte_achsen: bool) -> Self {
        Self { strikte_achsen }
    }
}

#[async_trait]
impl BefehlsHandler for ProjektionHandler {
    async fn ausfuehren(&self, befehl: &Befehl, ctx: &mut SessionKontext) -> BridgeResult<()> {
        let [code] = befehl.argumente.as_slice() else {
            return Err(ProtokollFehler::FalscheArgumentAnzahl {
                verb: befehl.verb.clone(),
                erwartet: "1",
                erhalten: befehl.anzahl(),
            }
            .into());
        };

        match code.parse::<Crs>() {
            Ok(Crs::Wgs84) => {
                if ctx.filter().write().entfernen(ProjektionStufe::NAME) {
                    tracing::debug!(session = %ctx.session_id, "PROJECTION entfernt");
                }
            }
            Ok(ziel) => {
                let stufe = ProjektionStufe::neu(Transformation::neu(ziel, self.strikte_achsen));
                ctx.filter().write().setzen(Box::new(stufe));
                tracing::debug!(session = %ctx.session_id, ziel = %ziel, "PROJECTION gesetzt");
            }
            Err(e) => {
                tracing::info!(session = %ctx.session_id, peer = %ctx.peer, fehler = %e, "PROJECTION ignoriert");
            }
        }
        Ok(())
    }
}
