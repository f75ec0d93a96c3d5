//! `PGET <key> [<ref>] [<client_ref>] [projection=<crs>]`
//!
//! Wie `GET`, liefert aber die Hash-Werte und projiziert sie auf das
//! angegebene CRS (Standard `epsg:4326`) statt auf die PROJECTION der
//! Session. Die Bounding-Box der Session gilt weiterhin.
//!
//! Quelle ist `"key ref"` mit Feld, sonst `key`. Kommt nichts durch, folgt
//! genau eine Nachricht mit Quelle `key` und Inhalt `null`.

use async_trait::async_trait;
use relais_bridge::{BefehlsHandler, BridgeError, BridgeResult, SessionKontext};
use relais_protocol::{inhalt_dekodieren, Befehl, Umschlag};
use serde_json::Value;

use crate::projektion::{Crs, ProjektionStufe, Transformation};

pub struct PgetHandler {
    strikte_achsen: bool,
}

impl PgetHandler {
    pub fn neu(strikte_achsen: bool) -> Self {
        Self { strikte_achsen }
    }
}

#[async_trait]
impl BefehlsHandler for PgetHandler {
    async fn ausfuehren(&self, befehl: &Befehl, ctx: &mut SessionKontext) -> BridgeResult<()> {
        let key = befehl.pflicht_argument(0, "key")?;
        if !ctx.politik.erlaubt(key) {
            return Err(BridgeError::KanalNichtErlaubt(key.to_string()));
        }
        let feld = befehl.argument_oder_benannt(1, "ref");
        let referenz = befehl
            .argument_oder_benannt(2, "client_ref")
            .map(str::to_string);
        let ziel = match befehl.benannt("projection") {
            Some(code) => code
                .parse::<Crs>()
                .map_err(|e| e.fuer_verb(&befehl.verb))?,
            None => Crs::Wgs84,
        };
        let transformation = Transformation::neu(ziel, self.strikte_achsen);

        let (quelle, werte) = match feld {
            Some(feld) => (
                format!("{key} {feld}"),
                ctx.speicher.hash_feld(key, feld).await?.into_iter().collect::<Vec<_>>(),
            ),
            None => (key.to_string(), ctx.speicher.hash_werte(key).await?),
        };

        let mut gesendet = 0usize;
        for wert in werte {
            let mut inhalt = inhalt_dekodieren(&wert);
            if !ctx
                .filter()
                .read()
                .anwenden_ohne(&mut inhalt, ProjektionStufe::NAME)
            {
                continue;
            }
            if ziel != Crs::Wgs84 {
                transformation.anwenden(&mut inhalt);
            }
            ctx.senden(Umschlag::neu(quelle.clone(), inhalt).mit_referenz(referenz.clone()));
            gesendet += 1;
        }
        if gesendet == 0 {
            ctx.senden(Umschlag::neu(key, Value::Null).mit_referenz(referenz));
        }

        tracing::debug!(session = %ctx.session_id, key = key, ziel = %ziel, gesendet, "PGET beantwortet");
        Ok(())
    }
}
