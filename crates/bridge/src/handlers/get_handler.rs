//! Get-Handler – Hash-Abfragen
//!
//! `GET <key> [<feld>] [<client_ref>]`
//!
//! - Mit Feld: genau eine Nachricht mit Quelle `"key feld"`, Inhalt ist der
//!   dekodierte Wert oder `null`.
//! - Ohne Feld: eine Nachricht pro Feld (Quelle `"key feld"`), gefiltert
//!   durch die Pipeline der Session. Kommt nichts durch, genau eine
//!   Nachricht mit Quelle `key` und Inhalt `null`.
//!
//! `client_ref` kann auch benannt uebergeben werden (`client_ref=abc`) und
//! wird als `client_reference` zurueckgegeben.

use async_trait::async_trait;
use relais_protocol::{inhalt_dekodieren, Befehl, Umschlag};
use serde_json::Value;

use crate::dispatcher::{BefehlsHandler, SessionKontext};
use crate::error::{BridgeError, BridgeResult};

/// `GET`
pub struct GetHandler;

#[async_trait]
impl BefehlsHandler for GetHandler {
    async fn ausfuehren(&self, befehl: &Befehl, ctx: &mut SessionKontext) -> BridgeResult<()> {
        let key = befehl.pflicht_argument(0, "key")?;
        if !ctx.politik.erlaubt(key) {
            return Err(BridgeError::KanalNichtErlaubt(key.to_string()));
        }
        let feld = befehl.argument_oder_benannt(1, "ref");
        let referenz = befehl
            .argument_oder_benannt(2, "client_ref")
            .map(str::to_string);

        match feld {
            Some(feld) => {
                let mut inhalt = ctx
                    .speicher
                    .hash_feld(key, feld)
                    .await?
                    .map(|wert| inhalt_dekodieren(&wert))
                    .unwrap_or(Value::Null);
                // Transformationen wirken, verworfen wird hier nichts
                ctx.filter().read().anwenden(&mut inhalt);
                ctx.senden(Umschlag::neu(format!("{key} {feld}"), inhalt).mit_referenz(referenz));
            }
            None => {
                let paare = ctx.speicher.hash_alle(key).await?;
                let mut gesendet = 0usize;
                for (feld, wert) in paare {
                    let mut inhalt = inhalt_dekodieren(&wert);
                    if !ctx.filter().read().anwenden(&mut inhalt) {
                        continue;
                    }
                    ctx.senden(
                        Umschlag::neu(format!("{key} {feld}"), inhalt)
                            .mit_referenz(referenz.clone()),
                    );
                    gesendet += 1;
                }
                if gesendet == 0 {
                    tracing::debug!(session = %ctx.session_id, key = key, "GET ohne Daten – leere Nachricht");
                    ctx.senden(Umschlag::neu(key, Value::Null).mit_referenz(referenz));
                }
            }
        }
        Ok(())
    }
}
