//! Befehlsparser fuer das Zeilenprotokoll
//!
//! Parst Befehlszeilen im Format:
//!   VERB arg1 arg2 name=wert
//!
//! Das Verb wird in Grossbuchstaben normalisiert. Argumente werden an
//! Whitespace getrennt; Tokens der Form `name=wert` landen als benannte
//! Argumente in einer eigenen Map. Leere Zeilen sind ein No-op.

use std::collections::BTreeMap;

use crate::error::{ProtokollFehler, ProtokollResult};

/// Ein geparster Client-Befehl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Befehl {
    /// Verb in Grossbuchstaben (z.B. "GET", "SUB")
    pub verb: String,
    /// Positionsargumente in Eingabereihenfolge
    pub argumente: Vec<String>,
    /// Benannte Argumente (`name=wert`)
    pub benannt: BTreeMap<String, String>,
}

impl Befehl {
    /// Gibt das Positionsargument an Stelle `index` zurueck
    pub fn argument(&self, index: usize) -> Option<&str> {
        self.argumente.get(index).map(String::as_str)
    }

    /// Gibt ein Pflicht-Positionsargument zurueck oder einen Fehler
    pub fn pflicht_argument(&self, index: usize, name: &'static str) -> ProtokollResult<&str> {
        self.argument(index).ok_or_else(|| ProtokollFehler::FehlendesArgument {
            verb: self.verb.clone(),
            name,
        })
    }

    /// Gibt ein benanntes Argument zurueck
    pub fn benannt(&self, name: &str) -> Option<&str> {
        self.benannt.get(name).map(String::as_str)
    }

    /// Positionsargument oder gleichnamiges benanntes Argument
    ///
    /// `GET key ref cref` und `GET key ref client_ref=cref` sind gleichwertig.
    pub fn argument_oder_benannt(&self, index: usize, name: &str) -> Option<&str> {
        self.argument(index).or_else(|| self.benannt(name))
    }

    /// Anzahl der Positionsargumente
    pub fn anzahl(&self) -> usize {
        self.argumente.len()
    }

    /// Parst alle Positionsargumente als endliche `f64`
    ///
    /// `NaN` und `inf` gelten als ungueltig.
    pub fn zahlen(&self) -> ProtokollResult<Vec<f64>> {
        self.argumente
            .iter()
            .map(|a| match a.parse::<f64>() {
                Ok(zahl) if zahl.is_finite() => Ok(zahl),
                _ => Err(ProtokollFehler::UngueltigesArgument {
                    verb: self.verb.clone(),
                    wert: a.clone(),
                }),
            })
            .collect()
    }
}

/// Parst eine Befehlszeile
///
/// Gibt `None` zurueck wenn die Zeile leer ist oder nur Whitespace enthaelt.
pub fn parse_zeile(zeile: &str) -> Option<Befehl> {
    let mut tokens = zeile.split_whitespace();
    let verb = tokens.next()?.to_uppercase();

    let mut argumente = Vec::new();
    let mut benannt = BTreeMap::new();
    for token in tokens {
        match token.split_once('=') {
            Some((name, wert)) if !name.is_empty() => {
                benannt.insert(name.to_string(), wert.to_string());
            }
            _ => argumente.push(token.to_string()),
        }
    }

    Some(Befehl {
        verb,
        argumente,
        benannt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_einfacher_befehl() {
        let cmd = parse_zeile("PING").unwrap();
        assert_eq!(cmd.verb, "PING");
        assert!(cmd.argumente.is_empty());
        assert!(cmd.benannt.is_empty());
    }

    #[test]
    fn verb_wird_grossgeschrieben() {
        let cmd = parse_zeile("sub weather").unwrap();
        assert_eq!(cmd.verb, "SUB");
        assert_eq!(cmd.argument(0), Some("weather"));
    }

    #[test]
    fn argumente_an_whitespace_getrennt() {
        let cmd = parse_zeile("  GET   egg\tref  ").unwrap();
        assert_eq!(cmd.verb, "GET");
        assert_eq!(cmd.argumente, vec!["egg", "ref"]);
    }

    #[test]
    fn benannte_argumente() {
        let cmd = parse_zeile("GET egg ref client_ref=cref").unwrap();
        assert_eq!(cmd.anzahl(), 2);
        assert_eq!(cmd.benannt("client_ref"), Some("cref"));
        assert_eq!(cmd.argument_oder_benannt(2, "client_ref"), Some("cref"));
    }

    #[test]
    fn positionsargument_hat_vorrang() {
        let cmd = parse_zeile("GET egg ref cref").unwrap();
        assert_eq!(cmd.argument_oder_benannt(2, "client_ref"), Some("cref"));
    }

    #[test]
    fn gleichheitszeichen_am_anfang_ist_positionsargument() {
        let cmd = parse_zeile("SUB =seltsam").unwrap();
        assert_eq!(cmd.argument(0), Some("=seltsam"));
    }

    #[test]
    fn leere_zeile_ist_noop() {
        assert!(parse_zeile("").is_none());
        assert!(parse_zeile("   \t ").is_none());
    }

    #[test]
    fn pflicht_argument_fehlt() {
        let cmd = parse_zeile("SUB").unwrap();
        let fehler = cmd.pflicht_argument(0, "channel").unwrap_err();
        assert!(matches!(fehler, ProtokollFehler::FehlendesArgument { .. }));
        assert!(fehler.to_string().contains("SUB"));
    }

    #[test]
    fn zahlen_parsen() {
        let cmd = parse_zeile("BBOX 1 2.5 -3 4e1").unwrap();
        assert_eq!(cmd.zahlen().unwrap(), vec![1.0, 2.5, -3.0, 40.0]);

        let cmd = parse_zeile("BBOX 1 zwei 3 4").unwrap();
        assert!(cmd.zahlen().is_err());
    }

    #[test]
    fn nicht_endliche_zahlen_sind_ungueltig() {
        for zeile in ["BBOX NaN 0 1 1", "BBOX 0 inf 1 1", "BBOX 0 0 -infinity 1"] {
            let cmd = parse_zeile(zeile).unwrap();
            assert!(matches!(
                cmd.zahlen(),
                Err(ProtokollFehler::UngueltigesArgument { .. })
            ));
        }
    }
}
