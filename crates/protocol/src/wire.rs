//! Wire-Format fuer TCP-Verbindungen
//!
//! Zeilenbasiertes Protokoll: UTF-8-Text, eine Nachricht pro Zeile,
//! abgeschlossen mit `\n` (optional `\r\n`).
//!
//! Die maximale Zeilenlaenge ist konfigurierbar (Standard: 8 KiB), damit
//! ein Client ohne Zeilenumbruch den Puffer nicht unbegrenzt wachsen laesst.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::error::ProtokollFehler;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Zeilenlaenge (8 KiB)
pub const DEFAULT_MAX_ZEILEN_LAENGE: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// ZeilenCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer zeilenbasierte Verbindungen
///
/// Duenne Huelle um `LinesCodec`, die dessen Fehler auf
/// [`ProtokollFehler`] abbildet.
#[derive(Debug, Clone)]
pub struct ZeilenCodec {
    inner: LinesCodec,
    max_laenge: usize,
}

impl ZeilenCodec {
    /// Erstellt einen neuen `ZeilenCodec` mit Standard-Limit
    pub fn new() -> Self {
        Self::with_max_laenge(DEFAULT_MAX_ZEILEN_LAENGE)
    }

    /// Erstellt einen `ZeilenCodec` mit benutzerdefinierter maximaler Zeilenlaenge
    pub fn with_max_laenge(max_laenge: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_laenge),
            max_laenge,
        }
    }

    /// Gibt die konfigurierte maximale Zeilenlaenge zurueck
    pub fn max_laenge(&self) -> usize {
        self.max_laenge
    }

    fn fehler_abbilden(&self, e: LinesCodecError) -> ProtokollFehler {
        match e {
            LinesCodecError::MaxLineLengthExceeded => ProtokollFehler::ZeileZuLang {
                max: self.max_laenge,
            },
            LinesCodecError::Io(io) => ProtokollFehler::Io(io),
        }
    }
}

impl Default for ZeilenCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ZeilenCodec {
    type Item = String;
    type Error = ProtokollFehler;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.inner.decode(src).map_err(|e| self.fehler_abbilden(e))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.inner.decode_eof(src).map_err(|e| self.fehler_abbilden(e))
    }
}

impl Encoder<String> for ZeilenCodec {
    type Error = ProtokollFehler;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(item, dst).map_err(|e| self.fehler_abbilden(e))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
