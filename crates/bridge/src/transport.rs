//! Transport-Abstraktion
//!
//! Eine Session sieht ihre Verbindung nur als Strom eingehender Zeilen und
//! als Senke fuer ausgehende Zeilen. TCP (Zeilen-Codec) und WebSocket
//! (ein Text-Frame pro Zeile) liefern beide einen [`Transport`].

use std::pin::Pin;

use futures_util::sink::{Sink, SinkExt};
use futures_util::stream::{BoxStream, StreamExt};
use relais_protocol::ZeilenCodec;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::error::{BridgeError, BridgeResult};

/// Eingehende Zeilen; `None` heisst: Verbindung vom Client geschlossen
pub type ZeilenQuelle = BoxStream<'static, BridgeResult<String>>;

/// Ausgehende Zeilen
pub type ZeilenSenke = Pin<Box<dyn Sink<String, Error = BridgeError> + Send>>;

/// Eine Client-Verbindung, aufgeteilt in Lese- und Schreibhaelfte
pub struct Transport {
    pub quelle: ZeilenQuelle,
    pub senke: ZeilenSenke,
}

impl Transport {
    pub fn neu(quelle: ZeilenQuelle, senke: ZeilenSenke) -> Self {
        Self { quelle, senke }
    }

    /// Zeilenbasierter Transport ueber einen beliebigen Byte-Strom
    ///
    /// Zeilen laenger als `max_zeilen_laenge` beenden die Verbindung.
    pub fn zeilen<T>(io: T, max_zeilen_laenge: usize) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let framed = Framed::new(io, ZeilenCodec::with_max_laenge(max_zeilen_laenge));
        let (senke, quelle) = framed.split();
        Self {
            quelle: quelle.map(|zeile| zeile.map_err(BridgeError::from)).boxed(),
            senke: Box::pin(senke.sink_map_err(BridgeError::from)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn zeilen_lesen_und_schreiben() {
        let (client, server) = tokio::io::duplex(1024);
        let mut transport = Transport::zeilen(server, 64);
        let (client_lesen, mut client_schreiben) = tokio::io::split(client);

        client_schreiben.write_all(b"PING\r\nSUB weather\n").await.unwrap();
        assert_eq!(transport.quelle.next().await.unwrap().unwrap(), "PING");
        assert_eq!(transport.quelle.next().await.unwrap().unwrap(), "SUB weather");

        transport.senke.send("PONG".to_string()).await.unwrap();
        let mut zeilen = BufReader::new(client_lesen).lines();
        assert_eq!(zeilen.next_line().await.unwrap().unwrap(), "PONG");
    }

    #[tokio::test]
    async fn client_schliesst_verbindung() {
        let (client, server) = tokio::io::duplex(64);
        let mut transport = Transport::zeilen(server, 64);
        drop(client);
        assert!(transport.quelle.next().await.is_none());
    }

    #[tokio::test]
    async fn zu_lange_zeile_ist_fehler() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut transport = Transport::zeilen(server, 8);
        client.write_all(b"GET sehr-langer-key\n").await.unwrap();
        assert!(matches!(
            transport.quelle.next().await,
            Some(Err(BridgeError::Parse(_)))
        ));
    }
}
