//! Integrationstests: echter TCP-Listener auf einem freien Port

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relais_bridge::{BridgeConfig, BridgeState, KanalPolitik, Protokoll, ZeilenServer};
use relais_observability::{HealthState, RelaisMetrics};
use relais_store::MemorySpeicher;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;

const WARTEZEIT: Duration = Duration::from_secs(2);

async fn server_starten(
    speicher: &MemorySpeicher,
    config: BridgeConfig,
) -> (Arc<BridgeState>, SocketAddr, watch::Sender<bool>) {
    let state = BridgeState::neu(
        config,
        Arc::new(speicher.clone()),
        Arc::new(KanalPolitik::alle_erlauben()),
        Protokoll::standard(),
        RelaisMetrics::neu().unwrap(),
        HealthState::neu(),
    );
    let server = ZeilenServer::binden(Arc::clone(&state), "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.lokale_adresse().unwrap();
    let (tx, rx) = watch::channel(false);
    tokio::spawn(server.starten(rx));
    (state, addr, tx)
}

async fn zeile_lesen<R: AsyncBufReadExt + Unpin>(leser: &mut R) -> Option<Value> {
    let mut zeile = String::new();
    let n = tokio::time::timeout(WARTEZEIT, leser.read_line(&mut zeile))
        .await
        .expect("keine Antwort")
        .unwrap();
    (n > 0).then(|| serde_json::from_str(&zeile).unwrap())
}

#[tokio::test]
async fn tcp_begruessung_ping_und_publish() {
    let speicher = MemorySpeicher::neu();
    let (state, addr, _tx) = server_starten(&speicher, BridgeConfig::default()).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (lesen, mut schreiben) = stream.into_split();
    let mut leser = BufReader::new(lesen);

    let begruessung = zeile_lesen(&mut leser).await.unwrap();
    assert_eq!(begruessung["content"]["status"], "open");

    schreiben.write_all(b"SUB weather\nPING\n").await.unwrap();
    assert_eq!(zeile_lesen(&mut leser).await.unwrap()["content"], "PONG");
    assert_eq!(state.verbindungen(), 1);

    speicher.veroeffentlichen("weather", r#"{"temp":20}"#);
    let nachricht = zeile_lesen(&mut leser).await.unwrap();
    assert_eq!(nachricht["source"], "weather");
    assert_eq!(nachricht["content"]["temp"], 20);
}

#[tokio::test]
async fn volle_bridge_lehnt_weitere_verbindungen_ab() {
    let speicher = MemorySpeicher::neu();
    let config = BridgeConfig {
        max_verbindungen: 1,
        ..BridgeConfig::default()
    };
    let (state, addr, _tx) = server_starten(&speicher, config).await;

    let erste = TcpStream::connect(addr).await.unwrap();
    let mut erster_leser = BufReader::new(erste);
    assert!(zeile_lesen(&mut erster_leser).await.is_some());

    let zweite = TcpStream::connect(addr).await.unwrap();
    let mut zweiter_leser = BufReader::new(zweite);
    assert!(zeile_lesen(&mut zweiter_leser).await.is_none());
    assert_eq!(state.verbindungen(), 1);

    // nach dem Trennen ist der Platz wieder frei
    drop(erster_leser);
    for _ in 0..200 {
        if state.verbindungen() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(state.verbindungen(), 0);

    let dritte = TcpStream::connect(addr).await.unwrap();
    let mut dritter_leser = BufReader::new(dritte);
    assert!(zeile_lesen(&mut dritter_leser).await.is_some());
}

#[tokio::test]
async fn shutdown_trennt_clients() {
    let speicher = MemorySpeicher::neu();
    let (state, addr, tx) = server_starten(&speicher, BridgeConfig::default()).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut leser = BufReader::new(stream);
    assert!(zeile_lesen(&mut leser).await.is_some());

    tx.send(true).unwrap();
    assert!(zeile_lesen(&mut leser).await.is_none());
    assert_eq!(state.multiplexer.kanal_anzahl(), 0);
}
