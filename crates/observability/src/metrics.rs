//! Prometheus-kompatible Metriken fuer relais
//!
//! Registrierte Metriken:
//! - `relais_sessions_active` – Gauge: Offene Client-Sessions
//! - `relais_channels_active` – Gauge: Kanaele mit offenem Upstream-Abonnement
//! - `relais_messages_delivered_total` – Counter: In Ausgangs-Queues eingereihte Nachrichten
//! - `relais_messages_dropped_total` – Counter: Wegen Queue-Ueberlauf verworfene Nachrichten
//! - `relais_messages_filtered_total` – Counter: Von der Filter-Pipeline verworfene Nachrichten
//! - `relais_upstream_failures_total` – Counter: Fehlgeschlagene Upstream-Abonnements
//!
//! Kanalnamen waehlen die Clients; sie landen deshalb nur im Log, nie als Label.

use anyhow::Result;
use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle relais-Prometheus-Metriken
///
/// Jede Instanz hat ihre eigene Registry; Clone teilt sie.
#[derive(Clone)]
pub struct RelaisMetrics {
    pub registry: Arc<Registry>,

    pub sessions_active: IntGauge,
    pub channels_active: IntGauge,
    pub messages_delivered_total: IntCounter,
    pub messages_dropped_total: IntCounter,
    pub messages_filtered_total: IntCounter,
    pub upstream_failures_total: IntCounter,
}

impl RelaisMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let sessions_active = IntGauge::with_opts(Opts::new(
            "relais_sessions_active",
            "Anzahl offener Client-Sessions",
        ))?;
        registry.register(Box::new(sessions_active.clone()))?;

        let channels_active = IntGauge::with_opts(Opts::new(
            "relais_channels_active",
            "Anzahl Kanaele mit offenem Upstream-Abonnement",
        ))?;
        registry.register(Box::new(channels_active.clone()))?;

        let messages_delivered_total = IntCounter::with_opts(Opts::new(
            "relais_messages_delivered_total",
            "In Ausgangs-Queues eingereihte Nachrichten",
        ))?;
        registry.register(Box::new(messages_delivered_total.clone()))?;

        let messages_dropped_total = IntCounter::with_opts(Opts::new(
            "relais_messages_dropped_total",
            "Wegen Queue-Ueberlauf verworfene Nachrichten",
        ))?;
        registry.register(Box::new(messages_dropped_total.clone()))?;

        let messages_filtered_total = IntCounter::with_opts(Opts::new(
            "relais_messages_filtered_total",
            "Von der Filter-Pipeline verworfene Nachrichten",
        ))?;
        registry.register(Box::new(messages_filtered_total.clone()))?;

        let upstream_failures_total = IntCounter::with_opts(Opts::new(
            "relais_upstream_failures_total",
            "Fehlgeschlagene Upstream-Abonnements",
        ))?;
        registry.register(Box::new(upstream_failures_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            sessions_active,
            channels_active,
            messages_delivered_total,
            messages_dropped_total,
            messages_filtered_total,
            upstream_failures_total,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RelaisMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(
    axum::extract::State(metriken): axum::extract::State<RelaisMetrics>,
) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
