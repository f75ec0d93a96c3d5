//! Zeitstempel fuer ausgehende Nachrichten

use chrono::Utc;

/// Aktueller Zeitpunkt in Millisekunden seit der Unix-Epoche
///
/// Als Gleitkommazahl, so wie JavaScript-Clients `Date` erwarten.
pub fn zeitstempel_ms() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeitstempel_ist_plausibel() {
        let ts = zeitstempel_ms();
        // Nach 2020-01-01
        assert!(ts > 1_577_836_800_000.0);
    }

    #[test]
    fn zeitstempel_ist_monoton_genug() {
        let a = zeitstempel_ms();
        let b = zeitstempel_ms();
        assert!(b >= a);
    }
}
