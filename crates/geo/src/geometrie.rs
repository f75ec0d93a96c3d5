//! GeoJSON-Navigation fuer die Filterstufen
//!
//! Eine Position ist ein Array aus mindestens zwei Zahlen. Weitere Werte
//! (z.B. die Hoehe) bleiben bei Transformationen erhalten.

use serde_json::{Number, Value};

/// Verschachtelungstiefe der Koordinaten je Geometrietyp
///
/// `None` fuer Typen die nicht unterstuetzt werden (z.B. `GeometryCollection`).
pub fn tiefe(typ: &str) -> Option<usize> {
    match typ {
        "Point" => Some(0),
        "LineString" | "MultiPoint" => Some(1),
        "Polygon" | "MultiLineString" => Some(2),
        "MultiPolygon" => Some(3),
        _ => None,
    }
}

fn typ(inhalt: &Value) -> Option<&str> {
    inhalt.get("type")?.as_str()
}

pub fn ist_sammlung(inhalt: &Value) -> bool {
    typ(inhalt) == Some("FeatureCollection")
}

/// Features einer `FeatureCollection`
pub fn features(inhalt: &Value) -> Option<&Vec<Value>> {
    if !ist_sammlung(inhalt) {
        return None;
    }
    inhalt.get("features")?.as_array()
}

pub fn features_mut(inhalt: &mut Value) -> Option<&mut Vec<Value>> {
    if !ist_sammlung(inhalt) {
        return None;
    }
    inhalt.get_mut("features")?.as_array_mut()
}

/// Geometrie eines `Feature` oder die nackte Geometrie selbst
pub fn geometrie(inhalt: &Value) -> Option<&Value> {
    match typ(inhalt)? {
        "Feature" => inhalt.get("geometry").filter(|g| g.is_object()),
        t if tiefe(t).is_some() => Some(inhalt),
        _ => None,
    }
}

pub fn geometrie_mut(inhalt: &mut Value) -> Option<&mut Value> {
    let ist_feature = match typ(inhalt)? {
        "Feature" => true,
        t if tiefe(t).is_some() => false,
        _ => return None,
    };
    if ist_feature {
        inhalt.get_mut("geometry").filter(|g| g.is_object())
    } else {
        Some(inhalt)
    }
}

/// Koordinaten und Tiefe einer Geometrie, sofern der Typ bekannt ist
pub fn koordinaten(geometrie: &Value) -> Option<(&Value, usize)> {
    let tiefe = tiefe(typ(geometrie)?)?;
    Some((geometrie.get("coordinates")?, tiefe))
}

pub fn position(wert: &Value) -> Option<(f64, f64)> {
    match wert.as_array()?.as_slice() {
        [x, y, ..] => Some((x.as_f64()?, y.as_f64()?)),
        _ => None,
    }
}

/// Alle Positionen einer Koordinatenstruktur; `None` wenn sie fehlerhaft ist
pub fn positionen(koordinaten: &Value, tiefe: usize) -> Option<Vec<(f64, f64)>> {
    let mut aus = Vec::new();
    sammeln(koordinaten, tiefe, &mut aus)?;
    Some(aus)
}

fn sammeln(koordinaten: &Value, tiefe: usize, aus: &mut Vec<(f64, f64)>) -> Option<()> {
    if tiefe == 0 {
        aus.push(position(koordinaten)?);
        return Some(());
    }
    for kind in koordinaten.as_array()? {
        sammeln(kind, tiefe - 1, aus)?;
    }
    Some(())
}

/// Bildet jede Position ab und baut die Struktur neu auf
///
/// `None` bei fehlerhafter Struktur oder nicht endlichem Ergebnis; das
/// Original bleibt dann unberuehrt.
pub fn positionen_abbilden<F>(koordinaten: &Value, tiefe: usize, f: &F) -> Option<Value>
where
    F: Fn(f64, f64) -> (f64, f64),
{
    if tiefe == 0 {
        let teile = koordinaten.as_array()?;
        let (x, y) = position(koordinaten)?;
        let (a, b) = f(x, y);
        let mut neu = Vec::with_capacity(teile.len());
        neu.push(Value::Number(Number::from_f64(a)?));
        neu.push(Value::Number(Number::from_f64(b)?));
        neu.extend(teile.iter().skip(2).cloned());
        return Some(Value::Array(neu));
    }
    koordinaten
        .as_array()?
        .iter()
        .map(|kind| positionen_abbilden(kind, tiefe - 1, f))
        .collect::<Option<Vec<_>>>()
        .map(Value::Array)
}
