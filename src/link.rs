//! Entry Links
//!
//! Liest den `seconds` Parameter aus dem Entry Link und baut den
//! Hand-off Link, der am Ende des geführten Flows geöffnet wird.

use url::Url;

/// Query-Parameter mit der expliziten Gesprächsdauer in Sekunden
pub const SECONDS_PARAM: &str = "seconds";

/// Liest eine explizite Dauer aus dem Entry Link
///
/// Nur eine positive Ganzzahl aus ASCII-Ziffern gilt als gültig. Alles
/// andere (fehlend, leer, negativ, `0`, Überlauf) wird als "nicht vorhanden"
/// behandelt und ist kein Fehler.
pub fn explicit_seconds(entry: &Url) -> Option<u32> {
    entry
        .query_pairs()
        .find(|(key, _)| key == SECONDS_PARAM)
        .and_then(|(_, value)| parse_positive_seconds(&value))
}

/// Parst einen Sekundenwert als positive Ganzzahl
///
/// Leerzeichen zählen als ungültig; `+5` kommt nach dem Query-Decoding als
/// ` 5` an.
pub fn parse_positive_seconds(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u32>().ok().filter(|seconds| *seconds > 0)
}

/// Baut den Hand-off Link `<origin>/?seconds=<seconds>`
///
/// Pfad, Query und Fragment des Origins werden verworfen, der Link trägt
/// keinen weiteren Session-State.
pub fn handoff_link(origin: &Url, seconds: u32) -> Url {
    let mut link = page_origin(origin);
    link.set_query(Some(&format!("{}={}", SECONDS_PARAM, seconds)));
    link
}

/// Origin der Seite als Url (`scheme://host[:port]/`)
pub fn page_origin(entry: &Url) -> Url {
    let mut origin = entry.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    let _ = origin.set_username("");
    let _ = origin.set_password(None);
    origin
}

/// Site-Identifier für die Remote-Konfiguration (der anfragende Host)
pub fn site_id(entry: &Url) -> String {
    match (entry.host_str(), entry.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
