//! Stable event ids from volatile external identifiers.
//!
//! The feed hands out identifiers such as
//! `smi:webservices.ingv.it/fdsnws/event/1/query?eventId=37482911` whose
//! wrapper changes between feed versions. Entities are keyed by the part
//! that does not change.

/// Query key carrying the stable id.
pub const EVENT_ID_QUERY_KEY: &str = "eventId";

/// Derive the Event Id for an External Identifier.
///
/// 1. A non-empty `eventId` query value wins (key match is ASCII
///    case-insensitive).
/// 2. Otherwise the last `/` segment of the path (query and fragment
///    stripped).
/// 3. If that segment is empty the identifier is returned unchanged.
///
/// Non-empty input always yields non-empty output.
pub fn event_id(external_id: &str) -> &str {
    if let Some(v) = query_value(external_id, EVENT_ID_QUERY_KEY) {
        return v;
    }
    let path = external_id
        .split(['?', '#'])
        .next()
        .unwrap_or(external_id);
    match path.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment,
        _ => external_id,
    }
}

fn query_value<'a>(s: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = s.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.is_empty())
        .map(|(_, v)| v)
}
