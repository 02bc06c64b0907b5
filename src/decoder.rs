use crate::types::StructuredEvent;

/// Decodes one raw control-channel message into a [`StructuredEvent`].
///
/// Never fails and never drops input: a well-formed payload with an
/// unrecognized `type` comes back as `Unknown`. Anything else (invalid
/// JSON, a missing `type` tag, or a recognized kind whose payload does not
/// deserialize) comes back as `Malformed` carrying the raw text and the
/// parse error. Callers dispatch events strictly in arrival order.
pub fn decode(raw: &str) -> StructuredEvent {
    let err = match serde_json::from_str::<StructuredEvent>(raw) {
        Ok(event) => return event,
        Err(err) => err,
    };

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        if let Some(kind) = value.get("type").and_then(|t| t.as_str()) {
            if !StructuredEvent::KNOWN_KINDS.contains(&kind) {
                return StructuredEvent::Unknown {
                    kind: kind.to_string(),
                    payload: value,
                };
            }
        }
    }

    StructuredEvent::Malformed {
        raw: raw.to_string(),
        error: err.to_string(),
    }
}
