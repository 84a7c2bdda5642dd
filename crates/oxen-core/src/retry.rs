use serde_json::Value;

/// The well-known key a work function's return value carries to request a
/// requeue-with-delay instead of a success completion.
pub const RETRY_SENTINEL_KEY: &str = "_oxen_queue_retry_seconds";

/// Classification of a work function's encoded return value.
#[derive(Debug, Clone)]
pub enum WorkOutcome {
    /// Any return value that does not carry the retry sentinel is a success.
    Success(Value),
    /// `{ _oxen_queue_retry_seconds: S }` with `S >= 0`.
    Retry { delay_seconds: f64 },
}

/// Inspect an encoded return value for the retry sentinel shape. This is a
/// wire contract, not a language contract — it never looks at the body
/// beyond this one well-known key.
pub fn classify(value: Value) -> WorkOutcome {
    if let Value::Object(obj) = &value {
        if let Some(s) = obj.get(RETRY_SENTINEL_KEY) {
            if let Some(n) = s.as_f64() {
                if n >= 0.0 {
                    return WorkOutcome::Retry { delay_seconds: n };
                }
            }
        }
    }
    WorkOutcome::Success(value)
}
