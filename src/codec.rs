use {
    serde::{Deserialize, Deserializer, de::Error},
    serde_json::Value,
};


/// The form older encoders wrote: `{ "value": ... }`.
#[derive(Deserialize)]
struct Structured<V> {
    value: V,
}

/// Decodes a value from either its bare or its structured representation.
///
/// Wrappers always encode the bare value, and the bare form wins whenever the input
/// parses both ways. If neither form fits, the error of the structured attempt is
/// returned.
///
/// Only self-describing formats can be retried, so the structured form is accepted only
/// by human-readable formats. Their input is buffered as a JSON value first, which
/// limits integers to the range of `i64`/`u64` and makes borrowed strings unavailable.
/// Compact formats decode `V` directly.
pub(crate) fn decode<'de, D, V>(deserializer: D) -> Result<V, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    if !deserializer.is_human_readable() {
        return V::deserialize(deserializer);
    }
    let buffered = Value::deserialize(deserializer)?;
    if let Ok(value) = V::deserialize(buffered.clone()) {
        return Ok(value);
    }
    match Structured::<V>::deserialize(buffered) {
        Ok(Structured { value }) => Ok(value),
        Err(e) => Err(D::Error::custom(e)),
    }
}
