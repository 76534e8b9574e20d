//! `PresetCodec`: shared JSON envelope encode/decode used by every engine.
//!
//! A serde_json round trip through a `Preset { name, params }` wrapper,
//! generalized to a common `engine`/`version`/`parameters` shell plus an
//! engine-specific JSON value for `modMatrix`/`macros`/`pattern`/`bodyPreset`.

use crate::error::SonanceError;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Encode a flat parameter map plus an engine-specific extra object into
/// a single preset envelope. `extra` is merged at the top level (so its
/// keys become sibling fields of `parameters`, e.g. `modMatrix`/`macros`).
pub fn encode(
    engine: &str,
    version: &str,
    parameters: impl Iterator<Item = (String, f32)>,
    extra: Map<String, Value>,
) -> String {
    let mut params_obj = Map::new();
    for (id, value) in parameters {
        params_obj.insert(id, Value::from(value));
    }

    let mut root = Map::new();
    root.insert("engine".to_string(), Value::from(engine));
    root.insert("version".to_string(), Value::from(version));
    root.insert("parameters".to_string(), Value::Object(params_obj));
    for (k, v) in extra {
        root.insert(k, v);
    }

    serde_json::to_string_pretty(&Value::Object(root)).unwrap_or_default()
}

/// Parsed preset: the flat parameter map plus whatever non-standard top
/// level fields the engine wrote (modMatrix, macros, pattern, ...).
pub struct DecodedPreset {
    pub parameters: IndexMap<String, f32>,
    pub extra: Map<String, Value>,
}

/// Parse and validate the envelope: malformed JSON or an engine/version
/// mismatch returns an error and performs no partial mutation on the
/// caller's side (atomicity is the caller's responsibility: only adopt the
/// returned `DecodedPreset` after this returns `Ok`).
pub fn decode(json: &str, expected_engine: &str, expected_version: &str) -> Result<DecodedPreset, SonanceError> {
    let mut root: Value =
        serde_json::from_str(json).map_err(|e| SonanceError::MalformedPreset(e.to_string()))?;

    let Value::Object(ref mut root_map) = root else {
        return Err(SonanceError::MalformedPreset(
            "top-level preset value must be a JSON object".to_string(),
        ));
    };

    let engine = root_map
        .get("engine")
        .and_then(Value::as_str)
        .ok_or_else(|| SonanceError::MalformedPreset("missing `engine` field".to_string()))?
        .to_string();
    if engine != expected_engine {
        return Err(SonanceError::EngineMismatch {
            expected: expected_engine.to_string(),
            found: engine,
        });
    }

    let version = root_map
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| SonanceError::MalformedPreset("missing `version` field".to_string()))?
        .to_string();
    if version != expected_version {
        return Err(SonanceError::VersionMismatch {
            engine_version: expected_version.to_string(),
            preset_version: version,
        });
    }

    let parameters_value = root_map
        .remove("parameters")
        .ok_or_else(|| SonanceError::MalformedPreset("missing `parameters` field".to_string()))?;
    let Value::Object(parameters_obj) = parameters_value else {
        return Err(SonanceError::MalformedPreset(
            "`parameters` must be a JSON object".to_string(),
        ));
    };

    let mut parameters = IndexMap::new();
    for (id, value) in parameters_obj {
        if let Some(f) = value.as_f64() {
            parameters.insert(id, f as f32);
        } else if let Some(b) = value.as_bool() {
            parameters.insert(id, if b { 1.0 } else { 0.0 });
        }
        // string-valued parameters are kept only in `extra` by callers that
        // need them; the numeric namespace ignores non-numeric entries.
    }

    root_map.remove("engine");
    root_map.remove("version");

    Ok(DecodedPreset {
        parameters,
        extra: root_map.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_flat_parameter_map() {
        let mut params = IndexMap::new();
        params.insert("osc1Level".to_string(), 0.8f32);
        params.insert("filterCutoff".to_string(), 1200.0f32);

        let json = encode("va", "v1.0", params.clone().into_iter(), Map::new());
        let decoded = decode(&json, "va", "v1.0").unwrap();

        for (id, value) in &params {
            assert_eq!(decoded.parameters.get(id), Some(value));
        }
    }

    #[test]
    fn rejects_engine_mismatch() {
        let json = encode("va", "v1.0", std::iter::empty(), Map::new());
        let err = decode(&json, "fm", "v1.0").unwrap_err();
        assert!(matches!(err, SonanceError::EngineMismatch { .. }));
    }

    #[test]
    fn rejects_version_mismatch() {
        let json = encode("va", "v1.0", std::iter::empty(), Map::new());
        let err = decode(&json, "va", "v2.0").unwrap_err();
        assert!(matches!(err, SonanceError::VersionMismatch { .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = decode("{not json", "va", "v1.0").unwrap_err();
        assert!(matches!(err, SonanceError::MalformedPreset(_)));
    }

    #[test]
    fn preserves_engine_specific_extra_fields() {
        let mut extra = Map::new();
        extra.insert("modMatrix".to_string(), Value::Array(vec![]));
        let json = encode("va", "v1.0", std::iter::empty(), extra);
        let decoded = decode(&json, "va", "v1.0").unwrap();
        assert!(decoded.extra.contains_key("modMatrix"));
    }
}
