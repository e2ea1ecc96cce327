//! Feature service record types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One feature as returned by the feature service.
///
/// Nothing about the shape is guaranteed upstream, so decoding never fails:
/// `attributes` or `geometry` that are missing, null or not objects decode
/// as empty maps and the normalizer decides what to do with them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct RawFeature {
    pub attributes: Map<String, Value>,
    pub geometry: Map<String, Value>,
}

impl From<Value> for RawFeature {
    fn from(value: Value) -> Self {
        let Value::Object(mut feature) = value else {
            return Self::default();
        };

        Self {
            attributes: take_object(&mut feature, "attributes"),
            geometry: take_object(&mut feature, "geometry"),
        }
    }
}

fn take_object(feature: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match feature.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}
