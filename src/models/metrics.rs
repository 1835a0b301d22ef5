use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Series names published on the traffic stats channel.
pub const UPLOAD_RATE: &str = "upload";
pub const DOWNLOAD_RATE: &str = "download";

/// One tick of the stats feed: series name -> value. Carries no timestamp of
/// its own; consumers label it at receipt time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub values: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    /// Every numeric member of a JSON object becomes a series value. Anything
    /// else (strings, nested objects, non-object payloads) is ignored.
    pub fn from_json(value: &Value) -> Self {
        let values = value
            .as_object()
            .map(|object| {
                object
                    .iter()
                    .filter_map(|(name, v)| v.as_f64().map(|n| (name.clone(), n)))
                    .collect()
            })
            .unwrap_or_default();
        Self { values }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}
