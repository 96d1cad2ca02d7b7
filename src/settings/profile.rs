//! SettingsProfile - what a handler family expects from the resolver

use serde_json::{Map, Value};

/// Domain, defaults and required keys of one handler family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsProfile {
    domain: String,
    defaults: Map<String, Value>,
    required: Vec<String>,
}

impl SettingsProfile {
    pub fn new(domain: impl Into<String>) -> Self { Self { domain: domain.into(), ..Default::default() } }
    pub fn with_default(mut self, key: &str, value: impl Into<Value>) -> Self { self.defaults.insert(key.into(), value.into()); self }
    pub fn require(mut self, key: &str) -> Self {
        if !self.required.iter().any(|k| k == key) { self.required.push(key.into()); }
        self
    }

    pub fn domain(&self) -> &str { &self.domain }
    pub fn defaults(&self) -> &Map<String, Value> { &self.defaults }
    pub fn required(&self) -> &[String] { &self.required }
}
