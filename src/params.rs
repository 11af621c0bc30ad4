use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SimError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(pub BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `key=value` items. A value that is valid JSON is kept as JSON,
    /// anything else is a plain string.
    pub fn from_pairs<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        let mut out = BTreeMap::new();
        for item in items {
            let raw = item.as_ref();
            let Some((key, value)) = raw.split_once('=') else {
                return Err(SimError::config(format!("expected key=value, got `{raw}`")));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(SimError::config(format!("empty key in `{raw}`")));
            }
            let value = value.trim();
            let parsed = serde_json::from_str::<Value>(value)
                .unwrap_or_else(|_| Value::String(value.to_string()));
            out.insert(key.to_string(), parsed);
        }
        Ok(Self(out))
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn expect_only(&self, component: &str, allowed: &[&str]) -> Result<()> {
        if let Some(key) = self.0.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(SimError::config(format!(
                "unknown parameter `{key}` for {component} (allowed: {})",
                allowed.join(", ")
            )));
        }
        Ok(())
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.0.get(key) {
            None => Ok(default),
            Some(v) => as_f64(v).ok_or_else(|| invalid(key, v, "a number")),
        }
    }

    pub fn u32_or(&self, key: &str, default: u32) -> Result<u32> {
        match self.0.get(key) {
            None => Ok(default),
            Some(v) => as_f64(v)
                .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64)
                .map(|n| n as u32)
                .ok_or_else(|| invalid(key, v, "a non-negative integer")),
        }
    }

    pub fn opt_u32(&self, key: &str) -> Result<Option<u32>> {
        if self.contains(key) {
            self.u32_or(key, 0).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn str_or(&self, key: &str, default: &str) -> Result<String> {
        match self.0.get(key) {
            None => Ok(default.to_string()),
            Some(v) => scalar_text(v).ok_or_else(|| invalid(key, v, "a string")),
        }
    }

    pub fn opt_str(&self, key: &str) -> Result<Option<String>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) => scalar_text(v)
                .map(Some)
                .ok_or_else(|| invalid(key, v, "a string")),
        }
    }

    pub fn f64_list(&self, key: &str) -> Result<Option<Vec<f64>>> {
        let Some(v) = self.0.get(key) else {
            return Ok(None);
        };
        let items = match v {
            Value::Array(items) => items
                .iter()
                .map(|item| as_f64(item).ok_or_else(|| invalid(key, v, "a list of numbers")))
                .collect::<Result<Vec<_>>>()?,
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<f64>().map_err(|_| invalid(key, v, "a list of numbers")))
                .collect::<Result<Vec<_>>>()?,
            Value::Number(_) => vec![as_f64(v).unwrap_or_default()],
            _ => return Err(invalid(key, v, "a list of numbers")),
        };
        Ok(Some(items))
    }

    pub fn f64_map(&self, key: &str) -> Result<BTreeMap<String, f64>> {
        let Some(v) = self.0.get(key) else {
            return Ok(BTreeMap::new());
        };
        match v {
            Value::Object(map) => map
                .iter()
                .map(|(k, item)| {
                    as_f64(item)
                        .map(|n| (k.clone(), n))
                        .ok_or_else(|| invalid(key, v, "a map of numbers"))
                })
                .collect(),
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|pair| -> Result<(String, f64)> {
                    let (k, n) = pair
                        .split_once(':')
                        .ok_or_else(|| invalid(key, v, "entries shaped name:number"))?;
                    let n = n
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| invalid(key, v, "entries shaped name:number"))?;
                    Ok((k.trim().to_string(), n))
                })
                .collect(),
            _ => Err(invalid(key, v, "a map of numbers")),
        }
    }

    pub fn nested(&self, key: &str) -> Result<Option<Params>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(Params(
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ))),
            Some(v) => Err(invalid(key, v, "an object")),
        }
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn invalid(key: &str, value: &Value, expected: &str) -> SimError {
    SimError::config(format!("parameter `{key}` must be {expected}, got {value}"))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
