use crate::errors::ConfigError;
use std::collections::HashMap;
use std::str::FromStr;

/// Source of environment values. Tests pass a `HashMap`.
pub trait EnvLookup {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}

/// Collects every missing required key and every unparsable value so one
/// error names all of them.
pub struct EnvReader<'a> {
    lookup: &'a dyn EnvLookup,
    backend: &'static str,
    missing: Vec<String>,
    invalid: Vec<(String, String)>,
}

impl<'a> EnvReader<'a> {
    pub fn new(lookup: &'a dyn EnvLookup, backend: &'static str) -> Self {
        Self {
            lookup,
            backend,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    pub fn required(&mut self, key: &str) -> String {
        match self.lookup.get(key) {
            Some(v) => v,
            None => {
                self.missing.push(key.to_string());
                String::new()
            }
        }
    }

    pub fn optional(&self, key: &str) -> Option<String> {
        self.lookup.get(key)
    }

    pub fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parses an optional value. A bad value is recorded for `finish` and the
    /// default is returned so later keys are still checked.
    pub fn parsed<T>(&mut self, key: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.optional(key) else {
            return default;
        };
        match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(e) => {
                self.reject(key, format!("'{}': {}", raw, e));
                default
            }
        }
    }

    /// Records a value that was present but unusable.
    pub fn reject(&mut self, key: &str, reason: impl Into<String>) {
        self.invalid.push((key.to_string(), reason.into()));
    }

    pub fn finish(mut self) -> Result<(), ConfigError> {
        match (self.missing.is_empty(), self.invalid.len()) {
            (true, 0) => Ok(()),
            (true, 1) => {
                let (key, reason) = self.invalid.remove(0);
                Err(ConfigError::invalid(key, reason))
            }
            _ => Err(ConfigError::MissingEnv {
                backend: self.backend,
                keys: self.missing,
                invalid: self
                    .invalid
                    .into_iter()
                    .map(|(k, reason)| format!("{}={}", k, reason))
                    .collect(),
            }),
        }
    }
}
