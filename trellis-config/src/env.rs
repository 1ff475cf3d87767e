// Environment variable loading

use std::collections::HashMap;
use std::env;

/// Reads variables sharing a prefix, e.g. `TRELLIS_ENV` → `env`.
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load all prefixed variables from the process environment
    pub fn load(&self) -> HashMap<String, String> {
        self.collect(env::vars())
    }

    /// Keep prefixed pairs, stripping the prefix and lowercasing the key
    pub fn collect<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{}_", self.prefix);
        vars.into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&marker)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_lowercase(), value))
            })
            .collect()
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new("TRELLIS")
    }
}
