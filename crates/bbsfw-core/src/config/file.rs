//! JSON persistence of configuration records

use std::fs;
use std::path::Path;

use super::{CodecError, Configuration};

impl Configuration {
    /// Load a configuration from a JSON file
    ///
    /// The result is not validated; call [`Configuration::validate`] before
    /// writing it to a controller.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, CodecError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), CodecError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
