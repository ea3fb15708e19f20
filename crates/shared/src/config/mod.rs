// Configuration module
// Reads INI-style configuration files with environment variable overrides.
//
// Sections only exist to keep the files readable: every key of every section
// lands in one flat key space. Sections are merged in name order, so on a
// duplicate key the section whose name sorts last wins, wherever it sits in
// the file.

use std::collections::HashMap;
use std::path::Path;

use configparser::ini::Ini;
use parking_lot::Mutex;

/// Global configuration singleton used by the tools
static CONFIG: once_cell::sync::Lazy<Mutex<Config>> =
    once_cell::sync::Lazy::new(|| Mutex::new(Config::new()));

/// Get a reference to the global config instance
pub fn get_config() -> &'static Mutex<Config> {
    &CONFIG
}

/// Configuration file reader
/// Supports INI-style files with environment variable override
#[derive(Debug, Clone)]
pub struct Config {
    values: HashMap<String, String>,
    filename: String,
    env_prefix: String,
}

impl Config {
    pub fn new() -> Self {
        Config {
            values: HashMap::new(),
            filename: String::new(),
            env_prefix: String::new(),
        }
    }

    /// Build a configuration straight from INI text (no file behind it)
    pub fn from_ini_str(content: &str, env_prefix: &str) -> Result<Self, String> {
        let mut config = Config::new();
        config.env_prefix = env_prefix.to_string();
        config.parse(content)?;
        Ok(config)
    }

    /// Load configuration from a file
    /// env_prefix is used to check environment variables (e.g., "Navgen_")
    pub fn set_source(&mut self, filename: &str, env_prefix: &str) -> bool {
        self.filename = filename.to_string();
        self.env_prefix = env_prefix.to_string();
        self.reload()
    }

    /// Reload the configuration file
    pub fn reload(&mut self) -> bool {
        self.values.clear();

        let content = match std::fs::read_to_string(Path::new(&self.filename)) {
            Ok(c) => c,
            Err(_) => return false,
        };

        match self.parse(&content) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Could not parse configuration file {}: {}", self.filename, e);
                false
            }
        }
    }

    fn parse(&mut self, content: &str) -> Result<(), String> {
        let mut ini = Ini::new_cs();
        let sections = ini.read(content.to_string())?;

        let mut names: Vec<&String> = sections.keys().collect();
        names.sort();
        for name in names {
            for (key, value) in &sections[name] {
                let Some(value) = value else { continue };
                let mut value = value.trim().to_string();

                // Strip quotes
                if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                    value = value[1..value.len() - 1].to_string();
                }

                self.values.insert(key.clone(), value);
            }
        }
        Ok(())
    }

    /// Override a value programmatically
    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Check if a key is set
    pub fn is_set(&self, key: &str) -> bool {
        self.get_env_or_config(key).is_some()
    }

    /// Get a string value with a default
    pub fn get_string_default(&self, key: &str, default: &str) -> String {
        self.get_env_or_config(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Get a string value (empty string default)
    pub fn get_string(&self, key: &str) -> String {
        self.get_string_default(key, "")
    }

    /// Get a boolean value with a default
    pub fn get_bool_default(&self, key: &str, default: bool) -> bool {
        match self.get_env_or_config(key) {
            Some(val) => {
                let lower = val.to_lowercase();
                matches!(lower.as_str(), "1" | "true" | "yes")
            }
            None => default,
        }
    }

    /// Get an integer value with a default
    pub fn get_int_default(&self, key: &str, default: i32) -> i32 {
        match self.get_env_or_config(key) {
            Some(val) => val.parse().unwrap_or(default),
            None => default,
        }
    }

    /// Get a float value with a default
    pub fn get_float_default(&self, key: &str, default: f32) -> f32 {
        match self.get_env_or_config(key) {
            Some(val) => val.parse().unwrap_or(default),
            None => default,
        }
    }

    /// Try environment variable first, then config file
    fn get_env_or_config(&self, key: &str) -> Option<String> {
        // Convert key to env var name: replace '.' with '_', add prefix
        if !self.env_prefix.is_empty() {
            let env_key = format!("{}{}", self.env_prefix, key.replace('.', "_"));
            if let Ok(val) = std::env::var(&env_key) {
                return Some(val);
            }
        }

        self.values.get(key).cloned()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.get_int_default("nonexistent", 42), 42);
        assert_eq!(config.get_string_default("nonexistent", "hello"), "hello");
        assert!(config.get_bool_default("nonexistent", true));
    }

    #[test]
    fn test_sections_are_flattened() {
        let text = "LogLevel = 3\n\n[generation]\nnav_slope_limit = 0.5\nnav_generate_fencetops = false\n\n[tool]\nLogsDir = \"logs\"\n";
        let config = Config::from_ini_str(text, "").unwrap();
        assert_eq!(config.get_int_default("LogLevel", 2), 3);
        assert_eq!(config.get_float_default("nav_slope_limit", 0.7), 0.5);
        assert!(!config.get_bool_default("nav_generate_fencetops", true));
        assert_eq!(config.get_string("LogsDir"), "logs");
    }

    #[test]
    fn test_duplicate_keys_follow_section_names() {
        let text = "[zeta]\nnav_area_max_size = 40\n\n[alpha]\nnav_area_max_size = 10\n";
        let config = Config::from_ini_str(text, "").unwrap();
        assert_eq!(config.get_int_default("nav_area_max_size", 50), 40);
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = Config::from_ini_str("[a]\nnav_area_max_size = lots\n", "").unwrap();
        assert_eq!(config.get_int_default("nav_area_max_size", 50), 50);
    }
}
