use super::{BusConfig, ConfigError, RelayConfig};
use std::path::PathBuf;
use std::str::FromStr;

impl RelayConfig {
    /// Apply `RELAY_*` environment variables on top of file/default values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary lookup (env in production, maps in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        apply_bus_overrides(&mut self.backend, "RELAY_BACKEND", &lookup)?;
        apply_bus_overrides(&mut self.device, "RELAY_DEVICE", &lookup)?;

        if let Some(v) = parsed::<i32, _>("RELAY_TIMEZONE_OFFSET_HOURS", &lookup)? {
            self.display.timezone_offset_hours = v;
        }
        if let Some(v) = parsed::<usize, _>("RELAY_MAX_NAME_LENGTH", &lookup)? {
            self.display.max_name_length = v;
        }
        if let Some(v) = lookup("RELAY_MAPPING_FILE") {
            self.mapping_file = if v.is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }

        Ok(())
    }
}

fn apply_bus_overrides<F>(bus: &mut BusConfig, prefix: &str, lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(&format!("{}_HOST", prefix)) {
        bus.host = v;
    }
    if let Some(v) = parsed::<u16, _>(&format!("{}_PORT", prefix), lookup)? {
        bus.port = v;
    }
    if let Some(v) = lookup(&format!("{}_USERNAME", prefix)) {
        bus.username = Some(v).filter(|s| !s.is_empty());
    }
    if let Some(v) = lookup(&format!("{}_PASSWORD", prefix)) {
        bus.password = Some(v).filter(|s| !s.is_empty());
    }
    if let Some(v) = parsed::<bool, _>(&format!("{}_TLS", prefix), lookup)? {
        bus.tls = v;
    }
    Ok(())
}

fn parsed<T, F>(var: &str, lookup: &F) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidOverride {
                var: var.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = RelayConfig::default();
        config
            .apply_overrides(lookup_from(&[
                ("RELAY_BACKEND_HOST", "nemo.example.edu"),
                ("RELAY_BACKEND_PORT", "8883"),
                ("RELAY_BACKEND_TLS", "true"),
                ("RELAY_DEVICE_USERNAME", "esp32"),
                ("RELAY_TIMEZONE_OFFSET_HOURS", "-7"),
                ("RELAY_MAX_NAME_LENGTH", "10"),
                ("RELAY_MAPPING_FILE", "tools.toml"),
            ]))
            .unwrap();

        assert_eq!(config.backend.host, "nemo.example.edu");
        assert_eq!(config.backend.port, 8883);
        assert!(config.backend.tls);
        assert_eq!(config.device.username.as_deref(), Some("esp32"));
        assert_eq!(config.display.timezone_offset_hours, -7);
        assert_eq!(config.display.max_name_length, 10);
        assert_eq!(config.mapping_file, Some(PathBuf::from("tools.toml")));
    }

    #[test]
    fn test_no_overrides_keeps_values() {
        let mut config = RelayConfig::default();
        config.apply_overrides(lookup_from(&[])).unwrap();
        assert_eq!(config.backend.host, "localhost");
        assert_eq!(config.device.port, 1883);
        assert!(config.mapping_file.is_none());
    }

    #[test]
    fn test_unparsable_override_is_fatal() {
        let mut config = RelayConfig::default();
        let err = config
            .apply_overrides(lookup_from(&[("RELAY_DEVICE_PORT", "not-a-port")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidOverride {
                var: "RELAY_DEVICE_PORT".to_string(),
                value: "not-a-port".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_credentials_clear_values() {
        let mut config = RelayConfig::default();
        config.backend.username = Some("old".to_string());
        config
            .apply_overrides(lookup_from(&[("RELAY_BACKEND_USERNAME", "")]))
            .unwrap();
        assert!(config.backend.username.is_none());
    }
}
