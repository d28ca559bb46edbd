use log::warn;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Default starting capacity of a per-PID buffer, in bytes.
pub const DEFAULT_INITIAL_CAPACITY: usize = 64 * 1024;

/// Default amount a per-PID buffer grows by when a payload does not fit.
pub const DEFAULT_GROWTH_INCREMENT: usize = 64 * 1024;

/// Config files probed by [`DemuxConfig::load`], in order.
pub const CONFIG_PATHS: [&str; 2] = ["./tsdemux.toml", "./tsdemux_config.toml"];

/// What a newly registered PID waits for before its payload is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimingPolicy {
    /// Discard payload until a unit start carrying a PTS is seen.
    #[default]
    UntilTimestamp,
    /// Discard payload until any payload unit start is seen.
    UntilUnitStart,
    /// Expose payload from the first packet routed to the PID.
    Disabled,
}

impl FromStr for PrimingPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" | "until_timestamp" | "pts" => Ok(PrimingPolicy::UntilTimestamp),
            "unit_start" | "until_unit_start" | "start" => Ok(PrimingPolicy::UntilUnitStart),
            "disabled" | "off" | "none" => Ok(PrimingPolicy::Disabled),
            other => Err(format!("unknown priming policy '{}'", other)),
        }
    }
}

/// Tunables for the demultiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxConfig {
    /// Starting capacity of each per-PID buffer
    pub initial_capacity: usize,
    /// Minimum growth step when a buffer must be extended
    pub growth_increment: usize,
    /// Stream-start policy applied to every registered PID
    pub priming: PrimingPolicy,
    /// Reject PSI sections whose CRC-32 does not match
    pub verify_crc: bool,
    /// Drop packets flagged with the transport error indicator
    pub drop_transport_errors: bool,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            growth_increment: DEFAULT_GROWTH_INCREMENT,
            priming: PrimingPolicy::default(),
            verify_crc: false,
            drop_transport_errors: true,
        }
    }
}

impl DemuxConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults, then environment variables, then the first config
    /// file found in [`CONFIG_PATHS`].
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env();

        for path in &CONFIG_PATHS {
            if let Ok(content) = fs::read_to_string(path) {
                config.apply_pairs(&content);
                break;
            }
        }

        config
    }

    /// Loads defaults overlaid with the given `key = value` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_str_pairs(&content))
    }

    /// Parses a `key = value` body on top of the defaults.
    ///
    /// Unknown keys and unparsable values are logged and ignored.
    pub fn from_str_pairs(content: &str) -> Self {
        let mut config = Self::default();
        config.apply_pairs(content);
        config
    }

    fn apply_env(&mut self) {
        for (key, var) in [
            ("initial_capacity", "TSDEMUX_INITIAL_CAPACITY"),
            ("growth_increment", "TSDEMUX_GROWTH_INCREMENT"),
            ("priming", "TSDEMUX_PRIMING"),
            ("verify_crc", "TSDEMUX_VERIFY_CRC"),
            ("drop_transport_errors", "TSDEMUX_DROP_TRANSPORT_ERRORS"),
        ] {
            if let Ok(value) = env::var(var) {
                self.set(key, &value);
            }
        }
    }

    fn apply_pairs(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                self.set(key.trim(), value);
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        let applied = match key {
            "initial_capacity" => value.parse().map(|v| self.initial_capacity = v).is_ok(),
            "growth_increment" => value
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .map(|v| self.growth_increment = v)
                .is_some(),
            "priming" => value.parse().map(|v| self.priming = v).is_ok(),
            "verify_crc" => parse_bool(value).map(|v| self.verify_crc = v).is_some(),
            "drop_transport_errors" => parse_bool(value)
                .map(|v| self.drop_transport_errors = v)
                .is_some(),
            _ => {
                warn!("ignoring unknown config key '{}'", key);
                return;
            }
        };
        if !applied {
            warn!("ignoring invalid value '{}' for config key '{}'", value, key);
        }
    }

    /// Sets the starting capacity of per-PID buffers.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the growth step of per-PID buffers. Zero is raised to one.
    pub fn with_growth_increment(mut self, increment: usize) -> Self {
        self.growth_increment = increment.max(1);
        self
    }

    /// Sets the priming policy.
    pub fn with_priming(mut self, priming: PrimingPolicy) -> Self {
        self.priming = priming;
        self
    }

    /// Enables or disables PSI CRC-32 verification.
    pub fn with_crc_verification(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    /// Enables or disables dropping of packets with the transport error flag.
    pub fn with_drop_transport_errors(mut self, drop: bool) -> Self {
        self.drop_transport_errors = drop;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = DemuxConfig::new();
        assert_eq!(config.initial_capacity, DEFAULT_INITIAL_CAPACITY);
        assert_eq!(config.growth_increment, DEFAULT_GROWTH_INCREMENT);
        assert_eq!(config.priming, PrimingPolicy::UntilTimestamp);
        assert!(!config.verify_crc);
        assert!(config.drop_transport_errors);
    }

    #[test]
    fn test_parse_pairs() {
        let body = r#"
# demux settings
initial_capacity = 1024
growth_increment = "512"
priming = unit_start
verify_crc = yes
bogus = 1
"#;
        let config = DemuxConfig::from_str_pairs(body);
        assert_eq!(config.initial_capacity, 1024);
        assert_eq!(config.growth_increment, 512);
        assert_eq!(config.priming, PrimingPolicy::UntilUnitStart);
        assert!(config.verify_crc);
        assert!(config.drop_transport_errors);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = DemuxConfig::from_str_pairs("growth_increment = 0\npriming = sometimes");
        assert_eq!(config.growth_increment, DEFAULT_GROWTH_INCREMENT);
        assert_eq!(config.priming, PrimingPolicy::UntilTimestamp);
    }

    #[test]
    fn test_builder() {
        let config = DemuxConfig::new()
            .with_initial_capacity(16)
            .with_growth_increment(0)
            .with_priming(PrimingPolicy::Disabled);
        assert_eq!(config.initial_capacity, 16);
        assert_eq!(config.growth_increment, 1);
        assert_eq!(config.priming, PrimingPolicy::Disabled);
    }
}
