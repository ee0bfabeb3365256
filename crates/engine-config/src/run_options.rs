use crate::error::ConfigError;
use std::time::Duration;

/// Which mappings a `sync` invocation targets (§6).
#[derive(Debug, Clone)]
pub enum MappingSelector {
    All,
    Only(Vec<String>),
}

/// Fully resolved run configuration: CLI flags layered over the
/// `BRIDGE_*` environment overrides (§6). CLI flags win when both are set,
/// except `dry_run`, where `BRIDGE_DRY_RUN=true` forces dry-run regardless
/// of the flag (an operator-level safety override).
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub selector: MappingSelector,
    pub dry_run: bool,
    pub force: bool,
    pub parallelism: usize,
    pub batch_size_override: Option<usize>,
    pub http_timeout: Duration,
    pub upload_timeout: Duration,
}

/// Raw CLI flags, before environment overrides are applied.
#[derive(Debug, Clone, Default)]
pub struct CliFlags {
    pub mapping_ids: Vec<String>,
    pub dry_run: bool,
    pub force: bool,
    pub sequential: bool,
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
}

impl RunOptions {
    pub fn resolve(flags: CliFlags, mapping_count: usize) -> Result<Self, ConfigError> {
        let selector = if flags.mapping_ids.is_empty() {
            MappingSelector::All
        } else {
            MappingSelector::Only(flags.mapping_ids)
        };

        let dry_run = flags.dry_run || env_bool("BRIDGE_DRY_RUN")?.unwrap_or(false);

        let parallelism = if flags.sequential {
            1
        } else {
            flags
                .workers
                .unwrap_or_else(|| mapping_count.clamp(1, 8))
        };

        let http_timeout = match std::env::var("BRIDGE_HTTP_TIMEOUT") {
            Ok(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidEnvValue {
                    name: "BRIDGE_HTTP_TIMEOUT".to_string(),
                    value: raw.clone(),
                }
            })?),
            Err(_) => Duration::from_secs(30),
        };

        let upload_timeout = match std::env::var("BRIDGE_UPLOAD_TIMEOUT") {
            Ok(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidEnvValue {
                    name: "BRIDGE_UPLOAD_TIMEOUT".to_string(),
                    value: raw.clone(),
                }
            })?),
            Err(_) => Duration::from_secs(300),
        };

        Ok(Self {
            selector,
            dry_run,
            force: flags.force,
            parallelism: parallelism.max(1),
            batch_size_override: flags.batch_size,
            http_timeout,
            upload_timeout,
        })
    }
}

fn env_bool(name: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Some(true)),
            "false" | "0" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnvValue {
                name: name.to_string(),
                value: raw,
            }),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_flag_forces_parallelism_one() {
        let flags = CliFlags {
            sequential: true,
            ..Default::default()
        };
        let opts = RunOptions::resolve(flags, 5).unwrap();
        assert_eq!(opts.parallelism, 1);
    }

    #[test]
    fn parallelism_defaults_to_mapping_count_capped_at_eight() {
        let opts = RunOptions::resolve(CliFlags::default(), 20).unwrap();
        assert_eq!(opts.parallelism, 8);
    }

    #[test]
    fn bridge_dry_run_env_forces_dry_run() {
        unsafe { std::env::set_var("BRIDGE_DRY_RUN", "true") };
        let opts = RunOptions::resolve(CliFlags::default(), 1).unwrap();
        assert!(opts.dry_run);
        unsafe { std::env::remove_var("BRIDGE_DRY_RUN") };
    }
}
