use std::collections::HashMap;

use engine_config::{BridgePaths, MappingSelector, RunOptions, SecretResolver};
use engine_core::state::JsonStateStore;
use futures::stream::{self, StreamExt};
use model::{mapping::Mapping, outcome::MappingOutcome};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    control_plane::{ControlPlaneClient, ControlPlaneConfig},
    pipeline::Pipeline,
};

/// `mapping_id -> MappingOutcome` for one `sync` invocation (§5's contract:
/// `run(mappings, options) -> RunReport`).
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcomes: HashMap<String, MappingOutcome>,
}

impl RunReport {
    /// `0` iff every scheduled mapping succeeded or was cleanly skipped, `2`
    /// otherwise (§6's exit code table; config/no-mappings errors are
    /// surfaced by the caller before a `Runner` is ever built).
    pub fn exit_code(&self) -> i32 {
        if self.outcomes.values().all(MappingOutcome::is_clean) {
            0
        } else {
            2
        }
    }
}

/// Fans a run out across mappings with bounded concurrency, one [`Pipeline`]
/// per mapping. A failing mapping never affects its siblings — `buffer_unordered`
/// polls every pipeline to completion independently and `Pipeline::run` never
/// propagates an error past its own `MappingOutcome`.
pub struct Runner {
    paths: BridgePaths,
    state_store: JsonStateStore,
    control_plane_config: ControlPlaneConfig,
}

impl Runner {
    pub fn new(paths: BridgePaths, control_plane_config: ControlPlaneConfig) -> Self {
        let state_store = JsonStateStore::new(paths.state_file());
        Self {
            paths,
            state_store,
            control_plane_config,
        }
    }

    pub async fn run(
        &self,
        mappings: &[Mapping],
        options: &RunOptions,
        secrets: &dyn SecretResolver,
        cancel: CancellationToken,
    ) -> RunReport {
        let selected: Vec<&Mapping> = match &options.selector {
            MappingSelector::All => mappings.iter().collect(),
            MappingSelector::Only(ids) => mappings.iter().filter(|m| ids.contains(&m.id)).collect(),
        };

        let run_id = Uuid::new_v4().to_string();
        let scratch_dir = self.paths.scratch_dir();
        let state_store = &self.state_store;
        let control_plane_config = &self.control_plane_config;
        let parallelism = options.parallelism.max(1);

        let outcomes = stream::iter(selected)
            .map(|mapping| {
                let run_id = run_id.clone();
                let scratch_dir = scratch_dir.clone();
                let cancel = cancel.clone();
                let control_plane = ControlPlaneClient::new(control_plane_config.clone());
                async move {
                    let pipeline = Pipeline::new(
                        mapping,
                        run_id,
                        state_store,
                        secrets,
                        control_plane,
                        scratch_dir,
                        options.dry_run,
                        options.force,
                        options.batch_size_override,
                        cancel,
                    );
                    (mapping.id.clone(), pipeline.run().await)
                }
            })
            .buffer_unordered(parallelism)
            .collect::<HashMap<_, _>>()
            .await;

        RunReport { outcomes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::mapping::{Extraction, RelationalDriver, Source, TransferParams};
    use model::outcome::SkipReason;
    use std::time::Duration;
    use tempfile::tempdir;

    fn log_mapping(id: &str, dir: &std::path::Path) -> Mapping {
        let log_path = dir.join(format!("{id}.log"));
        std::fs::write(&log_path, "").unwrap();
        Mapping {
            id: id.to_string(),
            source: Source::LogFile {
                path: log_path.to_string_lossy().into_owned(),
                max_memory_mb: 8,
            },
            schema_slug: "events".into(),
            extraction: Extraction::default(),
            transfer: TransferParams::default(),
        }
    }

    #[tokio::test]
    async fn a_failing_mapping_does_not_affect_siblings() {
        let log_dir = tempdir().unwrap();
        let mut broken = log_mapping("broken", log_dir.path());
        // An unresolvable secret fails fast in `build_source` with
        // `ConfigInvalid`, with no retries and no network activity.
        broken.source = Source::Relational {
            driver: RelationalDriver::Postgres,
            host: "localhost".into(),
            port: 5432,
            db: "app".into(),
            user: "app".into(),
            secret_ref: "definitely-not-set".into(),
        };
        let healthy = log_mapping("healthy", log_dir.path());
        let mappings = vec![broken, healthy];

        let bridge_dir = tempdir().unwrap();
        unsafe { std::env::set_var("BRIDGE_CONFIG_DIR", bridge_dir.path()) };
        let paths = BridgePaths::resolve();
        unsafe { std::env::remove_var("BRIDGE_CONFIG_DIR") };

        let runner = Runner::new(
            paths,
            ControlPlaneConfig {
                base_url: "http://127.0.0.1:1".into(),
                api_key: "unused".into(),
                http_timeout: Duration::from_millis(50),
                upload_timeout: Duration::from_millis(50),
            },
        );
        let options = RunOptions {
            selector: MappingSelector::All,
            dry_run: true,
            force: false,
            parallelism: 2,
            batch_size_override: None,
            http_timeout: Duration::from_millis(50),
            upload_timeout: Duration::from_millis(50),
        };
        let secrets = engine_config::EnvSecretResolver;

        let report = runner
            .run(&mappings, &options, &secrets, CancellationToken::new())
            .await;

        assert!(matches!(report.outcomes["broken"], MappingOutcome::Failed { .. }));
        assert!(matches!(
            report.outcomes["healthy"],
            MappingOutcome::Succeeded { .. } | MappingOutcome::Skipped { reason: SkipReason::LowVolume }
        ));
        assert_eq!(report.exit_code(), 2);
    }
}
