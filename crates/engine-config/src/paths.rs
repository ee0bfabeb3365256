use std::path::PathBuf;

/// Resolves the `.bridge/` directory layout (§6), honoring `BRIDGE_CONFIG_DIR`
/// as an override of the root. Every other path is derived from the root so
/// callers never hardcode a sub-path.
#[derive(Debug, Clone)]
pub struct BridgePaths {
    root: PathBuf,
}

impl BridgePaths {
    pub fn resolve() -> Self {
        let root = std::env::var("BRIDGE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".bridge"));
        Self { root }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn mappings_dir(&self) -> PathBuf {
        self.root.join("config").join("mappings")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state").join("sync_state.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("logs").join("sync.log")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join("scratch")
    }
}
