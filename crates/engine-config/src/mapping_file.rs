use crate::error::ConfigError;
use model::mapping::Mapping;
use std::collections::HashMap;
use std::path::Path;

/// Loads and validates every `*.json` file under `mappings_dir` (§6's
/// `config/mappings/*.json`). Unknown fields are ignored by `serde_json`
/// default behavior; missing required fields surface as a `ConfigError`
/// before any task starts, matching §6's "configuration error at load time".
pub fn load_mappings(mappings_dir: &Path) -> Result<Vec<Mapping>, ConfigError> {
    let entries = std::fs::read_dir(mappings_dir).map_err(|source| ConfigError::ReadMappingFile {
        path: mappings_dir.display().to_string(),
        source,
    })?;

    let mut mappings = Vec::new();
    let mut seen_ids: HashMap<String, ()> = HashMap::new();

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();

    for path in paths {
        let mapping = load_one(&path)?;
        if seen_ids.insert(mapping.id.clone(), ()).is_some() {
            return Err(ConfigError::DuplicateMappingId(mapping.id));
        }
        mappings.push(mapping);
    }

    if mappings.is_empty() {
        return Err(ConfigError::NoMappingsFound(mappings_dir.display().to_string()));
    }

    Ok(mappings)
}

fn load_one(path: &Path) -> Result<Mapping, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::ReadMappingFile {
        path: path.display().to_string(),
        source,
    })?;
    let mapping: Mapping =
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::ParseMappingFile {
            path: path.display().to_string(),
            source,
        })?;
    mapping.validate()?;
    Ok(mapping)
}

/// Narrows a full mapping set down to the ids requested via `--mapping`,
/// preserving the order they were loaded in. An unknown id is a config error.
pub fn select(mappings: Vec<Mapping>, only: &[String]) -> Result<Vec<Mapping>, ConfigError> {
    if only.is_empty() {
        return Ok(mappings);
    }
    only.iter()
        .map(|id| {
            mappings
                .iter()
                .find(|m| &m.id == id)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownMapping {
                    mapping_id: id.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_mapping(dir: &Path, file: &str, id: &str) {
        let body = format!(
            r#"{{
                "id": "{id}",
                "source": {{"kind": "log_file", "path": "/var/log/app.log", "max_memory_mb": 16}},
                "schema_slug": "slug",
                "table": "events"
            }}"#
        );
        std::fs::write(dir.join(file), body).unwrap();
    }

    #[test]
    fn rejects_duplicate_ids() {
        let dir = tempdir().unwrap();
        write_mapping(dir.path(), "a.json", "same-id");
        write_mapping(dir.path(), "b.json", "same-id");
        let err = load_mappings(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateMappingId(_)));
    }

    #[test]
    fn errors_when_directory_is_empty() {
        let dir = tempdir().unwrap();
        let err = load_mappings(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NoMappingsFound(_)));
    }

    #[test]
    fn select_rejects_unknown_mapping_id() {
        let dir = tempdir().unwrap();
        write_mapping(dir.path(), "a.json", "a");
        let mappings = load_mappings(dir.path()).unwrap();
        let err = select(mappings, &["not-there".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMapping { .. }));
    }
}
