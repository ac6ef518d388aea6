//! Loading the blueprint config, the manifest and exported remote state

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use blueprint::{BlueprintConfig, RemoteRecord, ResourceDeclaration};

use crate::cli::InputArgs;

/// A manifest is either a bare list or `{"resources": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    List(Vec<ResourceDeclaration>),
    Wrapped { resources: Vec<ResourceDeclaration> },
}

/// Load a TOML blueprint config, or defaults when no path is given
pub fn load_config(path: Option<&Path>) -> Result<BlueprintConfig> {
    let Some(path) = path else {
        return Ok(BlueprintConfig::default());
    };
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
}

/// Load resource declarations from a JSON manifest
pub fn load_manifest(path: &Path) -> Result<Vec<ResourceDeclaration>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let manifest: ManifestFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid manifest in {}", path.display()))?;
    Ok(match manifest {
        ManifestFile::List(resources) | ManifestFile::Wrapped { resources } => resources,
    })
}

/// Load exported remote records; a missing path means an empty account
pub fn load_state(path: Option<&Path>) -> Result<Vec<RemoteRecord>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid state in {}", path.display()))
}

/// Resolve the effective config: file values, then command-line overrides
pub fn resolve(args: &InputArgs) -> Result<BlueprintConfig> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(account) = &args.account {
        config.account.clone_from(account);
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if !args.sync.is_empty() {
        config.sync_resources = Some(args.sync.clone());
    }
    if config.account.trim().is_empty() {
        bail!("No account configured; pass --account or set `account` in the config file");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint::{AccountEdition, BlueprintScope, ResourceType};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn args(config: Option<PathBuf>) -> InputArgs {
        InputArgs {
            manifest: PathBuf::from("unused.json"),
            state: None,
            config,
            account: None,
            threads: None,
            sync: Vec::new(),
        }
    }

    #[test]
    fn test_load_config_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "blueprint.toml",
            r#"
account = "ABC123"
scope = "database"
database = "analytics"
threads = 4
sync_resources = ["role", "grant"]
grant_fetch = "bulk"
edition = "standard"
"#,
        );
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.account, "ABC123");
        assert_eq!(config.scope, BlueprintScope::Database);
        assert_eq!(config.threads, 4);
        assert_eq!(
            config.sync_resources,
            Some(vec![ResourceType::Role, ResourceType::Grant])
        );
        assert!(config.use_secondary_roles);
        assert_eq!(config.edition, AccountEdition::Standard);
    }

    #[test]
    fn test_missing_config_is_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.threads, 8);
        assert!(config.account.is_empty());
    }

    #[test]
    fn test_load_manifest_both_shapes() {
        let dir = TempDir::new().unwrap();
        let list = write(
            &dir,
            "list.json",
            r#"[{"type": "role", "name": "analyst"}]"#,
        );
        let wrapped = write(
            &dir,
            "wrapped.json",
            r#"{"resources": [
                {"type": "warehouse", "name": "wh", "properties": {"warehouse_size": "XSMALL"}},
                {"type": "grant", "name": "", "properties": {"priv": "usage"},
                 "references": {"on": {"type": "warehouse", "name": "wh"}, "to": "urn::ABC123:role/ANALYST"}}
            ]}"#,
        );
        assert_eq!(load_manifest(&list).unwrap().len(), 1);
        let resources = load_manifest(&wrapped).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[1].references.len(), 2);
    }

    #[test]
    fn test_load_state() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "state.json",
            r#"[{"urn": "urn::ABC123:role/ANALYST", "properties": {"owner": "USERADMIN"}}]"#,
        );
        let records = load_state(Some(&path)).unwrap();
        assert_eq!(records[0].urn.name(), "ANALYST");
        assert!(load_state(None).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_manifest_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.json", "{not json");
        let err = load_manifest(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad.json"));
    }

    #[test]
    fn test_overrides_win() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "c.toml", "account = \"FILE\"\nthreads = 2\n");
        let mut input = args(Some(path));
        input.account = Some("FLAG".into());
        input.sync = vec![ResourceType::Role];
        let config = resolve(&input).unwrap();
        assert_eq!(config.account, "FLAG");
        assert_eq!(config.threads, 2);
        assert_eq!(config.sync_resources, Some(vec![ResourceType::Role]));
    }

    #[test]
    fn test_account_is_required() {
        assert!(resolve(&args(None)).is_err());
    }
}
