use crate::config::BackendConfig;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;

/// Load, parse and validate configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<BackendConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)?;
    let config: BackendConfig = serde_yaml::from_reader(file)?;

    config.validate()?;
    info!(
        "Loaded {} indexes and {} claims",
        config.indexes.len(),
        config.claims.len()
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let yaml = r#"
storage:
  path: state
indexes:
  - name: vni
    kind: vxlan
    min_id: 10000
claims:
  - name: tenant-a
    spec:
      index: vni
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.indexes[0].min_id, Some(10000));
        assert_eq!(config.claims.len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let yaml = r#"
storage:
  path: state
indexes:
  - name: vlans
    kind: vlan
    max_id: 5000
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(load_config(Path::new("/nonexistent/resource-backend.yaml")).is_err());
    }
}
