use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Legacy backend id -> display name table.
///
/// Loaded once at startup and never modified. Older backends published
/// numeric tool ids in topics; newer ones publish names and need no table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolMapping {
    names: HashMap<String, String>,
}

#[derive(Deserialize)]
struct MappingFile {
    #[serde(default)]
    tools: HashMap<String, String>,
}

impl ToolMapping {
    pub fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    /// Parse a mapping file:
    ///
    /// ```toml
    /// [tools]
    /// "1" = "woollam"
    /// "2" = "fiji"
    /// ```
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: MappingFile = toml::from_str(contents).context("Failed to parse tool mapping")?;
        let names = file
            .tools
            .into_iter()
            .map(|(id, name)| (id.trim().to_string(), name.trim().to_string()))
            .filter(|(id, name)| !id.is_empty() && !name.is_empty())
            .collect();
        Ok(Self { names })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tool mapping '{}'", path.display()))?;
        let mapping = Self::from_toml(&contents)
            .with_context(|| format!("Invalid tool mapping '{}'", path.display()))?;
        info!(path = %path.display(), tools = mapping.len(), "Loaded tool mapping");
        Ok(mapping)
    }

    pub fn name_for(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_toml() {
        let mapping = ToolMapping::from_toml(
            r#"
            [tools]
            "1" = "woollam"
            "2" = " Fiji "
            "3" = ""
            "#,
        )
        .unwrap();

        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.name_for("1"), Some("woollam"));
        assert_eq!(mapping.name_for("2"), Some("Fiji"));
        assert_eq!(mapping.name_for("3"), None);
    }

    #[test]
    fn test_empty_file_is_empty_mapping() {
        let mapping = ToolMapping::from_toml("").unwrap();
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_invalid_toml_fails() {
        assert!(ToolMapping::from_toml("[tools\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tools]\n\"7\" = \"ald\"").unwrap();

        let mapping = ToolMapping::load(file.path()).unwrap();
        assert_eq!(mapping.name_for("7"), Some("ald"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = ToolMapping::load(Path::new("/nonexistent/tools.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read tool mapping"));
    }
}
