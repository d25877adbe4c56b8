use crate::types::Template;
use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Storage abstraction for named templates
pub trait TemplateStore {
    fn list(&self) -> Result<Vec<String>>;
    fn load(&self, name: &str) -> Result<Option<Template>>;
    /// Save a template. Refuses to replace an existing one unless
    /// `overwrite` is set; replacing a mapping silently is how a week of
    /// runs ends up stamped with the wrong column.
    fn save(&self, template: &Template, overwrite: bool) -> Result<()>;
    fn delete(&self, name: &str) -> Result<bool>;
}

/// Sanitize a template name into a filesystem-safe stem.
/// Keeps alphanumerics, spaces, dashes and underscores, lowercased.
fn sanitize_name(name: &str) -> String {
    let stem: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect::<String>()
        .trim()
        .to_lowercase();
    if stem.is_empty() {
        "default".to_string()
    } else {
        stem
    }
}

/// File-based template store: one JSON file per template.
pub struct FileTemplateStore {
    dir: PathBuf,
}

impl FileTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn template_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_name(name)))
    }
}

impl TemplateStore for FileTemplateStore {
    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json_str = fs::read_to_string(&path)?;
            match serde_json::from_str::<Template>(&json_str) {
                Ok(template) => names.push(template.name),
                // A corrupt file is skipped, not fatal for listing.
                Err(_) => continue,
            }
        }
        names.sort();
        Ok(names)
    }

    fn load(&self, name: &str) -> Result<Option<Template>> {
        let path = self.template_path(name);
        if !Path::new(&path).exists() {
            return Ok(None);
        }
        let json_str = fs::read_to_string(&path)?;
        let template: Template = serde_json::from_str(&json_str)
            .map_err(|e| anyhow!("Failed to deserialize template '{}': {}", name, e))?;
        Ok(Some(template))
    }

    fn save(&self, template: &Template, overwrite: bool) -> Result<()> {
        let path = self.template_path(&template.name);
        if !overwrite && path.exists() {
            return Err(anyhow!(
                "template '{}' already exists (pass overwrite to replace it)",
                template.name
            ));
        }
        let json_str = serde_json::to_string_pretty(template)
            .map_err(|e| anyhow!("Failed to serialize template '{}': {}", template.name, e))?;
        fs::write(path, json_str)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let path = self.template_path(name);
        if path.exists() {
            fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
