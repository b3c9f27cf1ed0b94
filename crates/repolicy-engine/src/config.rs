//! Policy catalog configuration (`repolicy.toml`).

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use repolicy_workspace::{get_field, remove_field, set_field, values_equal};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Plugin;
use crate::error::PolicyError;
use crate::plugins;

/// Top-level policy configuration from repolicy.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Conventions registered as todo policies
    #[serde(default)]
    pub todo: Vec<String>,

    /// Managed, unwanted and default files
    #[serde(default)]
    pub files: FilesConfig,

    /// Package manifest policies
    #[serde(default)]
    pub package: PackageConfig,

    /// Other JSON files, one policy per entry
    #[serde(default)]
    pub json: Vec<JsonFileConfig>,

    /// Directory relative paths in this config resolve against
    #[serde(skip)]
    pub config_dir: PathBuf,
}

/// File policies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Every file under this directory is kept in sync with the repository
    pub template_dir: Option<PathBuf>,

    /// Paths that must not exist
    #[serde(default)]
    pub unwanted: Vec<String>,

    /// Files created only when missing
    #[serde(default)]
    pub default: Vec<DefaultFile>,
}

/// A file seeded once and then left to the repository's owners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultFile {
    pub path: String,
    #[serde(default)]
    pub contents: String,
}

/// package.json policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Manifest path inside the repository
    #[serde(default = "default_package_file")]
    pub file: String,

    /// Fall back to the repository directory name when "name" is missing
    #[serde(default)]
    pub name_from_directory: bool,

    /// Version used when "version" is missing
    pub default_version: Option<String>,

    /// Fields pinned to a value; dotted keys address nested fields
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,

    /// Fields derived from the package name; `{name}` expands to the name
    /// without its scope
    #[serde(default)]
    pub name_fields: BTreeMap<String, String>,

    /// Fields that must not exist
    #[serde(default)]
    pub remove_fields: Vec<String>,

    /// devDependencies pinned to a version
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,

    /// devDependencies that must not exist
    #[serde(default)]
    pub remove_dev_dependencies: Vec<String>,

    /// Scripts pinned to a command
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,

    /// Scripts that must not exist
    #[serde(default)]
    pub remove_scripts: Vec<String>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            file: default_package_file(),
            name_from_directory: false,
            default_version: None,
            fields: BTreeMap::new(),
            name_fields: BTreeMap::new(),
            remove_fields: Vec::new(),
            dev_dependencies: BTreeMap::new(),
            remove_dev_dependencies: Vec::new(),
            scripts: BTreeMap::new(),
            remove_scripts: Vec::new(),
        }
    }
}

/// Edits to one JSON file, enforced together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFileConfig {
    /// Policy name (defaults to `JSON file "<file>"`)
    pub name: Option<String>,

    /// File path inside the repository
    pub file: String,

    /// Fields pinned to a value; dotted keys address nested fields
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,

    /// Arrays that must contain these items; missing items are appended
    #[serde(default)]
    pub append: BTreeMap<String, Vec<Value>>,

    /// Fields that must not exist
    #[serde(default)]
    pub remove_fields: Vec<String>,
}

impl JsonFileConfig {
    fn plugin(&self) -> Plugin {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("JSON file \"{}\"", self.file));
        let fields = split_keys(&self.fields);
        let append = split_keys(&self.append);
        let remove: Vec<Vec<String>> = self.remove_fields.iter().map(|k| split_key(k)).collect();

        plugins::json_document(name, self.file.clone(), move |doc| {
            for (field, value) in &fields {
                set_field(doc, field, value.clone());
            }
            for (field, items) in &append {
                let mut array = match get_field(doc, field) {
                    Some(Value::Array(existing)) => existing.clone(),
                    _ => Vec::new(),
                };
                for item in items {
                    if !array.iter().any(|present| values_equal(present, item)) {
                        array.push(item.clone());
                    }
                }
                set_field(doc, field, Value::Array(array));
            }
            for field in &remove {
                remove_field(doc, field);
            }
        })
    }
}

fn split_key(key: &str) -> Vec<String> {
    key.split('.').map(str::to_string).collect()
}

fn split_keys<V: Clone>(map: &BTreeMap<String, V>) -> Vec<(Vec<String>, V)> {
    map.iter()
        .map(|(key, value)| (split_key(key), value.clone()))
        .collect()
}

fn default_package_file() -> String {
    "package.json".to_string()
}

impl PolicyConfig {
    /// Load policy config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let content = std::fs::read_to_string(path).map_err(|err| PolicyError::Config {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::parse(path, &content)
    }

    /// Try to load config, returning default if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self, PolicyError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(path, &content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no policy config, using defaults");
                Ok(Self {
                    config_dir: parent_dir(path),
                    ..Self::default()
                })
            }
            Err(err) => Err(PolicyError::Config {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }),
        }
    }

    fn parse(path: &Path, content: &str) -> Result<Self, PolicyError> {
        let mut config: Self = toml::from_str(content).map_err(|err| PolicyError::Config {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        config.config_dir = parent_dir(path);
        Ok(config)
    }

    /// Expand the catalog into plugins for the repository at `repo_dir`.
    ///
    /// Order: managed files, unwanted files, default files, package name,
    /// package version, package fields, name-derived fields, removed fields,
    /// dev dependencies, scripts, other JSON files, todos.
    pub fn plugins(&self, repo_dir: &Path) -> Result<Vec<Plugin>, PolicyError> {
        let mut expanded = Vec::new();

        if let Some(template_dir) = &self.files.template_dir {
            expanded.push(plugins::managed_files(self.config_dir.join(template_dir))?);
        }
        if !self.files.unwanted.is_empty() {
            expanded.push(plugins::unwanted_files(self.files.unwanted.clone()));
        }
        for file in &self.files.default {
            expanded.push(plugins::default_file(file.path.clone(), file.contents.clone()));
        }

        expanded.extend(self.package.plugins(repo_dir));
        expanded.extend(self.json.iter().map(JsonFileConfig::plugin));

        if !self.todo.is_empty() {
            expanded.push(plugins::todo_policies(self.todo.clone()));
        }
        Ok(expanded)
    }
}

impl PackageConfig {
    fn plugins(&self, repo_dir: &Path) -> Vec<Plugin> {
        let mut expanded = Vec::new();
        let file = &self.file;

        if self.name_from_directory {
            let dir_name = repo_dir
                .canonicalize()
                .unwrap_or_else(|_| repo_dir.to_path_buf())
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            expanded.push(plugins::json_field(
                "Package has a name",
                file.clone(),
                ["name"],
                move |current, _| Some(keep_or(current, &dir_name)),
            ));
        }

        if let Some(version) = self.default_version.clone() {
            expanded.push(plugins::json_field(
                "Package has a version",
                file.clone(),
                ["version"],
                move |current, _| Some(keep_or(current, &version)),
            ));
        }

        for (key, value) in &self.fields {
            let value = value.clone();
            expanded.push(plugins::json_field(
                format!("Package field \"{key}\""),
                file.clone(),
                key.split('.'),
                move |_, _| Some(value.clone()),
            ));
        }

        for (key, template) in &self.name_fields {
            let template = template.clone();
            expanded.push(plugins::json_field(
                format!("Package field \"{key}\""),
                file.clone(),
                key.split('.'),
                move |_, pkg| {
                    let name = plugins::unscoped_package_name(pkg);
                    Some(Value::String(template.replace("{name}", &name)))
                },
            ));
        }

        for key in &self.remove_fields {
            expanded.push(plugins::json_field(
                format!("Package does not have \"{key}\" field"),
                file.clone(),
                key.split('.'),
                |_, _| None,
            ));
        }

        let dev_dependencies =
            pinned_then_removed(&self.dev_dependencies, &self.remove_dev_dependencies);
        if !dev_dependencies.is_empty() {
            expanded.push(plugins::package_dev_dependencies(file.clone(), dev_dependencies));
        }

        let scripts = pinned_then_removed(&self.scripts, &self.remove_scripts);
        if !scripts.is_empty() {
            expanded.push(plugins::package_scripts(file.clone(), scripts));
        }

        expanded
    }
}

/// Keep a non-empty string value, otherwise use `fallback`.
fn keep_or(current: Option<&Value>, fallback: &str) -> Value {
    match current {
        Some(Value::String(s)) if !s.is_empty() => Value::String(s.clone()),
        _ => Value::String(fallback.to_string()),
    }
}

fn pinned_then_removed(
    pinned: &BTreeMap<String, String>,
    removed: &[String],
) -> Vec<(String, Option<String>)> {
    pinned
        .iter()
        .map(|(name, value)| (name.clone(), Some(value.clone())))
        .chain(removed.iter().map(|name| (name.clone(), None)))
        .collect()
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}
