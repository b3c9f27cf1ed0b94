// plugins.rs — Reusable policy families.
//
// Each builder returns a Plugin that registers one policy per item it was
// given (one per template file, one per unwanted path, one per dependency).
// All of them are idempotent: running them against their own output stages
// nothing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use repolicy_workspace::{get_field, remove_field, set_field, JsonEditor, Repo};
use serde_json::Value;

use crate::context::{Plugin, RepolicyContext};
use crate::error::PolicyError;

/// Keep every file under `template_dir` in sync with the repository.
///
/// One `Managed file "<path>"` policy per template file (dotfiles and
/// nested directories included). Each writes the template's bytes and
/// mirrors its executable bit. Templates are discovered now but read when
/// the policy runs.
pub fn managed_files(template_dir: impl AsRef<Path>) -> Result<Plugin, PolicyError> {
    let templates = discover_templates(template_dir.as_ref())?;
    Ok(Box::new(move |ctx: &mut RepolicyContext| {
        for (relative, template) in templates {
            ctx.add_sync_policy(format!("Managed file \"{relative}\""), move |repo| {
                let contents = fs::read(&template).map_err(|source| PolicyError::Template {
                    path: template.clone(),
                    source,
                })?;
                repo.write(&relative, contents)?;
                repo.set_executable_flag(&relative, template_is_executable(&template)?)?;
                Ok(())
            });
        }
    }))
}

/// Ensure none of `paths` exist.
pub fn unwanted_files<I, S>(paths: I) -> Plugin
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
    Box::new(move |ctx: &mut RepolicyContext| {
        for path in paths {
            ctx.add_sync_policy(format!("Unwanted file \"{path}\""), move |repo| {
                repo.delete(&path)?;
                Ok(())
            });
        }
    })
}

/// Create `path` with `contents` only if it does not exist yet.
pub fn default_file(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Plugin {
    let path = path.into();
    let contents = contents.into();
    Box::new(move |ctx: &mut RepolicyContext| {
        ctx.add_sync_policy(format!("Default file \"{path}\""), move |repo| {
            if !repo.exists(&path)? {
                repo.write(&path, &contents)?;
            }
            Ok(())
        });
    })
}

/// Enforce one field of a JSON file.
///
/// `expected` receives the field's current value (if any) and the whole
/// document, and returns the value the field should have; `None` removes it.
pub fn json_field<I, S, F>(
    name: impl Into<String>,
    file: impl Into<String>,
    field: I,
    expected: F,
) -> Plugin
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    F: Fn(Option<&Value>, &Value) -> Option<Value> + Send + Sync + 'static,
{
    let name = name.into();
    let file = file.into();
    let field: Vec<String> = field.into_iter().map(Into::into).collect();
    Box::new(move |ctx: &mut RepolicyContext| {
        ctx.add_sync_policy(name, move |repo| update_json_field(repo, &file, &field, &expected));
    })
}

/// Apply several edits to one JSON file as a single policy.
///
/// `edit` mutates the working document in place; the file is staged only if
/// the result differs by value.
pub fn json_document<F>(name: impl Into<String>, file: impl Into<String>, edit: F) -> Plugin
where
    F: Fn(&mut Value) + Send + Sync + 'static,
{
    let name = name.into();
    let file = file.into();
    Box::new(move |ctx: &mut RepolicyContext| {
        ctx.add_sync_policy(name, move |repo| {
            JsonEditor::new(repo).edit(&file, |doc| {
                edit(doc);
                None
            })?;
            Ok(())
        });
    })
}

/// Package name without its `@scope/` prefix; empty when there is no name.
pub fn unscoped_package_name(package: &Value) -> String {
    package
        .get("name")
        .and_then(Value::as_str)
        .and_then(|name| name.rsplit('/').next())
        .unwrap_or_default()
        .to_string()
}

/// Pin or remove entries of `devDependencies` in a package manifest.
///
/// `Some(version)` registers `DevDependency "<name>" version "<version>"`;
/// `None` registers `Unwanted devDependency "<name>"`.
pub fn package_dev_dependencies<I>(file: impl Into<String>, entries: I) -> Plugin
where
    I: IntoIterator<Item = (String, Option<String>)>,
{
    json_section_entries(file.into(), "devDependencies", entries, |name, value| match value {
        Some(version) => format!("DevDependency \"{name}\" version \"{version}\""),
        None => format!("Unwanted devDependency \"{name}\""),
    })
}

/// Pin or remove entries of `scripts` in a package manifest.
pub fn package_scripts<I>(file: impl Into<String>, entries: I) -> Plugin
where
    I: IntoIterator<Item = (String, Option<String>)>,
{
    json_section_entries(file.into(), "scripts", entries, |name, value| match value {
        Some(_) => format!("Managed package script \"{name}\""),
        None => format!("Unwanted script \"{name}\""),
    })
}

/// Register conventions that have no check yet.
pub fn todo_policies<I, S>(names: I) -> Plugin
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    Box::new(move |ctx: &mut RepolicyContext| {
        for name in names {
            ctx.add_todo(name);
        }
    })
}

/// Set (or remove) `field` in the JSON `file` to what `expected` returns.
pub fn update_json_field<F>(
    repo: &mut Repo,
    file: &str,
    field: &[String],
    expected: &F,
) -> Result<(), PolicyError>
where
    F: Fn(Option<&Value>, &Value) -> Option<Value>,
{
    let mut editor = JsonEditor::new(repo);
    let document = editor.read(file)?;
    let wanted = expected(get_field(&document, field), &document);
    editor.edit(file, |doc| {
        match wanted {
            Some(value) => set_field(doc, field, value),
            None => {
                remove_field(doc, field);
            }
        }
        None
    })?;
    Ok(())
}

fn json_section_entries<I>(
    file: String,
    section: &'static str,
    entries: I,
    policy_name: fn(&str, Option<&str>) -> String,
) -> Plugin
where
    I: IntoIterator<Item = (String, Option<String>)>,
{
    let entries: Vec<(String, Option<String>)> = entries.into_iter().collect();
    Box::new(move |ctx: &mut RepolicyContext| {
        for (key, value) in entries {
            let name = policy_name(&key, value.as_deref());
            let field = vec![section.to_string(), key];
            let value = value.map(Value::String);
            let file = file.clone();
            ctx.add_sync_policy(name, move |repo| {
                let pinned = |_: Option<&Value>, _: &Value| value.clone();
                update_json_field(repo, &file, &field, &pinned)
            });
        }
    })
}

/// Files under `dir`, as (repo-relative path, template path), sorted.
fn discover_templates(dir: &Path) -> Result<Vec<(String, PathBuf)>, PolicyError> {
    if !dir.is_dir() {
        return Err(PolicyError::Template {
            path: dir.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "template directory not found"),
        });
    }
    let pattern = format!("{}/**/*", Pattern::escape(&dir.to_string_lossy()));
    let options = MatchOptions {
        require_literal_leading_dot: false,
        ..MatchOptions::new()
    };
    let paths = glob::glob_with(&pattern, options).map_err(|err| PolicyError::InvalidPattern {
        pattern: pattern.clone(),
        reason: err.to_string(),
    })?;

    let mut templates = Vec::new();
    for path in paths {
        let path = path.map_err(|err| PolicyError::Template {
            path: err.path().to_path_buf(),
            source: err.into_error(),
        })?;
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        templates.push((relative, path));
    }
    templates.sort();
    tracing::debug!(dir = %dir.display(), count = templates.len(), "discovered templates");
    Ok(templates)
}

#[cfg(unix)]
fn template_is_executable(path: &Path) -> Result<bool, PolicyError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|source| PolicyError::Template {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn template_is_executable(_path: &Path) -> Result<bool, PolicyError> {
    Ok(false)
}
