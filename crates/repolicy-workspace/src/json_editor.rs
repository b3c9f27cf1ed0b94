// json_editor.rs — Read-modify-write editing of JSON files in a staged Repo.
//
// The editor is what makes policies safe to re-run: a transform is applied
// to a working copy and the file is rewritten only when the result differs
// from the original by value. Key order of existing documents is preserved,
// and reordering keys alone never counts as a change.

use serde_json::{Map, Number, Value};

use crate::error::WorkspaceError;
use crate::repo::Repo;

/// Structured editor for JSON files, built on a [`Repo`].
pub struct JsonEditor<'r> {
    repo: &'r mut Repo,
}

impl<'r> JsonEditor<'r> {
    pub fn new(repo: &'r mut Repo) -> Self {
        Self { repo }
    }

    /// Parse the staged file at `path`.
    ///
    /// A missing, empty, or malformed file reads as an empty object so that
    /// policies can bootstrap a config file from nothing.
    pub fn read(&mut self, path: &str) -> Result<Value, WorkspaceError> {
        Ok(parse_document(path, self.repo.read(path)?))
    }

    /// Apply `transform` to the document at `path` and stage the result if
    /// it differs from what was there.
    ///
    /// The transform may mutate the working copy in place (and return
    /// `None`) or return a replacement document.
    pub fn edit<F>(&mut self, path: &str, transform: F) -> Result<Value, WorkspaceError>
    where
        F: FnOnce(&mut Value) -> Option<Value>,
    {
        let original = self.read(path)?;
        let mut working = original.clone();
        let result = transform(&mut working).unwrap_or(working);
        if !values_equal(&result, &original) {
            self.repo.write(path, render_document(&result)?)?;
        }
        Ok(result)
    }

    /// Replace the document at `path`. Staged only if it differs by value.
    pub fn write(&mut self, path: &str, document: Value) -> Result<Value, WorkspaceError> {
        self.edit(path, |_| Some(document))
    }
}

/// Parse raw file contents, falling back to `{}`.
pub fn parse_document(path: &str, contents: Option<&[u8]>) -> Value {
    let Some(bytes) = contents else {
        return Value::Object(Map::new());
    };
    match serde_json::from_slice(bytes) {
        Ok(document) => document,
        Err(err) => {
            tracing::debug!(path, error = %err, "unparseable JSON treated as empty object");
            Value::Object(Map::new())
        }
    }
}

/// Serialize with 2-space indentation and a trailing newline.
pub fn render_document(document: &Value) -> Result<Vec<u8>, WorkspaceError> {
    let mut rendered = serde_json::to_vec_pretty(document)?;
    rendered.push(b'\n');
    Ok(rendered)
}

/// Deep equality by value: key order is ignored and numbers compare
/// numerically, so `1` and `1.0` are the same value.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Look up a nested field. Numeric segments index into arrays.
pub fn get_field<'v, S: AsRef<str>>(document: &'v Value, field: &[S]) -> Option<&'v Value> {
    field
        .iter()
        .try_fold(document, |current, segment| match current {
            Value::Object(map) => map.get(segment.as_ref()),
            Value::Array(items) => array_index(items.len(), segment.as_ref()).map(|i| &items[i]),
            _ => None,
        })
}

/// Set a nested field, creating intermediate objects as needed.
///
/// Intermediates that exist but are not objects (or in-range array slots)
/// are replaced by empty objects. An empty path replaces the whole document.
pub fn set_field<S: AsRef<str>>(document: &mut Value, field: &[S], new_value: Value) {
    let Some((last, parents)) = field.split_last() else {
        *document = new_value;
        return;
    };

    let mut current = document;
    for segment in parents {
        current = child_mut(current, segment.as_ref());
    }

    let index = match &*current {
        Value::Array(items) => array_index(items.len(), last.as_ref()),
        _ => None,
    };
    match (current, index) {
        (Value::Array(items), Some(i)) => items[i] = new_value,
        (current, _) => {
            ensure_object(current).insert(last.as_ref().to_string(), new_value);
        }
    }
}

/// Remove a nested field, returning its old value. Missing paths are a no-op.
pub fn remove_field<S: AsRef<str>>(document: &mut Value, field: &[S]) -> Option<Value> {
    let (last, parents) = field.split_last()?;

    let mut current = document;
    for segment in parents {
        current = match current {
            Value::Object(map) => map.get_mut(segment.as_ref())?,
            Value::Array(items) => {
                let i = array_index(items.len(), segment.as_ref())?;
                &mut items[i]
            }
            _ => return None,
        };
    }

    match current {
        Value::Object(map) => map.shift_remove(last.as_ref()),
        _ => None,
    }
}

fn child_mut<'v>(value: &'v mut Value, segment: &str) -> &'v mut Value {
    let index = match &*value {
        Value::Array(items) => array_index(items.len(), segment),
        _ => None,
    };
    match (value, index) {
        (Value::Array(items), Some(i)) => &mut items[i],
        (value, _) => ensure_object(value)
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new())),
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    let Value::Object(map) = value else {
        unreachable!("value was just replaced with an object");
    };
    map
}

fn array_index(len: usize, segment: &str) -> Option<usize> {
    segment.parse::<usize>().ok().filter(|i| *i < len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_as_empty_object() {
        let dir = tempdir().unwrap();
        let mut repo = Repo::new(dir.path());

        let doc = JsonEditor::new(&mut repo).read("package.json").unwrap();
        assert_eq!(doc, json!({}));
    }

    #[test]
    fn malformed_file_reads_as_empty_object() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("empty.json"), "").unwrap();
        let mut repo = Repo::new(dir.path());
        let mut editor = JsonEditor::new(&mut repo);

        assert_eq!(editor.read("broken.json").unwrap(), json!({}));
        assert_eq!(editor.read("empty.json").unwrap(), json!({}));
    }

    #[test]
    fn edit_with_same_value_does_not_write() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"a":1}"#).unwrap();
        let mut repo = Repo::new(dir.path());

        let result = JsonEditor::new(&mut repo)
            .edit("a.json", |doc| {
                doc["a"] = json!(1);
                None
            })
            .unwrap();

        assert_eq!(result, json!({"a": 1}));
        assert_eq!(repo.version(), 0);
        assert_eq!(repo.read("a.json").unwrap(), Some(&br#"{"a":1}"#[..]));
    }

    #[test]
    fn integer_over_equal_float_does_not_write() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"a":1.0}"#).unwrap();
        let mut repo = Repo::new(dir.path());

        JsonEditor::new(&mut repo)
            .edit("a.json", |doc| {
                doc["a"] = json!(1);
                None
            })
            .unwrap();

        assert_eq!(repo.version(), 0);
        assert_eq!(repo.read("a.json").unwrap(), Some(&br#"{"a":1.0}"#[..]));
    }

    #[test]
    fn values_compare_numbers_numerically() {
        assert!(values_equal(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(values_equal(&json!({"a": 1, "b": 2}), &json!({"b": 2, "a": 1})));
        assert!(!values_equal(&json!(1), &json!(1.5)));
        assert!(!values_equal(&json!(-1), &json!(1)));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": null})));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn edit_with_new_value_writes_once() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"a":1}"#).unwrap();
        let mut repo = Repo::new(dir.path());

        JsonEditor::new(&mut repo)
            .edit("a.json", |doc| {
                doc["a"] = json!(2);
                None
            })
            .unwrap();

        assert_eq!(repo.version(), 1);
        assert_eq!(
            repo.read("a.json").unwrap(),
            Some(&b"{\n  \"a\": 2\n}\n"[..])
        );
    }

    #[test]
    fn edit_is_idempotent_across_runs() {
        let dir = tempdir().unwrap();
        let mut repo = Repo::new(dir.path());
        let set_name = |doc: &mut Value| {
            set_field(doc, &["name"], json!("demo"));
            None
        };

        JsonEditor::new(&mut repo).edit("package.json", set_name).unwrap();
        assert_eq!(repo.version(), 1);
        JsonEditor::new(&mut repo).edit("package.json", set_name).unwrap();
        assert_eq!(repo.version(), 1);
    }

    #[test]
    fn untouched_missing_file_is_not_created() {
        let dir = tempdir().unwrap();
        let mut repo = Repo::new(dir.path());

        JsonEditor::new(&mut repo).edit("x.json", |_| None).unwrap();
        assert_eq!(repo.version(), 0);
        assert!(!repo.exists("x.json").unwrap());
    }

    #[test]
    fn returned_document_replaces_working_copy() {
        let dir = tempdir().unwrap();
        let mut repo = Repo::new(dir.path());

        let result = JsonEditor::new(&mut repo)
            .edit("x.json", |doc| {
                doc["ignored"] = json!(true);
                Some(json!({"replaced": true}))
            })
            .unwrap();

        assert_eq!(result, json!({"replaced": true}));
        let staged = JsonEditor::new(&mut repo).read("x.json").unwrap();
        assert_eq!(staged, json!({"replaced": true}));
    }

    #[test]
    fn write_replaces_document() {
        let dir = tempdir().unwrap();
        let mut repo = Repo::new(dir.path());
        let mut editor = JsonEditor::new(&mut repo);

        editor.write("tsconfig.json", json!({"extends": "./base.json"})).unwrap();
        editor.write("tsconfig.json", json!({"extends": "./base.json"})).unwrap();

        assert_eq!(repo.version(), 1);
    }

    #[test]
    fn key_order_is_preserved_on_rewrite() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("p.json"), r#"{"zeta":1,"alpha":2}"#).unwrap();
        let mut repo = Repo::new(dir.path());

        JsonEditor::new(&mut repo)
            .edit("p.json", |doc| {
                set_field(doc, &["mid"], json!(3));
                None
            })
            .unwrap();

        let text = String::from_utf8(repo.read("p.json").unwrap().unwrap().to_vec()).unwrap();
        assert_eq!(text, "{\n  \"zeta\": 1,\n  \"alpha\": 2,\n  \"mid\": 3\n}\n");
    }

    #[test]
    fn reordering_keys_is_not_a_change() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("p.json"), r#"{"a":1,"b":2}"#).unwrap();
        let mut repo = Repo::new(dir.path());

        JsonEditor::new(&mut repo)
            .write("p.json", json!({"b": 2, "a": 1}))
            .unwrap();
        assert_eq!(repo.version(), 0);
    }

    #[test]
    fn get_field_walks_objects_and_arrays() {
        let doc = json!({"a": {"b": [10, {"c": "deep"}]}});

        assert_eq!(get_field(&doc, &["a", "b", "1", "c"]), Some(&json!("deep")));
        assert_eq!(get_field(&doc, &["a", "b", "5"]), None);
        assert_eq!(get_field(&doc, &["missing"]), None);
        assert_eq!(get_field::<&str>(&doc, &[]), Some(&doc));
    }

    #[test]
    fn set_field_creates_intermediate_objects() {
        let mut doc = json!({"devDependencies": "not an object"});

        set_field(&mut doc, &["scripts", "build"], json!("heft build"));
        set_field(&mut doc, &["devDependencies", "prettier"], json!("2.7.1"));

        assert_eq!(
            doc,
            json!({
                "devDependencies": {"prettier": "2.7.1"},
                "scripts": {"build": "heft build"}
            })
        );
    }

    #[test]
    fn set_field_indexes_existing_array_slots() {
        let mut doc = json!({"types": ["node", "jest"]});

        set_field(&mut doc, &["types", "1"], json!("heft-jest"));
        assert_eq!(doc, json!({"types": ["node", "heft-jest"]}));
    }

    #[test]
    fn remove_field_keeps_sibling_order() {
        let mut doc = json!({"name": "x", "typings": "a.d.ts", "types": "b.d.ts", "main": "c.js"});

        assert_eq!(remove_field(&mut doc, &["typings"]), Some(json!("a.d.ts")));
        assert_eq!(remove_field(&mut doc, &["nope", "deeper"]), None);

        let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["name", "types", "main"]);
    }
}
