// repo.rs — Staged in-memory view of a repository directory.
//
// A Repo is an overlay over a directory on disk. Each path is hydrated from
// disk the first time it is touched; after that, every read and write goes to
// the in-memory entry only. Nothing reaches the real directory until flush().
//
// Key design:
// - Entries are keyed by normalized relative path ("a/b.json")
// - A touched path that has no file is stored explicitly as Contents::Absent,
//   distinct from a path that was never touched (no entry at all)
// - `version` bumps once per effective change and never on a no-op write;
//   the policy engine uses it as its only "did anything change" signal
// - flush() re-reads disk at flush time and performs the minimal
//   add/update/delete/chmod set

use std::collections::{btree_map, BTreeMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::WorkspaceError;

/// Staged contents of a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    /// No file at this path (never existed, or staged for deletion).
    Absent,
    /// The file's full contents.
    Present(Vec<u8>),
}

impl Contents {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Contents::Absent => None,
            Contents::Present(bytes) => Some(bytes),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Contents::Present(_))
    }
}

impl From<Option<&[u8]>> for Contents {
    fn from(bytes: Option<&[u8]>) -> Self {
        match bytes {
            Some(bytes) => Contents::Present(bytes.to_vec()),
            None => Contents::Absent,
        }
    }
}

/// The overlay state of one touched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub contents: Contents,
    pub executable: bool,
}

/// A single filesystem operation performed (or planned) by a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushAction {
    /// A new file was created.
    Add,
    /// An existing file was overwritten with different bytes.
    Update,
    /// An existing file was removed.
    Delete,
    /// The executable bits were set.
    ChmodExecutable,
    /// The executable bits were cleared.
    ChmodNonExecutable,
}

impl fmt::Display for FlushAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushAction::Add => write!(f, "add"),
            FlushAction::Update => write!(f, "update"),
            FlushAction::Delete => write!(f, "delete"),
            FlushAction::ChmodExecutable => write!(f, "chmod +x"),
            FlushAction::ChmodNonExecutable => write!(f, "chmod -x"),
        }
    }
}

/// A path and the operation flush performed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushChange {
    pub path: String,
    pub action: FlushAction,
}

/// A staged, change-tracking view of a repository directory.
///
/// Reads hydrate lazily from `base_path`; writes stay in memory until
/// [`Repo::flush`]. Paths are relative to `base_path` and may not escape it.
#[derive(Debug)]
pub struct Repo {
    base_path: PathBuf,
    entries: BTreeMap<String, Entry>,
    version: u64,
}

impl Repo {
    /// Create a staged view of `base_path`. Does not touch the disk.
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            entries: BTreeMap::new(),
            version: 0,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Number of effective changes staged so far in this session.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Paths touched during this session, in lexicographic order.
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The overlay entry for a path, without hydrating it.
    pub fn staged_entry(&self, path: &str) -> Option<&Entry> {
        normalize_path(path)
            .ok()
            .and_then(|key| self.entries.get(&key))
    }

    /// Whether the path currently has contents.
    pub fn exists(&mut self, path: &str) -> Result<bool, WorkspaceError> {
        Ok(self.entry_mut(path)?.contents.is_present())
    }

    /// Current staged contents of a path, or `None` if there is no file.
    pub fn read(&mut self, path: &str) -> Result<Option<&[u8]>, WorkspaceError> {
        Ok(self.entry_mut(path)?.contents.as_bytes())
    }

    /// Stage new contents for a path; `None` marks it absent.
    ///
    /// Returns `true` if the staged state changed. Byte-identical contents
    /// and absent-over-absent are no-ops and leave the version untouched.
    pub fn set_contents(
        &mut self,
        path: &str,
        contents: Option<&[u8]>,
    ) -> Result<bool, WorkspaceError> {
        let entry = self.entry_mut(path)?;
        if entry.contents.as_bytes() == contents {
            return Ok(false);
        }
        entry.contents = Contents::from(contents);
        self.version += 1;
        tracing::debug!(path, version = self.version, "staged contents");
        Ok(true)
    }

    /// Stage `contents` as the file at `path`.
    pub fn write(
        &mut self,
        path: &str,
        contents: impl AsRef<[u8]>,
    ) -> Result<bool, WorkspaceError> {
        self.set_contents(path, Some(contents.as_ref()))
    }

    /// Stage the removal of `path`.
    pub fn delete(&mut self, path: &str) -> Result<bool, WorkspaceError> {
        self.set_contents(path, None)
    }

    /// Staged executable flag for a path.
    pub fn is_executable(&mut self, path: &str) -> Result<bool, WorkspaceError> {
        Ok(self.entry_mut(path)?.executable)
    }

    /// Stage the executable flag for a path. Returns `true` if it changed.
    pub fn set_executable_flag(
        &mut self,
        path: &str,
        executable: bool,
    ) -> Result<bool, WorkspaceError> {
        let entry = self.entry_mut(path)?;
        if entry.executable == executable {
            return Ok(false);
        }
        entry.executable = executable;
        self.version += 1;
        tracing::debug!(path, executable, version = self.version, "staged executable flag");
        Ok(true)
    }

    /// Compute what [`Repo::flush`] would do right now, without writing.
    pub fn pending_changes(&self) -> Result<Vec<FlushChange>, WorkspaceError> {
        let mut changes = Vec::new();
        for (path, entry) in &self.entries {
            let disk = read_disk(&self.base_path.join(path))?;
            changes.extend(
                plan_entry(entry, disk.as_ref())
                    .into_iter()
                    .map(|action| FlushChange {
                        path: path.clone(),
                        action,
                    }),
            );
        }
        Ok(changes)
    }

    /// Commit the overlay to disk.
    ///
    /// Every touched path is diffed against the file as it exists now (not
    /// the hydration snapshot). Stops at the first I/O error; files already
    /// written stay written.
    pub fn flush(&self) -> Result<Vec<FlushChange>, WorkspaceError> {
        let mut applied = Vec::new();
        for (path, entry) in &self.entries {
            let full_path = self.base_path.join(path);
            let disk = read_disk(&full_path)?;
            for action in plan_entry(entry, disk.as_ref()) {
                apply_action(&full_path, entry, action)?;
                tracing::info!(path = %path, action = %action, "flushed change");
                applied.push(FlushChange {
                    path: path.clone(),
                    action,
                });
            }
        }
        Ok(applied)
    }

    /// Look up the entry for a path, hydrating it from disk on first touch.
    fn entry_mut(&mut self, path: &str) -> Result<&mut Entry, WorkspaceError> {
        let key = normalize_path(path)?;
        match self.entries.entry(key) {
            btree_map::Entry::Occupied(occupied) => Ok(occupied.into_mut()),
            btree_map::Entry::Vacant(vacant) => {
                let full_path = self.base_path.join(vacant.key());
                let entry = match read_disk(&full_path)? {
                    Some(disk) => Entry {
                        contents: Contents::Present(disk.contents),
                        executable: disk.executable,
                    },
                    None => Entry {
                        contents: Contents::Absent,
                        executable: false,
                    },
                };
                tracing::debug!(
                    path = %vacant.key(),
                    present = entry.contents.is_present(),
                    "hydrated entry"
                );
                Ok(vacant.insert(entry))
            }
        }
    }
}

/// A file as it currently exists on disk.
struct DiskFile {
    contents: Vec<u8>,
    executable: bool,
}

/// Normalize a relative path into an overlay key.
/// Rejects absolute paths and `..` components.
fn normalize_path(path: &str) -> Result<String, WorkspaceError> {
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(WorkspaceError::PathTraversal {
                    path: path.to_string(),
                });
            }
        }
    }
    if parts.is_empty() {
        return Err(WorkspaceError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(parts.join("/"))
}

fn read_disk(full_path: &Path) -> Result<Option<DiskFile>, WorkspaceError> {
    let contents = match fs::read(full_path) {
        Ok(contents) => contents,
        // An ancestor that is a regular file means the path cannot exist.
        Err(source)
            if matches!(
                source.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) =>
        {
            return Ok(None)
        }
        Err(source) => {
            return Err(WorkspaceError::IoError {
                path: full_path.to_path_buf(),
                source,
            })
        }
    };
    let executable = is_executable_on_disk(full_path)?;
    Ok(Some(DiskFile {
        contents,
        executable,
    }))
}

/// Decide which operations bring `disk` in line with `entry`.
fn plan_entry(entry: &Entry, disk: Option<&DiskFile>) -> Vec<FlushAction> {
    let mut actions = Vec::new();
    let Contents::Present(staged) = &entry.contents else {
        if disk.is_some() {
            actions.push(FlushAction::Delete);
        }
        return actions;
    };

    let executable_on_disk = match disk {
        Some(disk) => {
            if &disk.contents != staged {
                actions.push(FlushAction::Update);
            }
            disk.executable
        }
        None => {
            actions.push(FlushAction::Add);
            false
        }
    };

    if cfg!(unix) && executable_on_disk != entry.executable {
        actions.push(if entry.executable {
            FlushAction::ChmodExecutable
        } else {
            FlushAction::ChmodNonExecutable
        });
    }
    actions
}

fn apply_action(
    full_path: &Path,
    entry: &Entry,
    action: FlushAction,
) -> Result<(), WorkspaceError> {
    let io_error = |source| WorkspaceError::IoError {
        path: full_path.to_path_buf(),
        source,
    };
    match action {
        FlushAction::Add | FlushAction::Update => {
            let contents = entry.contents.as_bytes().unwrap_or_default();
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).map_err(|source| WorkspaceError::IoError {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            fs::write(full_path, contents).map_err(io_error)
        }
        FlushAction::Delete => fs::remove_file(full_path).map_err(io_error),
        FlushAction::ChmodExecutable => set_executable_on_disk(full_path, true),
        FlushAction::ChmodNonExecutable => set_executable_on_disk(full_path, false),
    }
}

#[cfg(unix)]
fn is_executable_on_disk(full_path: &Path) -> Result<bool, WorkspaceError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(full_path).map_err(|source| WorkspaceError::IoError {
        path: full_path.to_path_buf(),
        source,
    })?;
    Ok(metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable_on_disk(_full_path: &Path) -> Result<bool, WorkspaceError> {
    Ok(false)
}

#[cfg(unix)]
fn set_executable_on_disk(full_path: &Path, executable: bool) -> Result<(), WorkspaceError> {
    use std::os::unix::fs::PermissionsExt;

    let io_error = |source| WorkspaceError::IoError {
        path: full_path.to_path_buf(),
        source,
    };
    let mut permissions = fs::metadata(full_path).map_err(io_error)?.permissions();
    let mode = permissions.mode();
    permissions.set_mode(if executable {
        mode | 0o111
    } else {
        mode & !0o111
    });
    fs::set_permissions(full_path, permissions).map_err(io_error)
}

#[cfg(not(unix))]
fn set_executable_on_disk(_full_path: &Path, _executable: bool) -> Result<(), WorkspaceError> {
    Ok(())
}
