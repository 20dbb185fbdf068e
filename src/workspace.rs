// src/workspace.rs

//! Task group -> workspace directory resolution, and workdir containment.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::config::validate::is_valid_name;
use crate::errors::{PreviewError, Result};

/// Seam for finding the on-disk workspace that belongs to a task group.
pub trait WorkspaceResolver: Send + Sync {
    fn resolve(&self, group: &str) -> Result<PathBuf>;
}

/// Resolves `<root>/<group>`.
///
/// Group ids are restricted to `[A-Za-z0-9_-]` so they can never escape
/// `root`.
#[derive(Debug, Clone)]
pub struct DirectoryWorkspaceResolver {
    root: PathBuf,
}

impl DirectoryWorkspaceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl WorkspaceResolver for DirectoryWorkspaceResolver {
    fn resolve(&self, group: &str) -> Result<PathBuf> {
        if !is_valid_name(group) {
            return Err(PreviewError::InvalidGroup {
                group: group.to_string(),
            });
        }

        let path = self.root.join(group);
        if !path.is_dir() {
            return Err(PreviewError::WorkspaceMissing {
                group: group.to_string(),
                path,
            });
        }
        Ok(path)
    }
}

/// Resolves from an explicit group -> directory map.
///
/// Unknown groups report `MissingTask`, the way a record-backed resolver
/// reports a task group that does not exist.
#[derive(Debug, Clone, Default)]
pub struct StaticWorkspaceResolver {
    groups: HashMap<String, PathBuf>,
}

impl StaticWorkspaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.groups.insert(group.into(), dir.into());
        self
    }
}

impl WorkspaceResolver for StaticWorkspaceResolver {
    fn resolve(&self, group: &str) -> Result<PathBuf> {
        if group.trim().is_empty() {
            return Err(PreviewError::InvalidGroup {
                group: group.to_string(),
            });
        }
        let dir = self
            .groups
            .get(group)
            .ok_or_else(|| PreviewError::MissingTask {
                group: group.to_string(),
            })?;
        if !dir.is_dir() {
            return Err(PreviewError::WorkspaceMissing {
                group: group.to_string(),
                path: dir.clone(),
            });
        }
        Ok(dir.clone())
    }
}

/// Resolve an instance `workdir` against the workspace root.
///
/// Rejects absolute paths and anything whose normalized form climbs out of
/// the root, then requires the directory to exist. Symlinks are followed and
/// the target must still live under the (canonical) root.
pub fn resolve_workdir(workspace: &Path, instance: &str, workdir: &str) -> Result<PathBuf> {
    let relative = Path::new(workdir);
    if relative.is_absolute() || relative.has_root() {
        return Err(PreviewError::instance(
            instance,
            format!("workdir '{workdir}' must be relative to the workspace"),
        ));
    }

    let normalized = normalize_relative(relative).ok_or_else(|| {
        PreviewError::instance(
            instance,
            format!("workdir '{workdir}' escapes the workspace"),
        )
    })?;

    let resolved = workspace.join(&normalized);
    if !resolved.is_dir() {
        return Err(PreviewError::instance(
            instance,
            format!("workdir '{workdir}' does not exist"),
        ));
    }

    // Both sides exist at this point, so canonicalize only fails on races.
    let (Ok(root), Ok(target)) = (workspace.canonicalize(), resolved.canonicalize()) else {
        return Err(PreviewError::instance(
            instance,
            format!("workdir '{workdir}' could not be resolved"),
        ));
    };
    if !target.starts_with(&root) {
        return Err(PreviewError::instance(
            instance,
            format!("workdir '{workdir}' resolves outside the workspace"),
        ));
    }

    Ok(resolved)
}

/// Lexically normalize `path`; `None` if a `..` would climb above the start.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.iter().collect())
}
