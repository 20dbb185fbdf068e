//! Temporary workspace roots with one directory per task group.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use previewd::config::{OrchestratorOptions, TomlConfigLoader};
use previewd::engine::PreviewOrchestrator;
use previewd::install::DependencyInstaller;
use previewd::workspace::DirectoryWorkspaceResolver;
use tempfile::TempDir;

use crate::builders::PreviewConfigBuilder;

pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp workspace root"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn group_dir(&self, group: &str) -> PathBuf {
        self.root().join(group)
    }

    /// Create `<root>/<group>/preview.toml` from `config`.
    pub fn add_group(&self, group: &str, config: &PreviewConfigBuilder) -> PathBuf {
        self.write_config(group, &config.to_toml())
    }

    /// Create the group directory (if needed) and write raw config text.
    pub fn write_config(&self, group: &str, contents: &str) -> PathBuf {
        let dir = self.group_dir(group);
        fs::create_dir_all(&dir).expect("create group dir");
        let path = dir.join("preview.toml");
        fs::write(&path, contents).expect("write preview.toml");
        path
    }

    /// Create `<root>/<group>/<relative>` as a directory.
    pub fn mkdir(&self, group: &str, relative: &str) -> PathBuf {
        let dir = self.group_dir(group).join(relative);
        fs::create_dir_all(&dir).expect("create workspace subdir");
        dir
    }

    /// Orchestrator over this root with the default TOML loader.
    pub fn orchestrator(
        &self,
        options: OrchestratorOptions,
        installer: Arc<dyn DependencyInstaller>,
    ) -> PreviewOrchestrator {
        PreviewOrchestrator::new(
            options,
            Arc::new(DirectoryWorkspaceResolver::new(self.root())),
            Arc::new(TomlConfigLoader::default()),
            installer,
        )
    }
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
