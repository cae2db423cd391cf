//! # Workspace Discovery
//!
//! Finds the recipes a run should process. Every file matching one of the
//! configured glob patterns (relative to the search root, `**/PKGBUILD` by
//! default) becomes a [`PackageTask`]. The artifact and build directories
//! are excluded, along with anything inside a `.git` directory, so output
//! from a previous run is never picked up as a recipe.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};

use crate::error::Result;
use crate::nvchecker::NVCHECKER_CONFIG_FILE;

/// One recipe to drive through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageTask {
    /// Name of the recipe directory. The real name comes from the metadata.
    pub name_hint: String,
    pub recipe_path: PathBuf,
    /// `.nvchecker.toml` next to the recipe, when there is one.
    pub nvchecker_config: Option<PathBuf>,
}

impl PackageTask {
    /// Task for the recipe at `recipe_path`, picking up a sibling
    /// `.nvchecker.toml` if present.
    pub fn from_recipe(recipe_path: PathBuf) -> Self {
        let dir = recipe_path.parent().unwrap_or_else(|| Path::new("."));
        let name_hint = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| recipe_path.display().to_string());
        let nvchecker = dir.join(NVCHECKER_CONFIG_FILE);
        Self {
            name_hint,
            nvchecker_config: nvchecker.is_file().then_some(nvchecker),
            recipe_path,
        }
    }

    /// Directory holding the recipe.
    pub fn recipe_dir(&self) -> &Path {
        self.recipe_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn in_git_dir(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == ".git"))
}

/// Find every recipe under `search_root` matching `patterns`.
///
/// Results are deduplicated and sorted by path. Paths under any of
/// `excluded` are dropped.
pub fn discover(search_root: &Path, patterns: &[String], excluded: &[PathBuf]) -> Result<Vec<PackageTask>> {
    let root = glob::Pattern::escape(&search_root.to_string_lossy());
    let mut found: BTreeSet<PathBuf> = BTreeSet::new();

    for pattern in patterns {
        let full = format!("{}/{}", root.trim_end_matches('/'), pattern.trim_start_matches('/'));
        debug!("Searching {}", full);
        for entry in glob::glob(&full)? {
            match entry {
                Ok(path) if path.is_file() => {
                    found.insert(path);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable path: {}", e),
            }
        }
    }

    let tasks: Vec<PackageTask> = found
        .into_iter()
        .filter(|p| !in_git_dir(p))
        .filter(|p| {
            let skip = excluded.iter().any(|ex| p.starts_with(ex));
            if skip {
                debug!("Ignoring {} inside an output directory", p.display());
            }
            !skip
        })
        .map(PackageTask::from_recipe)
        .collect();

    info!(
        "Found {} recipe(s) under {}",
        tasks.len(),
        search_root.display()
    );
    Ok(tasks)
}
