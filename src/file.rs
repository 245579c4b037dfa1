//! The file registry.
//!
//! Every path mentioned by a script is interned into a [`FileNode`] exactly
//! once, keyed by its normalized absolute form; the registry guarantees
//! handle identity per canonical path. Nodes are never destroyed, and their
//! flags only change during script evaluation.
//!
//! Flag semantics:
//! * `target` -- produced by a recipe;
//! * `phony` -- no real file, always considered out-of-date;
//! * `goal` -- phony entry shown to the user by `--list`;
//! * `meta` -- phony aggregator whose staleness is inherited from its
//!   dependencies;
//! * `hidden` -- execution is not displayed;
//! * `sticky` -- final artifact that must remain after build.

use std::collections::HashMap;

use crate::env::EnvId;
use crate::path::Fpath;
use crate::recipe::RecipeId;

/// Stable handle to a file node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) usize);

pub struct FileNode {
    /// Normalized absolute path; registry key.
    pub path: Fpath,
    /// The node's own variable layer, parented by the environment the file
    /// was first referenced under.
    pub env: EnvId,
    pub recipe: Option<RecipeId>,
    pub is_target: bool,
    pub is_phony: bool,
    pub is_meta: bool,
    pub is_hidden: bool,
    pub is_goal: bool,
    pub is_sticky: bool,
}

impl FileNode {
    pub fn new(path: Fpath, env: EnvId) -> Self {
        FileNode {
            path,
            env,
            recipe: None,
            is_target: false,
            is_phony: false,
            is_meta: false,
            is_hidden: false,
            is_goal: false,
            is_sticky: false,
        }
    }

    pub fn set_phony(&mut self) {
        self.is_phony = true;
    }

    /// Meta files are phony aggregators.
    pub fn set_meta(&mut self) {
        self.is_meta = true;
        self.is_phony = true;
    }

    /// Goals are phony entries visible in goal listings.
    pub fn set_goal(&mut self) {
        self.is_goal = true;
        self.is_phony = true;
    }

    pub fn set_hidden(&mut self) {
        self.is_hidden = true;
    }

    pub fn set_sticky(&mut self) {
        self.is_sticky = true;
    }
}

#[derive(Default)]
pub struct Files {
    slots: Vec<FileNode>,
    by_path: HashMap<String, FileId>,
    aliases: HashMap<String, FileId>,
}

impl Files {
    pub fn new() -> Self {
        Files::default()
    }

    /// Look up a node by canonical path.
    pub fn lookup(&self, path: &Fpath) -> Option<FileId> {
        self.by_path.get(path.as_str()).copied()
    }

    /// Intern a fresh node. The caller must have checked [`Files::lookup`]
    /// first; the path is expected to be normalized and absolute.
    pub fn insert(&mut self, node: FileNode) -> FileId {
        let id = FileId(self.slots.len());
        self.by_path.insert(node.path.as_str().to_string(), id);
        self.slots.push(node);
        id
    }

    /// Register an additional name for an existing node. Aliases are
    /// lookup-only: they never change the node's display name.
    pub fn add_alias(&mut self, name: impl Into<String>, id: FileId) {
        self.aliases.insert(name.into(), id);
    }

    /// Exact-name lookup consulting both canonical paths and aliases.
    pub fn find_exact(&self, name: &str) -> Option<FileId> {
        self.by_path
            .get(name)
            .or_else(|| self.aliases.get(name))
            .copied()
    }

    pub fn get(&self, id: FileId) -> &FileNode {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: FileId) -> &mut FileNode {
        &mut self.slots[id.0]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &FileNode)> {
        self.slots.iter().enumerate().map(|(i, n)| (FileId(i), n))
    }
}
