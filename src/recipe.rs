//! Recipes bind result files to dependencies and an action.
//!
//! A recipe captures the environment and working directory current at its
//! declaration; the scheduler re-installs both around execution. Each
//! result file points back at its recipe, and a file accepts a recipe
//! exactly once: a second assignment is a script error.
//!
//! `DelayedRecipe` defers action construction to first use so that rules
//! whose shape depends on finalized dependency lists (notably recipes
//! synthesized from generators) see the final state.

use std::rc::Rc;

use crate::action::Action;
use crate::env::EnvId;
use crate::error::{BuildError, Result};
use crate::file::FileId;
use crate::path::Fpath;
use crate::value::Value;
use crate::workspace::Workspace;

/// Stable handle to a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecipeId(pub(crate) usize);

/// Builds an action from the finalized result and dependency lists.
pub type ActionFn = dyn Fn(&Workspace, &[FileId], &[FileId]) -> Action;

pub enum RecipeAction {
    Ready(Action),
    /// Resolved on first execution or signature query, then cached.
    Delayed {
        fun: Rc<ActionFn>,
        cached: Option<Action>,
    },
}

pub struct Recipe {
    pub ress: Vec<FileId>,
    pub deps: Vec<FileId>,
    /// Environment current when the recipe was declared.
    pub env: EnvId,
    /// Working directory installed around execution.
    pub cwd: Fpath,
    pub action: RecipeAction,
}

impl Recipe {
    /// Append a dependency; the list stays de-duplicated.
    pub fn add_dep(&mut self, dep: FileId) {
        if !self.deps.contains(&dep) {
            self.deps.push(dep);
        }
    }
}

#[derive(Default)]
pub struct Recipes {
    slots: Vec<Recipe>,
}

impl Recipes {
    pub fn new() -> Self {
        Recipes::default()
    }

    pub fn insert(&mut self, r: Recipe) -> RecipeId {
        let id = RecipeId(self.slots.len());
        self.slots.push(r);
        id
    }

    pub fn get(&self, id: RecipeId) -> &Recipe {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: RecipeId) -> &mut Recipe {
        &mut self.slots[id.0]
    }
}

/// Anything that names a file in rule declarations: an interned handle, a
/// path string (resolved against the current script's directory), or a
/// path value.
pub trait FileArg {
    fn to_file(self, ws: &mut Workspace) -> FileId;
}

impl FileArg for FileId {
    fn to_file(self, _ws: &mut Workspace) -> FileId {
        self
    }
}

impl FileArg for &str {
    fn to_file(self, ws: &mut Workspace) -> FileId {
        ws.file(self)
    }
}

impl FileArg for String {
    fn to_file(self, ws: &mut Workspace) -> FileId {
        ws.file(self)
    }
}

impl FileArg for &Fpath {
    fn to_file(self, ws: &mut Workspace) -> FileId {
        ws.file(self.clone())
    }
}

impl FileArg for Fpath {
    fn to_file(self, ws: &mut Workspace) -> FileId {
        ws.file(self)
    }
}

/// Empty file list for rules without dependencies.
pub const NO_FILES: [FileId; 0] = [];

impl Workspace {
    pub(crate) fn intern_files<I>(&mut self, items: I) -> Vec<FileId>
    where
        I: IntoIterator,
        I::Item: FileArg,
    {
        items.into_iter().map(|i| i.to_file(self)).collect()
    }

    /// Core recipe constructor: flags results as targets and wires the
    /// back-pointers. Errors when a result already has a recipe.
    pub(crate) fn make_recipe(
        &mut self,
        ress: Vec<FileId>,
        deps: Vec<FileId>,
        action: RecipeAction,
    ) -> Result<RecipeId> {
        if ress.is_empty() {
            return Err(BuildError::script("recipe with an empty result set"));
        }
        for &r in &ress {
            if self.node(r).recipe.is_some() {
                return Err(BuildError::script(format!(
                    "'{}' is already produced by another recipe",
                    self.display(r)
                )));
            }
        }
        let env = self.cur_env();
        let cwd = self
            .file_var(ress[0], "cwd")
            .and_then(|v| v.as_path())
            .unwrap_or_else(|| self.envs.dir(env).clone());
        let rid = self.recipes.insert(Recipe {
            ress: ress.clone(),
            deps,
            env,
            cwd,
            action,
        });
        for &r in &ress {
            let n = self.node_mut(r);
            n.recipe = Some(rid);
            n.is_target = true;
        }
        Ok(rid)
    }

    /// Build a rule with an action; returns the first result file.
    pub fn rule<R, D>(&mut self, ress: R, deps: D, action: Action) -> Result<FileId>
    where
        R: IntoIterator,
        R::Item: FileArg,
        D: IntoIterator,
        D::Item: FileArg,
    {
        let ress = self.intern_files(ress);
        let deps = self.intern_files(deps);
        let rid = self.make_recipe(ress, deps, RecipeAction::Ready(action))?;
        Ok(self.recipes.get(rid).ress[0])
    }

    /// Build a rule whose action is derived from the finalized result and
    /// dependency lists at first use.
    pub fn delayed_rule<R, D>(&mut self, ress: R, deps: D, fun: Rc<ActionFn>) -> Result<FileId>
    where
        R: IntoIterator,
        R::Item: FileArg,
        D: IntoIterator,
        D::Item: FileArg,
    {
        let ress = self.intern_files(ress);
        let deps = self.intern_files(deps);
        let rid = self.make_recipe(ress, deps, RecipeAction::Delayed { fun, cached: None })?;
        Ok(self.recipes.get(rid).ress[0])
    }

    /// Define a rule whose goal does not match a real file; its action runs
    /// on every build.
    pub fn phony<D>(&mut self, name: &str, deps: D, action: Action) -> Result<FileId>
    where
        D: IntoIterator,
        D::Item: FileArg,
    {
        let fid = self.file(name);
        if self.node(fid).recipe.is_some() {
            return Err(BuildError::script(format!(
                "a goal named '{}' already exists",
                name
            )));
        }
        self.node_mut(fid).set_phony();
        let deps = self.intern_files(deps);
        self.make_recipe(vec![fid], deps, RecipeAction::Ready(action))?;
        Ok(fid)
    }

    /// A phony rule grouping other rules, with its execution not displayed.
    pub fn hidden_rule<D>(&mut self, name: &str, deps: D, action: Action) -> Result<FileId>
    where
        D: IntoIterator,
        D::Item: FileArg,
    {
        let fid = self.phony(name, deps, action)?;
        self.node_mut(fid).set_hidden();
        Ok(fid)
    }

    /// A phony aggregator that is up-to-date exactly when all of its
    /// dependencies are.
    pub fn meta<D>(&mut self, name: &str, deps: D, action: Action) -> Result<FileId>
    where
        D: IntoIterator,
        D::Item: FileArg,
    {
        let fid = self.phony(name, deps, action)?;
        self.node_mut(fid).set_meta();
        Ok(fid)
    }

    /// A phony target displayed to the user by `--list`.
    pub fn goal<D>(&mut self, name: &str, deps: D, action: Action) -> Result<FileId>
    where
        D: IntoIterator,
        D::Item: FileArg,
    {
        let fid = self.phony(name, deps, action)?;
        self.node_mut(fid).set_goal();
        Ok(fid)
    }

    /// Append a dependency to the recipe building `fid`.
    pub fn add_dep(&mut self, fid: FileId, dep: impl FileArg) -> Result<()> {
        let dep = dep.to_file(self);
        match self.node(fid).recipe {
            Some(rid) => {
                self.recipes.get_mut(rid).add_dep(dep);
                Ok(())
            }
            None => Err(BuildError::script(format!(
                "'{}' has no recipe to add a dependency to",
                self.display(fid)
            ))),
        }
    }

    /// Ensure a rule exists that creates the given directory.
    pub fn ensure_dir(&mut self, path: impl FileArg) -> Result<FileId> {
        let fid = path.to_file(self);
        if self.node(fid).recipe.is_none() {
            let p = self.node(fid).path.clone();
            self.make_recipe(
                vec![fid],
                Vec::new(),
                RecipeAction::Ready(Action::MakeDir { path: p }),
            )?;
        }
        Ok(fid)
    }

    /// A rule producing a file with fixed content, creating directories as
    /// needed.
    pub fn makefile(&mut self, path: &str, content: impl Into<String>) -> Result<FileId> {
        let fid = self.file(path);
        let p = self.node(fid).path.clone();
        self.rule(
            [fid],
            NO_FILES,
            Action::MakeFile {
                path: p,
                content: content.into(),
            },
        )
    }

    /// A rule building a directory.
    pub fn directory(&mut self, name: &str) -> Result<FileId> {
        let fid = self.file(name);
        let p = self.node(fid).path.clone();
        self.rule([fid], NO_FILES, Action::MakeDir { path: p })
    }

    /// An action removing the given files or directories.
    pub fn remove_action<I>(&mut self, paths: I, ignore_error: bool) -> Action
    where
        I: IntoIterator,
        I::Item: FileArg,
    {
        let files = self.intern_files(paths);
        Action::Remove {
            files,
            ignore_error,
        }
    }

    /// Scan a Makefile-format dependency file produced by an external tool
    /// (`target…: dep…`) and append the dependencies to existing recipes.
    /// Unreadable files are silently ignored.
    pub fn parse_deps(&mut self, path: impl Into<Fpath>) {
        let path = path.into();
        let Ok(text) = std::fs::read_to_string(path.as_std()) else {
            return;
        };
        for line in text.lines() {
            let Some((lhs, rhs)) = line.split_once(':') else {
                continue;
            };
            let targets: Vec<FileId> = lhs.split_whitespace().map(|t| self.file(t)).collect();
            let deps: Vec<FileId> = rhs.split_whitespace().map(|d| self.file(d)).collect();
            for t in targets {
                if let Some(rid) = self.node(t).recipe {
                    for &d in &deps {
                        self.recipes.get_mut(rid).add_dep(d);
                    }
                }
            }
        }
    }

    /// The recipe's action, resolving a delayed form on first use.
    pub(crate) fn recipe_action(&mut self, rid: RecipeId) -> Action {
        let resolved = match &self.recipes.get(rid).action {
            RecipeAction::Ready(a) => return a.clone(),
            RecipeAction::Delayed {
                cached: Some(a), ..
            } => return a.clone(),
            RecipeAction::Delayed { fun, .. } => {
                let fun = fun.clone();
                let r = self.recipes.get(rid);
                let (ress, deps) = (r.ress.clone(), r.deps.clone());
                fun(self, &ress, &deps)
            }
        };
        if let RecipeAction::Delayed { cached, .. } = &mut self.recipes.get_mut(rid).action {
            *cached = Some(resolved.clone());
        }
        resolved
    }

    pub(crate) fn recipe_signature(&mut self, rid: RecipeId) -> String {
        let act = self.recipe_action(rid);
        act.signature(self)
    }

    pub(crate) fn recipe_commands(&mut self, rid: RecipeId) -> Vec<String> {
        let act = self.recipe_action(rid);
        let mut cmds = Vec::new();
        act.commands(self, &mut cmds);
        cmds
    }

    /// Wrap command fragments as a lazily-flattened shell action.
    pub fn command_action(&mut self, args: Vec<Value>) -> Action {
        Action::Invoke { args }
    }
}
