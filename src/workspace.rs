//! The engine context.
//!
//! One `Workspace` owns every process-wide structure of the build model:
//! the file registry, the extension database, the environment chain, the
//! signature store, and the post-initialization queue. The script front-end
//! (plain Rust code in this crate's model) registers everything against it,
//! and the driver threads it through traversal and the builder.
//!
//! Environment layout: an OS leaf, a `builtin` level holding predefined
//! variables and command-line assignments, a `config` level persisted in
//! `config.toml`, and the `main` script level. Sub-scripts push additional
//! levels; every file node carries its own innermost layer on top of the
//! environment it was declared under.

use crate::config::ConfigState;
use crate::defaults::StdLists;
use crate::env::{EnvId, Envs};
use crate::error::{BuildError, Result};
use crate::ext::ExtDb;
use crate::file::{FileId, FileNode, Files};
use crate::output::Context;
use crate::path::Fpath;
use crate::recipe::Recipes;
use crate::sign::SignStore;
use crate::value::Value;

/// Delayed initializer run once after all scripts have loaded and before
/// the first traversal.
pub type PostInit = Box<dyn FnOnce(&mut Workspace, &mut Context) -> Result<()>>;

pub struct Workspace {
    /// Directory of the top-level script; anchor for build-root redirection
    /// and relative display.
    pub topdir: Fpath,
    pub(crate) envs: Envs,
    pub(crate) files: Files,
    pub(crate) recipes: Recipes,
    pub(crate) exts: ExtDb,
    pub(crate) signs: SignStore,
    pub(crate) config: ConfigState,
    /// Lists feeding the default goals (`all`, `clean`, `distclean`).
    pub lists: StdLists,
    pub os_env: EnvId,
    pub builtin_env: EnvId,
    pub config_env: EnvId,
    pub top_env: EnvId,
    cur: EnvId,
    env_stack: Vec<EnvId>,
    post_inits: Vec<PostInit>,
}

impl Workspace {
    /// Engine rooted at the process working directory.
    pub fn new() -> anyhow::Result<Workspace> {
        let cwd = std::env::current_dir()?;
        Ok(Workspace::with_topdir(cwd))
    }

    /// Engine rooted at an explicit top directory.
    pub fn with_topdir(top: impl Into<Fpath>) -> Workspace {
        let topdir: Fpath = top.into();
        let topdir = topdir.norm();
        let (mut envs, os_env) = Envs::new(&topdir);
        let builtin_env = envs.push_level("builtin", topdir.clone(), os_env);
        let config_env = envs.push_level("config", topdir.clone(), builtin_env);
        let top_env = envs.push_level("main", topdir.clone(), config_env);
        Workspace {
            topdir,
            envs,
            files: Files::new(),
            recipes: Recipes::new(),
            exts: ExtDb::new(),
            signs: SignStore::new(),
            config: ConfigState::default(),
            lists: StdLists::default(),
            os_env,
            builtin_env,
            config_env,
            top_env,
            cur: top_env,
            env_stack: Vec::new(),
            post_inits: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Workspace {
        Workspace::with_topdir("/t")
    }

    // ------------------------------------------------------------- environ

    pub fn cur_env(&self) -> EnvId {
        self.cur
    }

    /// Directory of the currently evaluated script.
    pub fn cur_dir(&self) -> &Fpath {
        self.envs.dir(self.cur)
    }

    /// Install an environment (and its directory) as current.
    pub fn push_env(&mut self, env: EnvId) {
        self.env_stack.push(self.cur);
        self.cur = env;
        let _ = std::env::set_current_dir(self.envs.dir(env).as_std());
    }

    pub fn pop_env(&mut self) {
        if let Some(prev) = self.env_stack.pop() {
            self.cur = prev;
            let _ = std::env::set_current_dir(self.envs.dir(prev).as_std());
        }
    }

    /// Variable lookup through the current chain.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.envs.get(self.cur, key)
    }

    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| default.into())
    }

    pub fn set(&mut self, key: &str, val: impl Into<Value>) {
        self.envs.set(self.cur, key, val);
    }

    pub fn append(&mut self, key: &str, val: impl Into<Value>) {
        self.envs.append(self.cur, key, val);
    }

    pub fn is_def(&self, key: &str) -> bool {
        self.envs.is_def(self.cur, key)
    }

    pub fn get_here(&self, key: &str) -> Option<Value> {
        self.envs.get_here(self.cur, key)
    }

    pub(crate) fn env_get(&self, env: EnvId, key: &str) -> Option<Value> {
        self.envs.get(env, key)
    }

    pub(crate) fn env_set(&mut self, env: EnvId, key: &str, val: impl Into<Value>) {
        self.envs.set(env, key, val);
    }

    // --------------------------------------------------------------- files

    /// Intern a file node. Relative paths resolve against the current
    /// script's directory, not the process working directory.
    pub fn file(&mut self, path: impl Into<Fpath>) -> FileId {
        let p: Fpath = path.into();
        let abs = if p.is_absolute() {
            p.norm()
        } else {
            self.envs.dir(self.cur).join(p.as_std()).norm()
        };
        if let Some(id) = self.files.lookup(&abs) {
            return id;
        }
        let name = abs.basename();
        let fenv = self
            .envs
            .push_level(name, self.envs.dir(self.cur).clone(), self.cur);
        self.files.insert(FileNode::new(abs, fenv))
    }

    pub fn node(&self, id: FileId) -> &FileNode {
        self.files.get(id)
    }

    pub fn node_mut(&mut self, id: FileId) -> &mut FileNode {
        self.files.get_mut(id)
    }

    /// Exact-name lookup over canonical paths and aliases.
    pub fn find_exact(&self, name: &str) -> Option<FileId> {
        self.files.find_exact(name)
    }

    /// Register an additional lookup name for a node.
    pub fn add_alias(&mut self, name: &str, id: FileId) {
        self.files.add_alias(name, id);
    }

    /// Resolve a goal named on the command line. Unlike [`Workspace::file`],
    /// the goal must already exist.
    pub fn goal_file(&mut self, name: &str) -> Result<FileId> {
        if let Some(id) = self.files.find_exact(name) {
            return Ok(id);
        }
        let p = Fpath::new(name);
        let abs = if p.is_absolute() {
            p.norm()
        } else {
            self.envs.dir(self.cur).join(p.as_std()).norm()
        };
        self.files
            .lookup(&abs)
            .ok_or_else(|| BuildError::script(format!("goal {} does not exist", name)))
    }

    /// The on-disk location of a file: targets are redirected under the
    /// `BPATH` build root when it is set, keeping their structure relative
    /// to the top directory.
    pub fn actual(&self, id: FileId) -> Fpath {
        let n = self.node(id);
        if !n.is_target {
            return n.path.clone();
        }
        let Some(bpath) = self.envs.get(n.env, "BPATH").filter(|v| !v.is_empty()) else {
            return n.path.clone();
        };
        let root = self.topdir.join(bpath.to_string()).norm();
        match n.path.relative_to(&self.topdir) {
            Some(rel) => root.join(rel.as_std()),
            None => n.path.clone(),
        }
    }

    /// Display form: relative to the working directory or the top directory
    /// when the file lives under one of them, absolute otherwise.
    pub fn display(&self, id: FileId) -> String {
        let path = self.actual(id);
        if let Ok(cwd) = std::env::current_dir() {
            if let Some(rel) = path.relative_to(&Fpath::from(cwd)) {
                return rel.to_string();
            }
        }
        if let Some(rel) = path.relative_to(&self.topdir) {
            return rel.to_string();
        }
        path.to_string()
    }

    /// Read a variable through a file's own chain: the file's layer first,
    /// then the environment it was declared under.
    pub fn file_var(&self, id: FileId, key: &str) -> Option<Value> {
        self.envs.get(self.node(id).env, key)
    }

    /// Read a variable defined on the file node itself.
    pub fn file_var_here(&self, id: FileId, key: &str) -> Option<Value> {
        self.envs.get_here(self.node(id).env, key)
    }

    /// Attach a variable to a file node (the innermost override layer).
    pub fn set_file_var(&mut self, id: FileId, key: &str, val: impl Into<Value>) {
        let env = self.node(id).env;
        self.envs.set(env, key, val);
    }

    /// Attach the description shown by goal listings.
    pub fn describe(&mut self, id: FileId, text: &str) {
        self.set_file_var(id, "DESCRIPTION", text);
    }

    // ------------------------------------------------------------- scripts

    /// Evaluate a sub-script: push a fresh environment scoped to the
    /// sub-directory, run the registration closure, and pop. The directory
    /// must exist.
    pub fn subdir<F>(&mut self, dir: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Workspace) -> Result<()>,
    {
        let dpath = self.envs.dir(self.cur).join(dir).norm();
        if !dpath.is_dir() {
            return Err(BuildError::script(format!(
                "no sub-directory '{}' in {}",
                dir,
                self.envs.dir(self.cur)
            )));
        }
        let name = format!("{}_{}", self.envs.name(self.cur), dir).replace('.', "_");
        let env = self.envs.push_level(name, dpath, self.cur);
        self.push_env(env);
        let r = f(self);
        self.pop_env();
        r
    }

    /// Queue a delayed initializer; the driver runs them once, in order,
    /// after all scripts have loaded and before the first traversal.
    pub fn post_init(
        &mut self,
        f: impl FnOnce(&mut Workspace, &mut Context) -> Result<()> + 'static,
    ) {
        self.post_inits.push(Box::new(f));
    }

    pub(crate) fn run_post_inits(&mut self, ctx: &mut Context) -> Result<()> {
        while !self.post_inits.is_empty() {
            let batch: Vec<PostInit> = self.post_inits.drain(..).collect();
            for f in batch {
                f(self, ctx)?;
            }
        }
        Ok(())
    }

    /// Values resolved into the configuration level, for persistence.
    pub(crate) fn local_config_entries(&self) -> Vec<(String, Value)> {
        self.envs.local_entries(self.config_env)
    }

    // --------------------------------------------------------------- state

    /// Directory holding engine state (signature store, build lock).
    pub fn state_dir(&self) -> Fpath {
        self.topdir.join(".mason")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_interning_identity() {
        let mut ws = Workspace::for_tests();
        let a = ws.file("src/a.c");
        let b = ws.file("src/a.c");
        let c = ws.file("/t/src/a.c");
        assert_eq!(a, b);
        assert_eq!(a, c, "absolute and script-relative forms intern the same node");
        let s = ws.node(a).path.to_string();
        assert_eq!(ws.file(s), a);
    }

    #[test]
    fn test_file_resolves_against_current_script_dir() {
        let mut ws = Workspace::for_tests();
        let sub = ws.envs.push_level("sub", Fpath::new("/t/sub"), ws.top_env);
        ws.push_env(sub);
        let f = ws.file("x.c");
        ws.pop_env();
        assert_eq!(ws.node(f).path.as_str(), "/t/sub/x.c");
    }

    #[test]
    fn test_actual_without_bpath_is_declared_path() {
        let mut ws = Workspace::for_tests();
        let f = ws.file("out/prog");
        ws.node_mut(f).is_target = true;
        assert_eq!(ws.actual(f).as_str(), "/t/out/prog");
    }

    #[test]
    fn test_actual_redirects_targets_under_bpath() {
        let mut ws = Workspace::for_tests();
        ws.set("BPATH", "build");
        let tgt = ws.file("src/a.o");
        ws.node_mut(tgt).is_target = true;
        let src = ws.file("src/a.c");
        assert_eq!(ws.actual(tgt).as_str(), "/t/build/src/a.o");
        // non-targets are never redirected
        assert_eq!(ws.actual(src).as_str(), "/t/src/a.c");
    }

    #[test]
    fn test_goal_file_requires_existing_node() {
        let mut ws = Workspace::for_tests();
        assert!(ws.goal_file("nothing").is_err());
        let f = ws.file("all");
        assert_eq!(ws.goal_file("all").unwrap(), f);
        ws.add_alias("shortcut", f);
        assert_eq!(ws.goal_file("shortcut").unwrap(), f);
    }

    #[test]
    fn test_file_vars_inherit_from_script_env() {
        let mut ws = Workspace::for_tests();
        ws.set("CFLAGS", "-O2");
        let f = ws.file("a.c");
        assert_eq!(ws.file_var(f, "CFLAGS"), Some(Value::from("-O2")));
        // per-file override shadows the script level
        ws.set_file_var(f, "CFLAGS", "-g");
        assert_eq!(ws.file_var(f, "CFLAGS"), Some(Value::from("-g")));
        assert_eq!(ws.get("CFLAGS"), Some(Value::from("-O2")));
    }

    #[test]
    fn test_subdir_missing_directory_is_script_error() {
        let mut ws = Workspace::for_tests();
        let err = ws.subdir("nope", |_| Ok(())).unwrap_err();
        assert!(matches!(err, BuildError::Script(_)));
    }

    #[test]
    fn test_subdir_scopes_environment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        let mut ws = Workspace::with_topdir(dir.path());
        ws.set("WHO", "top");
        let mut inner_who = None;
        let mut inner_file = None;
        ws.subdir("lib", |ws| {
            inner_who = ws.get("WHO");
            ws.set("WHO", "lib");
            inner_file = Some(ws.file("x.c"));
            Ok(())
        })
        .unwrap();
        assert_eq!(inner_who, Some(Value::from("top")));
        // the sub-level shadowing is gone after pop
        assert_eq!(ws.get("WHO"), Some(Value::from("top")));
        let f = inner_file.unwrap();
        assert!(ws.node(f).path.as_str().ends_with("lib/x.c"));
    }

    #[test]
    fn test_post_inits_run_once_in_order() {
        let mut ws = Workspace::for_tests();
        ws.set("ORDER", "");
        ws.post_init(|ws, _| {
            ws.append("ORDER", "a");
            Ok(())
        });
        ws.post_init(|ws, _| {
            ws.append("ORDER", "b");
            Ok(())
        });
        let mut ctx = Context::new();
        ws.run_post_inits(&mut ctx).unwrap();
        assert_eq!(ws.get("ORDER"), Some(Value::from("a b")));
        ws.run_post_inits(&mut ctx).unwrap();
        assert_eq!(ws.get("ORDER"), Some(Value::from("a b")));
    }
}
