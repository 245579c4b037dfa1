//! Extension database and recipe generators.
//!
//! A generator teaches the engine how to produce a file with one extension
//! from a file with another (`.o` from `.c`). For every extension the
//! database keeps a forward map from target extension to generator which is
//! propagated transitively on registration, so that a `.y`-to-`.c` generator
//! combined with `.c`-to-`.o` makes `.o` reachable from `.y` in one lookup.
//!
//! Chain resolution materializes the intermediate recipes on demand:
//! asking for `dir/p.o` from `p.y` synthesizes delayed recipes for `p.c`
//! and `p.o` and returns the produced files in order.

use std::collections::HashMap;
use std::rc::Rc;

use crate::action::Action;
use crate::error::{BuildError, Result};
use crate::file::FileId;
use crate::path::Fpath;
use crate::recipe::ActionFn;
use crate::value::Value;
use crate::workspace::Workspace;

/// Stable handle to a registered generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenId(pub(crate) usize);

pub struct Gen {
    /// Extension produced, with its leading dot (".o").
    pub res: String,
    /// Extension consumed, with its leading dot (".c").
    pub dep: String,
    /// Action builder invoked with the synthesized recipe's files.
    pub fun: Rc<ActionFn>,
}

#[derive(Default)]
struct ExtEntry {
    /// Forward map: reachable target extension to the generator taking the next
    /// step from here.
    gens: HashMap<String, GenId>,
    /// Generators producing this extension (for backward propagation).
    backs: Vec<GenId>,
}

#[derive(Default)]
pub struct ExtDb {
    exts: HashMap<String, ExtEntry>,
    gens: Vec<Gen>,
}

impl ExtDb {
    pub fn new() -> Self {
        ExtDb::default()
    }

    pub fn r#gen(&self, id: GenId) -> &Gen {
        &self.gens[id.0]
    }

    pub fn knows(&self, ext: &str) -> bool {
        self.exts.contains_key(ext)
    }

    /// Look up the generator taking one step from `from` toward `target`.
    pub fn lookup(&self, from: &str, target: &str) -> Option<GenId> {
        self.exts.get(from)?.gens.get(target).copied()
    }

    /// Iterate `(extension, target extension, generator)` for database
    /// printing.
    pub fn entries(&self) -> Vec<(String, String, GenId)> {
        let mut out = Vec::new();
        let mut exts: Vec<&String> = self.exts.keys().collect();
        exts.sort();
        for e in exts {
            let mut targets: Vec<(&String, &GenId)> = self.exts[e].gens.iter().collect();
            targets.sort_by_key(|(t, _)| t.clone());
            for (t, g) in targets {
                out.push((e.clone(), t.clone(), *g));
            }
        }
        out
    }

    fn entry_mut(&mut self, ext: &str) -> &mut ExtEntry {
        self.exts.entry(ext.to_string()).or_default()
    }

    /// Register a generator and propagate reachability backwards. The last
    /// registration for a given (extension, target) pair wins.
    pub fn register(&mut self, r#gen: Gen) -> GenId {
        let gid = GenId(self.gens.len());
        let res = r#gen.res.clone();
        let dep = r#gen.dep.clone();
        self.gens.push(r#gen);

        self.entry_mut(&res).backs.push(gid);
        self.entry_mut(&dep);

        // seed: the direct step, plus every target already reachable from
        // the produced extension that the consumed one does not know yet
        let mut work: Vec<(String, String, GenId)> = vec![(dep.clone(), res.clone(), gid)];
        let known: Vec<String> = self.exts[&res].gens.keys().cloned().collect();
        for t in known {
            if !self.exts[&dep].gens.contains_key(&t) {
                work.push((dep.clone(), t.clone(), gid));
            }
        }

        while let Some((at, target, via)) = work.pop() {
            let entry = self.entry_mut(&at);
            if entry.gens.get(&target) == Some(&via) {
                continue;
            }
            entry.gens.insert(target.clone(), via);
            let backs = entry.backs.clone();
            for b in backs {
                let bdep = self.gens[b.0].dep.clone();
                work.push((bdep, target.clone(), b));
            }
        }
        gid
    }
}

impl Workspace {
    /// Register a generator building an action from the synthesized
    /// recipe's results and dependencies.
    pub fn gen_action(
        &mut self,
        to_ext: &str,
        from_ext: &str,
        fun: impl Fn(&Workspace, &[FileId], &[FileId]) -> Action + 'static,
    ) {
        self.exts.register(Gen {
            res: to_ext.to_string(),
            dep: from_ext.to_string(),
            fun: Rc::new(fun),
        });
    }

    /// Register a generator building a command line from the synthesized
    /// recipe's results and dependencies.
    pub fn gen_command(
        &mut self,
        to_ext: &str,
        from_ext: &str,
        fun: impl Fn(&Workspace, &[FileId], &[FileId]) -> Vec<Value> + 'static,
    ) {
        self.gen_action(to_ext, from_ext, move |ws, ress, deps| Action::Invoke {
            args: fun(ws, ress, deps),
        });
    }

    /// Synthesize the recipes needed to build a `target_ext` file under
    /// `dir` from `source`. Returns the produced files in build order; the
    /// last one carries `target_ext`. Intermediates that already have a
    /// recipe are reused as-is.
    pub fn resolve_chain(
        &mut self,
        dir: &Fpath,
        target_ext: &str,
        source: impl Into<Fpath>,
    ) -> Result<Vec<FileId>> {
        let src: Fpath = source.into();
        let kern = dir.join(src.stem());
        let src_ext = src.extension();

        if !self.exts.knows(&src_ext) {
            return Err(BuildError::NoChain {
                from: src_ext,
                to: target_ext.to_string(),
            });
        }

        let mut ext = src_ext;
        let mut prev = self.file(src);
        let mut produced = Vec::new();
        let mut seen = vec![ext.clone()];

        while ext != target_ext {
            let gid = self
                .exts
                .lookup(&ext, target_ext)
                .ok_or_else(|| BuildError::NoChain {
                    from: ext.clone(),
                    to: target_ext.to_string(),
                })?;
            let (next_ext, fun) = {
                let g = self.exts.r#gen(gid);
                (g.res.clone(), g.fun.clone())
            };
            if seen.contains(&next_ext) {
                return Err(BuildError::script(format!(
                    "generator cycle between '{}' and '{}'",
                    ext, next_ext
                )));
            }
            let next = self.file(kern.append_ext(&next_ext));
            if self.node(next).recipe.is_none() {
                self.delayed_rule([next], [prev], fun)?;
            }
            produced.push(next);
            seen.push(next_ext.clone());
            prev = next;
            ext = next_ext;
        }
        Ok(produced)
    }

    /// Commands a generator would run, rendered against wildcard files
    /// (`*.o` from `*.c`); used when the database is printed.
    pub(crate) fn generator_commands(&mut self, gid: GenId) -> Vec<String> {
        let (res, dep, fun) = {
            let g = self.exts.r#gen(gid);
            (g.res.clone(), g.dep.clone(), g.fun.clone())
        };
        let res_f = self.file(format!("*{}", res));
        let dep_f = self.file(format!("*{}", dep));
        let act = fun(self, &[res_f], &[dep_f]);
        let mut cmds = Vec::new();
        act.commands(self, &mut cmds);
        cmds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc_gen(ws: &mut Workspace) {
        ws.gen_command(".o", ".c", |ws, ress, deps| {
            vec![
                "cc -o".into(),
                Value::Path(ws.node(ress[0]).path.clone()),
                "-c".into(),
                Value::Path(ws.node(deps[0]).path.clone()),
            ]
        });
    }

    fn yacc_gen(ws: &mut Workspace) {
        ws.gen_command(".c", ".y", |ws, ress, deps| {
            vec![
                "yacc -o".into(),
                Value::Path(ws.node(ress[0]).path.clone()),
                Value::Path(ws.node(deps[0]).path.clone()),
            ]
        });
    }

    #[test]
    fn test_register_updates_forward_map() {
        let mut ws = Workspace::for_tests();
        cc_gen(&mut ws);
        assert!(ws.exts.lookup(".c", ".o").is_some());
        assert!(ws.exts.lookup(".c", ".x").is_none());
    }

    #[test]
    fn test_transitive_propagation() {
        let mut ws = Workspace::for_tests();
        cc_gen(&mut ws);
        yacc_gen(&mut ws);
        // .o became reachable from .y through .c
        let gid = ws.exts.lookup(".y", ".o").expect("transitive entry");
        assert_eq!(ws.exts.r#gen(gid).res, ".c");
    }

    #[test]
    fn test_transitive_propagation_in_either_registration_order() {
        let mut ws = Workspace::for_tests();
        yacc_gen(&mut ws);
        cc_gen(&mut ws);
        let gid = ws.exts.lookup(".y", ".o").expect("transitive entry");
        assert_eq!(ws.exts.r#gen(gid).res, ".c");
    }

    #[test]
    fn test_last_registration_wins() {
        let mut ws = Workspace::for_tests();
        cc_gen(&mut ws);
        let first = ws.exts.lookup(".c", ".o").unwrap();
        ws.gen_command(".o", ".c", |_, _, _| vec!["cc -O2".into()]);
        let second = ws.exts.lookup(".c", ".o").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_resolve_single_step() {
        let mut ws = Workspace::for_tests();
        cc_gen(&mut ws);
        let dir = ws.topdir.clone();
        let files = ws.resolve_chain(&dir, ".o", "a.c").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(ws.node(files[0]).path.extension(), ".o");
        assert!(ws.node(files[0]).recipe.is_some());
    }

    #[test]
    fn test_resolve_chain_through_intermediate() {
        let mut ws = Workspace::for_tests();
        cc_gen(&mut ws);
        yacc_gen(&mut ws);
        let dir = ws.topdir.clone();
        let files = ws.resolve_chain(&dir, ".o", "p.y").unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(ws.node(files[0]).path.extension(), ".c");
        assert_eq!(ws.node(files[1]).path.extension(), ".o");
        // intermediate .c is a dependency of the final .o
        let rid = ws.node(files[1]).recipe.unwrap();
        assert_eq!(ws.recipes.get(rid).deps, vec![files[0]]);
    }

    #[test]
    fn test_resolve_unknown_extension_fails() {
        let mut ws = Workspace::for_tests();
        cc_gen(&mut ws);
        let dir = ws.topdir.clone();
        let err = ws.resolve_chain(&dir, ".o", "a.zzz").unwrap_err();
        assert!(matches!(err, BuildError::NoChain { .. }));
    }

    #[test]
    fn test_resolve_unreachable_target_fails() {
        let mut ws = Workspace::for_tests();
        cc_gen(&mut ws);
        let dir = ws.topdir.clone();
        let err = ws.resolve_chain(&dir, ".exe", "a.c").unwrap_err();
        assert!(matches!(err, BuildError::NoChain { .. }));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut ws = Workspace::for_tests();
        cc_gen(&mut ws);
        let dir = ws.topdir.clone();
        let a = ws.resolve_chain(&dir, ".o", "a.c").unwrap();
        let b = ws.resolve_chain(&dir, ".o", "a.c").unwrap();
        assert_eq!(a, b);
    }
}
