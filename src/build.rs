//! Staleness, traversal, and the builders.
//!
//! A build is split in jobs that can only run once their dependencies have
//! been made. Traversal computes the stale set in post-order, so the
//! resulting job list is a valid build order; the builders then process it
//! sequentially, as a dry run, or as an up-to-date question.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime};

use crate::action::interrupted;
use crate::error::{BuildError, Result};
use crate::file::FileId;
use crate::output::Context;
use crate::workspace::Workspace;

// ----------------------------------------------------------------- staleness

impl Workspace {
    /// Last update time of a file. Goals and plain phony files have no
    /// time; meta files inherit the youngest dependency time.
    pub fn time(&self, fid: FileId) -> SystemTime {
        let n = self.node(fid);
        if n.is_goal {
            return SystemTime::UNIX_EPOCH;
        }
        if n.is_meta {
            return match n.recipe {
                Some(rid) => self
                    .recipes
                    .get(rid)
                    .deps
                    .iter()
                    .map(|&d| self.time(d))
                    .max()
                    .unwrap_or(SystemTime::UNIX_EPOCH),
                None => SystemTime::UNIX_EPOCH,
            };
        }
        self.actual(fid).mod_time()
    }

    /// True when `fid` is older than the dependency `dep`. A missing
    /// non-phony dependency counts as newer; directories never do.
    fn younger_than(&self, fid: FileId, dep: FileId) -> bool {
        let d = self.node(dep);
        if !d.is_meta && !d.is_phony && !self.actual(dep).exists() {
            return true;
        }
        if self.actual(dep).is_dir() {
            return false;
        }
        self.time(fid) < self.time(dep)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    InProgress,
    Done,
}

/// Shared state of one staleness computation: memoized answers plus the
/// recursion stack used to detect dependency cycles.
#[derive(Default)]
struct Traversal {
    memo: HashMap<FileId, bool>,
    stack: Vec<FileId>,
}

impl Workspace {
    fn needs_update_rec(&mut self, t: &mut Traversal, fid: FileId) -> Result<bool> {
        if let Some(&r) = t.memo.get(&fid) {
            return Ok(r);
        }
        if t.stack.contains(&fid) {
            return Err(BuildError::script(format!(
                "dependency cycle involving '{}'",
                self.display(fid)
            )));
        }
        t.stack.push(fid);
        let r = self.needs_update_inner(t, fid);
        t.stack.pop();
        if let Ok(v) = &r {
            t.memo.insert(fid, *v);
        }
        r
    }

    fn needs_update_inner(&mut self, t: &mut Traversal, fid: FileId) -> Result<bool> {
        let n = self.node(fid);
        let (is_goal, is_phony, is_meta, recipe) = (n.is_goal, n.is_phony, n.is_meta, n.recipe);

        // goals and plain phony nodes are always out of date
        if is_goal || (is_phony && !is_meta) {
            return Ok(true);
        }
        if !is_meta && !is_phony && !self.actual(fid).exists() {
            if recipe.is_some() {
                return Ok(true);
            }
            return Err(BuildError::MissingInput(self.display(fid)));
        }
        let Some(rid) = recipe else {
            return Ok(false);
        };
        if !self.sign_test(fid) {
            return Ok(true);
        }
        let deps = self.recipes.get(rid).deps.clone();
        for d in deps {
            if self.needs_update_rec(t, d)? || self.younger_than(fid, d) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether a single file needs to be made.
    pub fn needs_update(&mut self, fid: FileId) -> Result<bool> {
        self.needs_update_rec(&mut Traversal::default(), fid)
    }

    /// Post-order collection of the files needing update under `goal`.
    /// Every dependency of a collected file appears before it. Dependency
    /// cycles are reported as errors.
    pub fn collect_updates(&mut self, goal: FileId, out: &mut Vec<FileId>) -> Result<()> {
        let mut t = Traversal::default();
        let mut visit = HashMap::new();
        self.collect_rec(&mut t, &mut visit, goal, out, /* stale_only */ true)
    }

    /// Post-order collection of every makeable file under `goal`,
    /// regardless of staleness (`--always-make`).
    pub fn collect_all(&mut self, goal: FileId, out: &mut Vec<FileId>) -> Result<()> {
        let mut t = Traversal::default();
        let mut visit = HashMap::new();
        self.collect_rec(&mut t, &mut visit, goal, out, /* stale_only */ false)
    }

    fn collect_rec(
        &mut self,
        t: &mut Traversal,
        visit: &mut HashMap<FileId, Visit>,
        fid: FileId,
        out: &mut Vec<FileId>,
        stale_only: bool,
    ) -> Result<()> {
        match visit.get(&fid) {
            Some(Visit::InProgress) => {
                return Err(BuildError::script(format!(
                    "dependency cycle involving '{}'",
                    self.display(fid)
                )));
            }
            Some(Visit::Done) => return Ok(()),
            None => {}
        }
        visit.insert(fid, Visit::InProgress);
        if let Some(rid) = self.node(fid).recipe {
            let deps = self.recipes.get(rid).deps.clone();
            for d in deps {
                self.collect_rec(t, visit, d, out, stale_only)?;
            }
        }
        let wanted = if stale_only {
            self.needs_update_rec(t, fid)?
        } else {
            self.node(fid).recipe.is_some()
        };
        if wanted && !out.contains(&fid) {
            out.push(fid);
        }
        visit.insert(fid, Visit::Done);
        Ok(())
    }
}

// ------------------------------------------------------------------ builders

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Run the jobs, recording signatures as they complete.
    Sequential,
    /// Print the commands each job would run; touch nothing.
    DryRun,
    /// Only report whether work is pending, through the exit code.
    Question,
}

pub struct Builder {
    pub mode: Mode,
    pub show_time: bool,
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2} s", secs)
    } else {
        format!("{}:{:05.2} min", (secs / 60.0) as u64, secs % 60.0)
    }
}

impl Builder {
    pub fn new(mode: Mode) -> Builder {
        Builder {
            mode,
            show_time: false,
        }
    }

    /// Drive the job list. Returns `Ok(false)` when question mode found
    /// pending work; any failing job flushes the signatures recorded so far
    /// before the error surfaces.
    pub fn build(
        &self,
        ws: &mut Workspace,
        ctx: &mut Context,
        targets: &[FileId],
    ) -> Result<bool> {
        match self.mode {
            Mode::Sequential => self.build_seq(ws, ctx, targets).inspect_err(|_| {
                ws.save_signs(ctx);
            }),
            Mode::DryRun => self.build_dry(ws, ctx, targets),
            Mode::Question => Ok(!targets.iter().any(|&t| !ws.node(t).is_phony)),
        }
    }

    fn build_seq(
        &self,
        ws: &mut Workspace,
        ctx: &mut Context,
        targets: &[FileId],
    ) -> Result<bool> {
        let total = targets.len().max(1);
        let start = Instant::now();
        for (done, &target) in targets.iter().enumerate() {
            if interrupted() {
                return Err(BuildError::Interrupted);
            }
            let hidden = ws.node(target).is_hidden;
            if !hidden {
                let msg = format!("[{:3}%] Making {}", done * 100 / total, ws.display(target));
                if self.show_time {
                    ctx.print_action(&msg);
                } else {
                    ctx.print_info(&msg);
                }
            }
            let job_start = Instant::now();
            self.run_job(ws, ctx, target)?;
            ws.sign_record(target);
            if !hidden && self.show_time {
                ctx.finish_action(&format!("({})", format_duration(job_start.elapsed())));
            }
        }
        if self.show_time {
            ctx.print_success(&format!(
                "all is fine ({})!",
                format_duration(start.elapsed())
            ));
        } else {
            ctx.print_success("all is fine!");
        }
        ws.save_signs(ctx);
        Ok(true)
    }

    fn run_job(&self, ws: &mut Workspace, ctx: &mut Context, target: FileId) -> Result<()> {
        let Some(rid) = ws.node(target).recipe else {
            return Ok(());
        };

        // make sure every result's directory exists before the action runs
        let ress = ws.recipes.get(rid).ress.clone();
        for r in ress {
            if ws.node(r).is_phony {
                continue;
            }
            let parent = ws.actual(r).parent();
            if !parent.is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent.as_std()).map_err(|e| {
                    BuildError::action(format!("cannot create '{}': {}", parent, e))
                })?;
            }
        }

        // install the recipe's environment and working directory, restoring
        // both whatever the action does
        let saved_cwd = std::env::current_dir().ok();
        let (renv, rcwd) = {
            let r = ws.recipes.get(rid);
            (r.env, r.cwd.clone())
        };
        ws.push_env(renv);
        let _ = std::env::set_current_dir(rcwd.as_std());
        let action = ws.recipe_action(rid);
        let result = action.execute(ws, ctx);
        ws.pop_env();
        if let Some(cwd) = saved_cwd {
            let _ = std::env::set_current_dir(cwd);
        }
        result
    }

    fn build_dry(
        &self,
        ws: &mut Workspace,
        ctx: &mut Context,
        targets: &[FileId],
    ) -> Result<bool> {
        ctx.print_warning("dry run!");
        for &target in targets {
            if ws.node(target).is_hidden {
                continue;
            }
            ctx.print_info(&format!("To make: {}", ws.display(target)));
            if let Some(rid) = ws.node(target).recipe {
                let renv = ws.recipes.get(rid).env;
                ws.push_env(renv);
                let cmds = ws.recipe_commands(rid);
                for c in &cmds {
                    ctx.print_command(c);
                }
                ws.pop_env();
            }
        }
        Ok(true)
    }
}
