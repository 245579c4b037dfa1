//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use std::path::Path;

use mason::{Builder, Context, FileId, Mode, Value, Workspace};

/// Workspace rooted at a test directory.
pub fn workspace(dir: &Path) -> Workspace {
    Workspace::with_topdir(dir)
}

/// Register a copy-based "compiler" turning `.c` into `.o`; `extra` adds a
/// flag so tests can change the action signature without touching inputs.
pub fn object_gen(ws: &mut Workspace, extra: &'static str) {
    ws.gen_command(".o", ".c", move |ws, ress, deps| {
        vec![
            Value::from("cp"),
            Value::from(extra),
            Value::Path(ws.actual(deps[0])),
            Value::Path(ws.actual(ress[0])),
        ]
    });
}

/// Register a copy-based "parser generator" turning `.y` into `.c`.
pub fn parser_gen(ws: &mut Workspace) {
    ws.gen_command(".c", ".y", |ws, ress, deps| {
        vec![
            Value::from("cp"),
            Value::Path(ws.actual(deps[0])),
            Value::Path(ws.actual(ress[0])),
        ]
    });
}

/// A context that keeps test output clean.
pub fn quiet_ctx() -> Context {
    let mut ctx = Context::new();
    ctx.quiet = true;
    ctx.complete_quiet = true;
    ctx
}

/// Collect the stale set under `goal` and run the sequential builder over
/// it. Returns the processed job list.
pub fn build_target(ws: &mut Workspace, goal: FileId) -> mason::Result<Vec<FileId>> {
    let mut ctx = quiet_ctx();
    ws.load_signs(&mut ctx);
    let mut targets = Vec::new();
    ws.collect_updates(goal, &mut targets)?;
    Builder::new(Mode::Sequential).build(ws, &mut ctx, &targets)?;
    Ok(targets)
}

/// The stale set under `goal` without building anything.
pub fn stale_set(ws: &mut Workspace, goal: FileId) -> mason::Result<Vec<FileId>> {
    let mut ctx = quiet_ctx();
    ws.load_signs(&mut ctx);
    let mut targets = Vec::new();
    ws.collect_updates(goal, &mut targets)?;
    Ok(targets)
}

/// Push a file's modification time into the future relative to another.
pub fn touch_newer(path: &Path, than: &Path) {
    let base = filetime::FileTime::from_last_modification_time(
        &std::fs::metadata(than).unwrap(),
    );
    let newer = filetime::FileTime::from_unix_time(base.unix_seconds() + 10, 0);
    filetime::set_file_mtime(path, newer).unwrap();
}
