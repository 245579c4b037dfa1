//! Generated configuration.
//!
//! Probes resolve values once (compiler paths, platform switches) into the
//! `config` environment level, which is persisted as `config.toml` at the
//! top of the project. The file carries a host fingerprint: a configuration
//! run discards values recorded on another machine, a normal run only
//! warns. The file is rewritten whenever a probe changes a value.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::action::capture;
use crate::error::{BuildError, Result};
use crate::output::Context;
use crate::path::Fpath;
use crate::value::Value;
use crate::workspace::Workspace;

/// One configuration step. `done` checks whether a previous run already
/// resolved it; `perform` probes the system and records the result.
pub trait Probe {
    fn done(&self, ws: &Workspace) -> bool;
    fn perform(&mut self, ws: &mut Workspace, ctx: &mut Context) -> Result<()>;
}

#[derive(Default)]
pub struct ConfigState {
    pub comments: HashMap<String, String>,
    pub updated: bool,
    pub loaded: bool,
    pub probes: Vec<Box<dyn Probe>>,
}

#[derive(Serialize, Deserialize, Default)]
struct OnDisk {
    #[serde(default)]
    host: String,
    #[serde(default)]
    values: BTreeMap<String, toml::Value>,
}

/// Fingerprint of the machine configuration values were resolved on.
pub fn host() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

fn config_path(ws: &Workspace) -> Fpath {
    ws.topdir.join("config.toml")
}

fn to_toml(v: &Value) -> toml::Value {
    match v {
        Value::Str(s) => toml::Value::String(s.clone()),
        Value::Path(p) => toml::Value::String(p.to_string()),
        Value::Int(i) => toml::Value::Integer(*i),
        Value::Bool(b) => toml::Value::Boolean(*b),
        Value::List(l) => toml::Value::Array(l.iter().map(to_toml).collect()),
    }
}

fn from_toml(v: &toml::Value) -> Option<Value> {
    match v {
        toml::Value::String(s) => Some(Value::Str(s.clone())),
        toml::Value::Integer(i) => Some(Value::Int(*i)),
        toml::Value::Boolean(b) => Some(Value::Bool(*b)),
        toml::Value::Array(a) => Some(Value::List(
            a.iter().filter_map(from_toml).collect(),
        )),
        _ => None,
    }
}

/// Set a value in the configuration environment.
pub fn set(ws: &mut Workspace, key: &str, val: impl Into<Value>) {
    let env = ws.config_env;
    ws.env_set(env, key, val);
}

/// Test whether a configuration item is set to something usable.
pub fn is_set(ws: &Workspace, key: &str) -> bool {
    match ws.env_get(ws.config_env, key) {
        None => false,
        Some(Value::Bool(b)) => b,
        Some(Value::Int(i)) => i != 0,
        Some(v) => !v.is_empty(),
    }
}

/// Set a configuration item when it is not set yet; the closure computes
/// the value. A fresh value marks the configuration updated.
pub fn set_if(ws: &mut Workspace, key: &str, f: impl FnOnce() -> Value) {
    if !is_set(ws, key) {
        set(ws, key, f());
        ws.config.updated = true;
    }
}

/// Attach a comment emitted next to the variable in `config.toml`.
pub fn set_comment(ws: &mut Workspace, key: &str, comment: &str) {
    ws.config.comments.insert(key.to_string(), comment.to_string());
}

/// Baseline configuration present on every setup.
fn setup(ws: &mut Workspace) {
    if let Some(bpath) = ws.env_get(ws.builtin_env, "BPATH") {
        set(ws, "BPATH", bpath);
    }
    set_if(ws, "IS_WINDOWS", || Value::Bool(cfg!(windows)));
    set_if(ws, "IS_UNIX", || Value::Bool(cfg!(unix)));
}

/// Load `config.toml` if present. During a configuration run a host
/// mismatch silently discards the stored values; during a normal run it
/// only warns.
pub fn load(ws: &mut Workspace, ctx: &mut Context, configuring: bool) {
    if ws.config.loaded {
        return;
    }
    ws.config.loaded = true;

    let path = config_path(ws);
    if !path.exists() {
        setup(ws);
        return;
    }
    let doc: OnDisk = match std::fs::read_to_string(path.as_std())
        .map_err(|e| e.to_string())
        .and_then(|t| toml::from_str(&t).map_err(|e| e.to_string()))
    {
        Ok(d) => d,
        Err(e) => {
            ctx.print_warning(&format!("cannot read {}: {}", path, e));
            setup(ws);
            return;
        }
    };

    if !doc.host.is_empty() && doc.host != host() {
        if configuring {
            // resolved on another machine: start over
            setup(ws);
            ws.config.updated = true;
            return;
        }
        ctx.print_warning(&format!(
            "{} was generated for a different host; re-run the 'config' goal",
            path
        ));
    }
    for (k, v) in &doc.values {
        if let Some(val) = from_toml(v) {
            set(ws, k, val);
        }
    }
}

/// Write the configuration file.
pub fn save(ws: &Workspace) -> Result<()> {
    let path = config_path(ws);
    let mut values = BTreeMap::new();
    for (k, v) in ws.local_config_entries() {
        values.insert(k, to_toml(&v));
    }
    let doc = OnDisk {
        host: host(),
        values,
    };
    let body = toml::to_string(&doc)
        .map_err(|e| BuildError::action(format!("cannot serialize configuration: {}", e)))?;

    let mut text = String::from("# generated configuration\n");
    text.push_str("# You are allowed to modify this file to tune or complete it.\n");
    let mut comments: Vec<(&String, &String)> = ws.config.comments.iter().collect();
    comments.sort();
    for (k, c) in comments {
        text.push_str(&format!("# {}: {}\n", k, c.replace('\n', " ")));
    }
    text.push('\n');
    text.push_str(&body);

    std::fs::write(path.as_std(), text)
        .map_err(|e| BuildError::action(format!("cannot write '{}': {}", path, e)))?;
    Ok(())
}

/// Run the configuration: baseline setup, then every registered probe that
/// is not already resolved, saving the file when something changed.
pub fn make(ws: &mut Workspace, ctx: &mut Context) -> Result<()> {
    setup(ws);
    let mut probes = std::mem::take(&mut ws.config.probes);
    let mut result = Ok(());
    for p in probes.iter_mut() {
        if !p.done(ws) {
            result = p.perform(ws, ctx);
            if result.is_err() {
                break;
            }
        }
    }
    ws.config.probes = probes;
    result?;
    if ws.config.updated {
        save(ws)?;
        ws.config.updated = false;
    }
    Ok(())
}

// ------------------------------------------------------------------ probes

/// Look for the first executable candidate program, searching extra paths
/// and the system `PATH`, and record it in the configuration.
pub struct FindProgram {
    label: String,
    var: String,
    candidates: Vec<String>,
    extra_paths: Vec<Fpath>,
    syspath: bool,
    sysfirst: bool,
}

fn is_executable(p: &std::path::Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(p)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        p.is_file()
    }
}

impl Probe for FindProgram {
    fn done(&self, ws: &Workspace) -> bool {
        is_set(ws, &self.var)
    }

    fn perform(&mut self, ws: &mut Workspace, ctx: &mut Context) -> Result<()> {
        let mut paths: Vec<Fpath> = Vec::new();
        if self.syspath && self.sysfirst {
            paths.extend(system_paths());
        }
        paths.extend(self.extra_paths.iter().cloned());
        if self.syspath && !self.sysfirst {
            paths.extend(system_paths());
        }

        ctx.print_action(&self.label);
        let mut found: Option<String> = None;
        'search: for dir in &paths {
            for prog in &self.candidates {
                let candidate = dir.join(prog);
                if is_executable(candidate.as_std()) {
                    // keep the bare name for system paths, the full path
                    // for explicitly listed ones
                    found = if self.extra_paths.contains(dir) {
                        Some(candidate.to_string())
                    } else {
                        Some(prog.clone())
                    };
                    break 'search;
                }
            }
        }

        match found {
            Some(prog) => {
                set(ws, &self.var, prog.clone());
                ws.config.updated = true;
                ctx.print_action_success(&format!("found: {}", prog));
            }
            None => {
                set(ws, &self.var, "");
                ctx.print_action_failure("not found");
            }
        }
        Ok(())
    }
}

fn system_paths() -> Vec<Fpath> {
    std::env::var("PATH")
        .unwrap_or_default()
        .split(':')
        .filter(|p| !p.is_empty())
        .map(Fpath::new)
        .collect()
}

/// Register a program-lookup probe run by the `config` goal.
pub fn find_program<I, S>(ws: &mut Workspace, label: &str, var: &str, candidates: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    find_program_in(ws, label, var, candidates, Vec::<Fpath>::new());
}

/// Like [`find_program`], also searching explicit directories before giving
/// up.
pub fn find_program_in<I, S, P>(
    ws: &mut Workspace,
    label: &str,
    var: &str,
    candidates: I,
    extra_paths: Vec<P>,
) where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    P: Into<Fpath>,
{
    ws.config.probes.push(Box::new(FindProgram {
        label: label.to_string(),
        var: var.to_string(),
        candidates: candidates.into_iter().map(Into::into).collect(),
        extra_paths: extra_paths.into_iter().map(Into::into).collect(),
        syspath: true,
        sysfirst: true,
    }));
}

/// Probe that records the output of a shell command (compiler version
/// strings and similar).
pub struct CommandOutput {
    label: String,
    var: String,
    command: String,
}

impl Probe for CommandOutput {
    fn done(&self, ws: &Workspace) -> bool {
        is_set(ws, &self.var)
    }

    fn perform(&mut self, ws: &mut Workspace, ctx: &mut Context) -> Result<()> {
        ctx.print_action(&self.label);
        match capture(&self.command) {
            Ok(out) => {
                set(ws, &self.var, out.clone());
                ws.config.updated = true;
                ctx.print_action_success(&out);
            }
            Err(e) => {
                set(ws, &self.var, "");
                ctx.print_action_failure(&e.to_string());
            }
        }
        Ok(())
    }
}

/// Register a command-output probe run by the `config` goal.
pub fn probe_output(ws: &mut Workspace, label: &str, var: &str, command: &str) {
    ws.config.probes.push(Box::new(CommandOutput {
        label: label.to_string(),
        var: var.to_string(),
        command: command.to_string(),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_ctx() -> Context {
        let mut ctx = Context::new();
        ctx.quiet = true;
        ctx.complete_quiet = true;
        ctx
    }

    #[test]
    fn test_setup_defines_platform_switches() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = Workspace::with_topdir(dir.path());
        let mut ctx = quiet_ctx();
        load(&mut ws, &mut ctx, false);
        assert!(ws.env_get(ws.config_env, "IS_UNIX").is_some());
        assert!(ws.env_get(ws.config_env, "IS_WINDOWS").is_some());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = Workspace::with_topdir(dir.path());
        set(&mut ws, "CC", "/usr/bin/cc");
        set(&mut ws, "OPT", Value::Int(2));
        set_comment(&mut ws, "CC", "the C compiler");
        save(&mut ws).unwrap();

        let mut ws2 = Workspace::with_topdir(dir.path());
        let mut ctx = quiet_ctx();
        load(&mut ws2, &mut ctx, false);
        assert_eq!(
            ws2.env_get(ws2.config_env, "CC"),
            Some(Value::from("/usr/bin/cc"))
        );
        assert_eq!(ws2.env_get(ws2.config_env, "OPT"), Some(Value::Int(2)));
        let text = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
        assert!(text.contains("the C compiler"));
        assert!(text.contains("host"));
    }

    #[test]
    fn test_host_mismatch_discards_on_configure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "host = \"somewhere else\"\n\n[values]\nCC = \"cl.exe\"\n",
        )
        .unwrap();

        let mut ws = Workspace::with_topdir(dir.path());
        let mut ctx = quiet_ctx();
        load(&mut ws, &mut ctx, true);
        // stale foreign value was not loaded
        assert_eq!(ws.env_get(ws.config_env, "CC"), None);

        // a normal run keeps the values and only warns
        let mut ws2 = Workspace::with_topdir(dir.path());
        load(&mut ws2, &mut ctx, false);
        assert_eq!(ws2.env_get(ws2.config_env, "CC"), Some(Value::from("cl.exe")));
    }

    #[test]
    fn test_set_if_only_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = Workspace::with_topdir(dir.path());
        set(&mut ws, "NPROC", Value::Int(8));
        set_if(&mut ws, "NPROC", || Value::Int(1));
        assert_eq!(ws.env_get(ws.config_env, "NPROC"), Some(Value::Int(8)));
        set_if(&mut ws, "OTHER", || Value::Int(1));
        assert_eq!(ws.env_get(ws.config_env, "OTHER"), Some(Value::Int(1)));
    }

    #[test]
    fn test_find_program_probe() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = Workspace::with_topdir(dir.path());
        let mut ctx = quiet_ctx();
        // "sh" exists on any unix test machine
        find_program(&mut ws, "checking for shell", "SH", ["sh"]);
        make(&mut ws, &mut ctx).unwrap();
        assert!(is_set(&ws, "SH"));
        // resolved values are persisted
        assert!(dir.path().join("config.toml").exists());
    }

    #[test]
    fn test_probe_not_rerun_when_done() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = Workspace::with_topdir(dir.path());
        let mut ctx = quiet_ctx();
        set(&mut ws, "SH", "/bin/sh");
        find_program(&mut ws, "checking for shell", "SH", ["definitely-not-a-shell"]);
        make(&mut ws, &mut ctx).unwrap();
        // the existing value survives because the probe was already done
        assert_eq!(ws.env_get(ws.config_env, "SH"), Some(Value::from("/bin/sh")));
    }
}
