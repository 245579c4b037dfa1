//! Actions performed to build recipes.
//!
//! An action is a composable executable unit: it can run (`execute`), list
//! the human-readable commands it stands for (`commands`), and describe
//! itself as a stable signature string used for change detection. Deep
//! hierarchies are avoided; sequences compose through [`Action::seq`].
//!
//! Shell commands run under `sh -c` with both streams piped; a reader
//! thread per stream forwards lines into the context's sinks so neither
//! stream can block the other.

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use regex::Regex;

use crate::error::{BuildError, Result};
use crate::file::FileId;
use crate::output::{Context, Sink};
use crate::path::Fpath;
use crate::value::Value;
use crate::workspace::Workspace;

// ---------------------------------------------------------------- interrupt

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// True once the user has interrupted the build. Checked between output
/// lines and between jobs; the current action aborts at the next yield
/// point.
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub fn clear_interrupt() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

#[cfg(unix)]
pub fn install_interrupt_handler() {
    extern "C" fn on_sigint(_: libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }
    let handler: extern "C" fn(libc::c_int) = on_sigint;
    // Safety: the handler only touches an atomic flag.
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
pub fn install_interrupt_handler() {}

// ------------------------------------------------------------- command line

/// Flatten command fragments into one shell line: nested lists expand
/// left-to-right, empty values are dropped, tokens are joined by single
/// spaces.
pub fn make_line(args: &[Value]) -> String {
    let mut toks = Vec::new();
    flatten_into(args, &mut toks);
    toks.join(" ")
}

fn flatten_into(args: &[Value], toks: &mut Vec<String>) {
    for a in args {
        if a.is_empty() {
            continue;
        }
        match a {
            Value::List(l) => flatten_into(l, toks),
            v => toks.push(v.to_string()),
        }
    }
}

/// Backslash-escape the characters the shell would interpret in a token.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '(' | ')' | ' ' | '\t' | '$' | '\'' | '"' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ------------------------------------------------------------------ invoke

/// Launch a command line in the shell, forwarding its output and error
/// streams line-by-line into the context.
pub fn invoke(line: &str, ctx: &mut Context, no_out: bool, no_err: bool) -> Result<()> {
    ctx.print_command(line);

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd.stdout(if no_out { Stdio::null() } else { Stdio::piped() });
    cmd.stderr(if no_err { Stdio::null() } else { Stdio::piped() });

    let mut child = cmd
        .spawn()
        .map_err(|e| BuildError::action(format!("cannot run '{}': {}", line, e)))?;

    // One reader thread per piped stream; the channel serializes lines back
    // into the single-threaded context.
    let (tx, rx) = mpsc::channel::<(bool, String)>();
    if let Some(out) = child.stdout.take() {
        let tx = tx.clone();
        thread::spawn(move || {
            for l in BufReader::new(out).lines().map_while(|l| l.ok()) {
                if tx.send((false, l)).is_err() {
                    break;
                }
            }
        });
    }
    if let Some(err) = child.stderr.take() {
        let tx = tx.clone();
        thread::spawn(move || {
            for l in BufReader::new(err).lines().map_while(|l| l.ok()) {
                if tx.send((true, l)).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    for (is_err, l) in rx {
        if interrupted() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BuildError::Interrupted);
        }
        if is_err {
            ctx.write_err(&l);
        } else {
            ctx.write_out(&l);
        }
    }

    let status = child
        .wait()
        .map_err(|e| BuildError::action(format!("wait failed: {}", e)))?;
    if interrupted() {
        return Err(BuildError::Interrupted);
    }
    if !status.success() {
        return Err(BuildError::ActionFailed("build failed".into()));
    }
    Ok(())
}

/// Run a command quietly and return its collected standard output as a
/// single space-joined line (configuration probes use this).
pub fn capture(line: &str) -> Result<String> {
    let buf = Rc::new(std::cell::RefCell::new(String::new()));
    let mut ctx = Context::new();
    ctx.quiet = true;
    ctx.out = Sink::Buffer(buf.clone());
    ctx.err = Sink::Null;
    invoke(line, &mut ctx, false, false)?;
    let s = buf.borrow().trim_end().to_string();
    Ok(s)
}

// ------------------------------------------------------------------ actions

/// In-process work wrapped as an action. Opaque to change detection: its
/// signature is empty, so it never forces a rebuild by itself.
#[derive(Clone)]
pub struct FunAction {
    fun: Rc<dyn Fn(&Workspace, &mut Context) -> Result<()>>,
}

impl FunAction {
    pub fn new(f: impl Fn(&Workspace, &mut Context) -> Result<()> + 'static) -> Self {
        FunAction { fun: Rc::new(f) }
    }
}

#[derive(Clone)]
pub enum Action {
    Null,
    /// Shell command line. A leading `@` in the source suppresses echo.
    Shell {
        line: String,
        quiet: bool,
        no_out: bool,
        no_err: bool,
    },
    /// Ordered sequence of actions.
    Group(Vec<Action>),
    Fun(FunAction),
    /// Filter a sub-action's output and/or error stream through a regex.
    Grep {
        re: Regex,
        on_out: bool,
        on_err: bool,
        inner: Box<Action>,
    },
    /// Shell command built from value fragments, flattened at use.
    Invoke { args: Vec<Value> },
    Remove {
        files: Vec<FileId>,
        ignore_error: bool,
    },
    Move { paths: Vec<Fpath>, to: Fpath },
    Rename { from: Fpath, to: Fpath },
    MakeDir { path: Fpath },
    MakeFile { path: Fpath, content: String },
    Print { msg: String },
    /// Perform the sub-action without display and without a signature.
    Hidden(Box<Action>),
}

impl Action {
    /// Build a shell action; a leading `@` suppresses command echo.
    pub fn shell(cmd: impl Into<String>) -> Action {
        let cmd = cmd.into();
        match cmd.strip_prefix('@') {
            Some(rest) => Action::Shell {
                line: rest.to_string(),
                quiet: true,
                no_out: false,
                no_err: false,
            },
            None => Action::Shell {
                line: cmd,
                quiet: false,
                no_out: false,
                no_err: false,
            },
        }
    }

    /// Compose a sequence, collapsing the trivial cases.
    pub fn seq(mut actions: Vec<Action>) -> Action {
        match actions.pop() {
            None => Action::Null,
            Some(last) if actions.is_empty() => last,
            Some(last) => {
                actions.push(last);
                Action::Group(actions)
            }
        }
    }

    pub fn grep(pattern: &str, inner: Action, on_out: bool, on_err: bool) -> Result<Action> {
        let re = Regex::new(pattern)
            .map_err(|e| BuildError::script(format!("bad grep pattern '{}': {}", pattern, e)))?;
        Ok(Action::Grep {
            re,
            on_out,
            on_err,
            inner: Box::new(inner),
        })
    }

    pub fn print(msg: impl Into<String>) -> Action {
        Action::Print { msg: msg.into() }
    }

    pub fn hidden(inner: Action) -> Action {
        Action::Hidden(Box::new(inner))
    }

    /// Perform the action. Actions read engine state but never mutate it.
    pub fn execute(&self, ws: &Workspace, ctx: &mut Context) -> Result<()> {
        match self {
            Action::Null => Ok(()),
            Action::Shell {
                line,
                quiet,
                no_out,
                no_err,
            } => {
                let save = ctx.command_ena;
                if *quiet {
                    ctx.command_ena = false;
                }
                let r = invoke(line, ctx, *no_out, *no_err);
                ctx.command_ena = save;
                r
            }
            Action::Group(actions) => {
                for a in actions {
                    a.execute(ws, ctx)?;
                }
                Ok(())
            }
            Action::Fun(f) => (f.fun)(ws, ctx),
            Action::Grep {
                re,
                on_out,
                on_err,
                inner,
            } => {
                if *on_out {
                    let old = std::mem::replace(&mut ctx.out, Sink::Null);
                    ctx.out = Sink::Grep {
                        re: re.clone(),
                        inner: Box::new(old),
                    };
                }
                if *on_err {
                    let old = std::mem::replace(&mut ctx.err, Sink::Null);
                    ctx.err = Sink::Grep {
                        re: re.clone(),
                        inner: Box::new(old),
                    };
                }
                let r = inner.execute(ws, ctx);
                if *on_out {
                    if let Sink::Grep { inner, .. } = std::mem::replace(&mut ctx.out, Sink::Null) {
                        ctx.out = *inner;
                    }
                }
                if *on_err {
                    if let Sink::Grep { inner, .. } = std::mem::replace(&mut ctx.err, Sink::Null) {
                        ctx.err = *inner;
                    }
                }
                r
            }
            Action::Invoke { args } => invoke(&make_line(args), ctx, false, false),
            Action::Remove {
                files,
                ignore_error,
            } => {
                for &f in files {
                    let path = ws.actual(f);
                    ctx.print_command(&format!("remove '{}'", ws.display(f)));
                    let r = if path.is_dir() {
                        std::fs::remove_dir_all(path.as_std())
                    } else {
                        std::fs::remove_file(path.as_std())
                    };
                    if let Err(e) = r {
                        if !*ignore_error {
                            return Err(BuildError::action(e));
                        }
                    }
                }
                Ok(())
            }
            Action::Move { paths, to } => {
                for p in paths {
                    let dest = to.join(p.basename());
                    ctx.print_command(&format!("move '{}' to '{}'", p, dest));
                    std::fs::rename(p.as_std(), dest.as_std()).map_err(BuildError::action)?;
                }
                Ok(())
            }
            Action::Rename { from, to } => {
                ctx.print_command(&format!("rename '{}' to '{}'", from, to));
                std::fs::rename(from.as_std(), to.as_std()).map_err(BuildError::action)
            }
            Action::MakeDir { path } => {
                ctx.print_command(&format!("makedir '{}'", path));
                crate::fs_utils::makedir(path)
            }
            Action::MakeFile { path, content } => {
                let parent = path.parent();
                if !parent.is_empty() {
                    crate::fs_utils::makedir(&parent)?;
                }
                std::fs::write(path.as_std(), content).map_err(BuildError::action)
            }
            Action::Print { msg } => {
                ctx.print_info(msg);
                Ok(())
            }
            Action::Hidden(inner) => {
                let old = ctx.quiet;
                ctx.quiet = true;
                let r = inner.execute(ws, ctx);
                ctx.quiet = old;
                r
            }
        }
    }

    /// Append the human-readable command list for dry-run and database
    /// printing.
    pub fn commands(&self, ws: &Workspace, out: &mut Vec<String>) {
        match self {
            Action::Null => {}
            Action::Shell { line, .. } => out.push(line.clone()),
            Action::Group(actions) => {
                for a in actions {
                    a.commands(ws, out);
                }
            }
            Action::Fun(_) => out.push("<function>".into()),
            Action::Grep { re, inner, .. } => {
                let mut sub = Vec::new();
                inner.commands(ws, &mut sub);
                out.push(format!("{} | grep {}", sub.join("; "), re.as_str()));
            }
            Action::Invoke { args } => out.push(make_line(args)),
            Action::Remove { files, .. } => {
                for &f in files {
                    out.push(format!("remove {}", ws.display(f)));
                }
            }
            Action::Move { paths, to } => {
                for p in paths {
                    out.push(format!("move {} to {}", p, to));
                }
            }
            Action::Rename { from, to } => out.push(format!("rename({}, {})", from, to)),
            Action::MakeDir { path } => out.push(format!("makedir {}", path)),
            Action::MakeFile { path, content } => {
                out.push(format!("makefile({}, {})", path, content))
            }
            Action::Print { msg } => out.push(format!("print({})", msg)),
            Action::Hidden(_) => {}
        }
    }

    /// Stable string describing the action's meaning. Hidden and Fun
    /// actions contribute nothing.
    pub fn signature(&self, ws: &Workspace) -> String {
        match self {
            Action::Null | Action::Fun(_) | Action::Hidden(_) => String::new(),
            Action::Shell { line, .. } => line.clone(),
            Action::Group(actions) => actions
                .iter()
                .map(|a| a.signature(ws))
                .collect::<Vec<_>>()
                .join("\n"),
            Action::Grep { re, inner, .. } => {
                format!("{} | grep {}", inner.signature(ws), re.as_str())
            }
            Action::Invoke { args } => make_line(args),
            Action::Remove { files, .. } => files
                .iter()
                .map(|&f| format!("remove {}", ws.node(f).path))
                .collect::<Vec<_>>()
                .join("\n"),
            Action::Move { paths, to } => paths
                .iter()
                .map(|p| format!("move {} to {}", p, to))
                .collect::<Vec<_>>()
                .join("\n"),
            Action::Rename { from, to } => format!("rename({}, {})", from, to),
            Action::MakeDir { path } => format!("makedir({})", path),
            Action::MakeFile { path, content } => format!("makefile({}, {})", path, content),
            Action::Print { msg } => format!("print({})", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_line_flattens_and_drops_empty() {
        let args = vec![
            Value::from("cc"),
            Value::from(""),
            Value::List(vec!["-g".into(), Value::List(vec!["-O2".into()])]),
            Value::from("-o"),
            Value::Path(Fpath::new("a.o")),
        ];
        assert_eq!(make_line(&args), "cc -g -O2 -o a.o");
    }

    #[test]
    fn test_escape_shell_specials() {
        assert_eq!(escape("a b"), "a\\ b");
        assert_eq!(escape("$(x)"), "\\$\\(x\\)");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_shell_at_prefix_is_quiet() {
        match Action::shell("@echo hi") {
            Action::Shell { line, quiet, .. } => {
                assert_eq!(line, "echo hi");
                assert!(quiet);
            }
            _ => panic!("expected shell action"),
        }
    }

    #[test]
    fn test_seq_collapses() {
        assert!(matches!(Action::seq(vec![]), Action::Null));
        assert!(matches!(
            Action::seq(vec![Action::shell("true")]),
            Action::Shell { .. }
        ));
        assert!(matches!(
            Action::seq(vec![Action::shell("true"), Action::shell("false")]),
            Action::Group(_)
        ));
    }

    #[test]
    fn test_invoke_success_and_failure() {
        let mut ctx = Context::new();
        ctx.quiet = true;
        assert!(invoke("true", &mut ctx, false, false).is_ok());
        let err = invoke("exit 3", &mut ctx, false, false).unwrap_err();
        assert!(matches!(err, BuildError::ActionFailed(_)));
    }

    #[test]
    fn test_invoke_multiplexes_both_streams() {
        // both streams produce output; the call must not deadlock
        let mut ctx = Context::new();
        ctx.quiet = true;
        ctx.out = Sink::Null;
        ctx.err = Sink::Null;
        assert!(
            invoke(
                "for i in 1 2 3; do echo out$i; echo err$i >&2; done",
                &mut ctx,
                false,
                false
            )
            .is_ok()
        );
    }

    #[test]
    fn test_capture_collects_stdout() {
        let out = capture("echo hello; echo world").unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn test_grep_filters_sub_action_output() {
        let ws = Workspace::for_tests();
        let buf = Rc::new(std::cell::RefCell::new(String::new()));
        let mut ctx = Context::new();
        ctx.quiet = true;
        ctx.out = Sink::Buffer(buf.clone());
        let inner = Action::shell("@echo keep me; echo drop this");
        let act = Action::grep("keep", inner, true, false).unwrap();
        act.execute(&ws, &mut ctx).unwrap();
        assert_eq!(buf.borrow().as_str(), "keep me ");
        // the original sink is restored afterwards
        assert!(matches!(ctx.out, Sink::Buffer(_)));
    }

    #[test]
    fn test_group_signature_newline_joined() {
        let ws = Workspace::for_tests();
        let g = Action::Group(vec![Action::shell("a b"), Action::shell("c")]);
        assert_eq!(g.signature(&ws), "a b\nc");
    }

    #[test]
    fn test_hidden_and_fun_have_empty_signature() {
        let ws = Workspace::for_tests();
        assert_eq!(Action::hidden(Action::shell("x")).signature(&ws), "");
        let f = Action::Fun(FunAction::new(|_, _| Ok(())));
        assert_eq!(f.signature(&ws), "");
    }
}
