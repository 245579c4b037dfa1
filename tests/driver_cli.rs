//! Driver-level scenarios: flags, exit codes, and default goals.

mod common;

use common::*;
use mason::driver::{Cli, run};
use mason::{Action, Result, Value, Workspace};
use tempfile::TempDir;

fn register_hello(ws: &mut Workspace) -> Result<()> {
    object_gen(ws, "");
    let top = ws.topdir.clone();
    let objs = ws.resolve_chain(&top, ".o", "hello.c")?;
    ws.lists.all.extend(objs.iter().copied());
    ws.lists.clean.extend(objs.iter().copied());
    Ok(())
}

fn cli(args: &[&str]) -> Cli {
    let mut c = Cli {
        quiet: true,
        ..Cli::default()
    };
    for a in args {
        match *a {
            "-n" => c.dry_run = true,
            "-q" => c.question = true,
            "-B" => c.always_make = true,
            "-l" => c.list = true,
            "-t" => c.time = true,
            other => c.free.push(other.to_string()),
        }
    }
    c
}

#[test]
fn test_build_then_up_to_date() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hello.c"), "int main;").unwrap();

    let mut ws = workspace(dir.path());
    assert_eq!(run(&mut ws, cli(&[]), register_hello), 0);
    assert!(dir.path().join("hello.o").exists());
    // signature store persisted under the state directory
    assert!(dir.path().join(".mason/signs").exists());

    // second invocation: still exit 0, nothing pending in question mode
    let mut ws2 = workspace(dir.path());
    assert_eq!(run(&mut ws2, cli(&["-q", "hello.o"]), register_hello), 0);
}

#[test]
fn test_question_mode_exit_codes() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hello.c"), "int main;").unwrap();

    let mut ws = workspace(dir.path());
    assert_eq!(run(&mut ws, cli(&["hello.o"]), register_hello), 0);

    touch_newer(&dir.path().join("hello.c"), &dir.path().join("hello.o"));
    let mut ws2 = workspace(dir.path());
    assert_eq!(run(&mut ws2, cli(&["-q", "hello.o"]), register_hello), 1);
}

#[test]
fn test_dry_run_builds_nothing() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hello.c"), "int main;").unwrap();

    let mut ws = workspace(dir.path());
    assert_eq!(run(&mut ws, cli(&["-n", "hello.o"]), register_hello), 0);
    assert!(!dir.path().join("hello.o").exists());
    assert!(
        !dir.path().join(".mason/signs").exists(),
        "dry run must not touch the signature store"
    );
}

#[test]
fn test_always_make_reruns_fresh_targets() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hello.c"), "int main;").unwrap();

    // count executions through a side-effect log
    fn register_counting(ws: &mut Workspace) -> Result<()> {
        ws.gen_command(".o", ".c", |ws, ress, deps| {
            let log = ws.topdir.join("runs.log");
            vec![
                Value::from("cp"),
                Value::Path(ws.actual(deps[0])),
                Value::Path(ws.actual(ress[0])),
                Value::from("&& echo run >>"),
                Value::Path(log),
            ]
        });
        let top = ws.topdir.clone();
        ws.resolve_chain(&top, ".o", "hello.c")?;
        Ok(())
    }

    let mut ws = workspace(dir.path());
    assert_eq!(run(&mut ws, cli(&["hello.o"]), register_counting), 0);
    let mut ws2 = workspace(dir.path());
    assert_eq!(run(&mut ws2, cli(&["hello.o"]), register_counting), 0);
    let runs = std::fs::read_to_string(dir.path().join("runs.log")).unwrap();
    assert_eq!(runs.lines().count(), 1, "fresh target must not rerun");

    let mut ws3 = workspace(dir.path());
    assert_eq!(run(&mut ws3, cli(&["-B", "hello.o"]), register_counting), 0);
    let runs = std::fs::read_to_string(dir.path().join("runs.log")).unwrap();
    assert_eq!(runs.lines().count(), 2, "always-make reruns the target");
}

#[test]
fn test_default_goals_and_clean() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hello.c"), "int main;").unwrap();

    // plain invocation defaults to the all goal
    let mut ws = workspace(dir.path());
    assert_eq!(run(&mut ws, cli(&[]), register_hello), 0);
    assert!(dir.path().join("hello.o").exists());

    // clean removes what the script registered
    let mut ws2 = workspace(dir.path());
    assert_eq!(run(&mut ws2, cli(&["clean"]), register_hello), 0);
    assert!(!dir.path().join("hello.o").exists());
}

#[test]
fn test_list_and_print_db_exit_zero() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hello.c"), "int main;").unwrap();

    let mut ws = workspace(dir.path());
    assert_eq!(run(&mut ws, cli(&["-l"]), register_hello), 0);

    let mut ws2 = workspace(dir.path());
    let mut c = cli(&[]);
    c.print_data_base = true;
    assert_eq!(run(&mut ws2, c, register_hello), 0);
}

#[test]
fn test_failing_action_exits_one() {
    let dir = TempDir::new().unwrap();
    let mut ws = workspace(dir.path());
    let code = run(&mut ws, cli(&["broken"]), |ws| {
        ws.phony("broken", mason::NO_FILES, Action::shell("@exit 4"))?;
        Ok(())
    });
    assert_eq!(code, 1);
}

#[test]
fn test_missing_source_reported_at_traversal() {
    let dir = TempDir::new().unwrap();
    let mut ws = workspace(dir.path());
    let code = run(&mut ws, cli(&["prog"]), |ws| {
        ws.rule(["prog"], ["missing.c"], Action::shell("cc"))?;
        Ok(())
    });
    assert_eq!(code, 1);
}
