//! The command-line driver.
//!
//! A build program registers its rules against a [`Workspace`] and hands
//! control to [`build`]. The driver parses the command line, loads the
//! configuration and the signature store, runs the queued
//! post-initializations, resolves the requested goals, and dispatches to
//! the selected builder.
//!
//! Exit codes: 0 when the build succeeds or everything is up to date, 1 on
//! a build failure (or pending work in question mode), 2 on user
//! interrupt.

use std::process::ExitCode;

use clap::Parser;

use crate::action::install_interrupt_handler;
use crate::build::{Builder, Mode};
use crate::config;
use crate::defaults;
use crate::error::{BuildError, Result};
use crate::file::FileId;
use crate::lock::acquire_build_lock;
use crate::output::Context;
use crate::services;
use crate::workspace::Workspace;

#[derive(Parser, Debug, Default)]
#[command(
    name = "mason",
    version,
    about = "Declarative, signature-aware build engine"
)]
pub struct Cli {
    /// Goals to build, or KEY=VALUE assignments injected into the root
    /// environment
    #[arg(value_name = "goal")]
    pub free: Vec<String>,

    /// Display the executed commands
    #[arg(short, long)]
    pub verbose: bool,

    /// Display available goals
    #[arg(short, long)]
    pub list: bool,

    /// Print the recipe database
    #[arg(short = 'p', long)]
    pub print_data_base: bool,

    /// Display the commands but do not execute them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Test whether something has to be updated (result in return code)
    #[arg(short, long)]
    pub question: bool,

    /// Rebuild all without checking for updates
    #[arg(short = 'B', long)]
    pub always_make: bool,

    /// Work in quiet mode
    #[arg(short = 's', long)]
    pub quiet: bool,

    /// Display processing time
    #[arg(short, long)]
    pub time: bool,

    /// Copy the build tool into the project tree
    #[arg(short, long)]
    pub embed: bool,
}

/// Entry point for build programs: parse the command line, run the
/// registration closure against a workspace rooted at the working
/// directory, then drive the requested operation.
pub fn build<F>(register: F) -> ExitCode
where
    F: FnOnce(&mut Workspace) -> Result<()>,
{
    let cli = Cli::parse();
    let mut ws = match Workspace::new() {
        Ok(ws) => ws,
        Err(e) => {
            Context::new().print_error(&format!("{:#}", e));
            return ExitCode::from(1);
        }
    };
    ExitCode::from(run(&mut ws, cli, register) as u8)
}

/// Driver body, separated from process concerns for testability.
pub fn run<F>(ws: &mut Workspace, cli: Cli, register: F) -> i32
where
    F: FnOnce(&mut Workspace) -> Result<()>,
{
    install_interrupt_handler();

    let mut ctx = Context::new();
    if cli.verbose || cli.dry_run {
        ctx.command_ena = true;
    }
    if cli.quiet {
        ctx.quiet = true;
        ctx.complete_quiet = true;
    }

    // free arguments: KEY=VALUE assignments go to the root environment,
    // everything else is a goal
    let mut todo: Vec<String> = Vec::new();
    let mut do_config = false;
    for arg in &cli.free {
        match arg.split_once('=') {
            Some((key, val)) => {
                let env = ws.builtin_env;
                ws.env_set(env, key, val.to_string());
            }
            None => {
                if arg == "config" {
                    do_config = true;
                }
                todo.push(arg.clone());
            }
        }
    }

    config::load(ws, &mut ctx, do_config);
    set_builtin_vars(ws);

    // script evaluation; script errors never reach the builder
    if let Err(e) = register(ws) {
        ctx.print_error(&e.to_string());
        return 1;
    }
    ws.post_init(defaults::install_default_goals);
    if let Err(e) = ws.run_post_inits(&mut ctx) {
        ctx.print_error(&e.to_string());
        return 1;
    }

    if cli.embed {
        return match services::embed(ws, &mut ctx) {
            Ok(()) => 0,
            Err(e) => {
                ctx.print_error(&e.to_string());
                1
            }
        };
    }
    if do_config {
        return match config::make(ws, &mut ctx) {
            Ok(()) => 0,
            Err(e) => {
                ctx.print_error(&e.to_string());
                1
            }
        };
    }
    if cli.list {
        services::list_goals(ws, &mut ctx);
        return 0;
    }
    if cli.print_data_base {
        let mut out = std::io::stdout();
        return match services::print_db(ws, &mut out) {
            Ok(()) => 0,
            Err(e) => {
                ctx.print_error(&e.to_string());
                1
            }
        };
    }

    make_work(ws, &mut ctx, &cli, todo)
}

/// Predefined variables of the root environment.
fn set_builtin_vars(ws: &mut Workspace) {
    let env = ws.builtin_env;
    let today = chrono::Local::now().date_naive().to_string();
    ws.env_set(env, "TODAY", today);
    ws.env_set(env, "SYSTEM", std::env::consts::OS);
    ws.env_set(env, "MACHINE", std::env::consts::ARCH);
    ws.env_set(
        env,
        "PLATFORM",
        format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
    );
}

fn make_work(ws: &mut Workspace, ctx: &mut Context, cli: &Cli, todo: Vec<String>) -> i32 {
    let mode = if cli.dry_run {
        Mode::DryRun
    } else if cli.question {
        Mode::Question
    } else {
        Mode::Sequential
    };

    // a real build takes the project lock; read-only modes do not
    let _lock = if mode == Mode::Sequential {
        match acquire_build_lock(&ws.state_dir()) {
            Ok(l) => Some(l),
            Err(e) => {
                ctx.print_error(&format!("{:#}", e));
                return 1;
            }
        }
    } else {
        None
    };

    ws.load_signs(ctx);

    let goals = if todo.is_empty() {
        vec!["all".to_string()]
    } else {
        todo
    };

    let mut targets: Vec<FileId> = Vec::new();
    for goal in &goals {
        let fid = match ws.goal_file(goal) {
            Ok(f) => f,
            Err(e) => {
                ctx.print_error(&e.to_string());
                return 1;
            }
        };
        let collected = if cli.always_make {
            ws.collect_all(fid, &mut targets)
        } else {
            ws.collect_updates(fid, &mut targets)
        };
        if let Err(e) = collected {
            ctx.print_error(&e.to_string());
            return 1;
        }
    }

    let mut builder = Builder::new(mode);
    builder.show_time = cli.time;
    match builder.build(ws, ctx, &targets) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(BuildError::Interrupted) => {
            ctx.print_error("action interrupted by user!");
            2
        }
        Err(e) => {
            ctx.print_error(&e.to_string());
            1
        }
    }
}
