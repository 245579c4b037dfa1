//! Declarative, signature-aware build engine.
//!
//! Build programs are ordinary Rust binaries linking this crate: they
//! register files, rules, and extension generators against a [`Workspace`]
//! and hand control to [`build`], which parses the command line, computes
//! the minimum set of stale targets, and runs their actions in dependency
//! order. A target is rebuilt when its file is missing or older than a
//! dependency, and also when the *signature* of the action that produces it
//! changed since the last run, so configuration changes propagate without
//! touching any timestamp.
//!
//! # Example build program
//!
//! ```no_run
//! use mason::{Action, Value, Workspace};
//!
//! fn main() -> std::process::ExitCode {
//!     mason::build(|ws: &mut Workspace| {
//!         // teach the engine to compile C objects
//!         ws.gen_command(".o", ".c", |ws, ress, deps| {
//!             vec![
//!                 Value::from("cc"),
//!                 ws.file_var(ress[0], "CFLAGS").into(),
//!                 Value::from("-o"),
//!                 Value::Path(ws.actual(ress[0])),
//!                 Value::from("-c"),
//!                 Value::Path(ws.actual(deps[0])),
//!             ]
//!         });
//!
//!         // synthesize main.o from main.c, link it, make it the default
//!         let dir = ws.topdir.clone();
//!         let objs = ws.resolve_chain(&dir, ".o", "main.c")?;
//!         let prog = ws.rule(["hello"], objs, Action::shell("cc -o hello main.o"))?;
//!         ws.lists.all.push(prog);
//!         Ok(())
//!     })
//! }
//! ```
//!
//! Running the produced binary then behaves like a build tool: `-n` shows
//! the plan, `-q` answers "is anything stale?", `-l` lists the goals, plain
//! invocation builds `all`.

pub mod action;
pub mod build;
pub mod config;
pub mod defaults;
pub mod driver;
pub mod env;
pub mod error;
pub mod ext;
pub mod file;
pub mod filter;
pub mod fs_utils;
pub mod lock;
pub mod output;
pub mod path;
pub mod recipe;
pub mod services;
pub mod sign;
pub mod value;
pub mod workspace;

pub use action::{Action, capture, make_line};
pub use build::{Builder, Mode};
pub use driver::{Cli, build, run};
pub use error::{BuildError, Result};
pub use file::FileId;
pub use filter::Filter;
pub use output::Context;
pub use path::Fpath;
pub use recipe::{FileArg, NO_FILES, RecipeId};
pub use value::Value;
pub use workspace::Workspace;
