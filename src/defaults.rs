//! Default goals.
//!
//! Scripts feed the `ALL`/`CLEAN`/`DISTCLEAN` lists; a post-initialization
//! step installs the matching goals when the script did not define its own:
//!   - `all` -- build everything registered in the all-list,
//!   - `clean` -- remove produced files,
//!   - `distclean` -- `clean` plus the generated configuration,
//!   - `config` -- resolve the configuration probes.

use crate::action::Action;
use crate::error::Result;
use crate::file::FileId;
use crate::output::Context;
use crate::recipe::NO_FILES;
use crate::workspace::Workspace;

/// Files feeding the default goals.
#[derive(Default)]
pub struct StdLists {
    /// Built by the `all` goal.
    pub all: Vec<FileId>,
    /// Removed by the `clean` goal.
    pub clean: Vec<FileId>,
    /// Removed by the `distclean` goal, on top of `clean`.
    pub distclean: Vec<FileId>,
    /// Installation targets registered by install-style rules.
    pub install: Vec<FileId>,
}

fn has_local_file(ws: &Workspace, name: &str) -> bool {
    let p = ws.cur_dir().join(name).norm();
    ws.find_exact(p.as_str()).is_some()
}

/// Install the default goals; meant to be queued with
/// [`Workspace::post_init`] so scripts can define their own versions first.
pub fn install_default_goals(ws: &mut Workspace, _ctx: &mut Context) -> Result<()> {
    if !has_local_file(ws, "all") {
        let deps = ws.lists.all.clone();
        let g = ws.goal("all", deps, Action::Null)?;
        ws.describe(g, "build all");
    }

    if !has_local_file(ws, "clean") {
        let files = ws.lists.clean.clone();
        let g = ws.goal(
            "clean",
            NO_FILES,
            Action::Remove {
                files,
                ignore_error: true,
            },
        )?;
        ws.describe(g, "remove produced files");
    }

    if !has_local_file(ws, "distclean") {
        let mut files = ws.lists.distclean.clone();
        files.push(ws.file("config.toml"));
        let g = ws.goal(
            "distclean",
            ["clean"],
            Action::Remove {
                files,
                ignore_error: true,
            },
        )?;
        ws.describe(g, "remove produced files and configuration files");
    }

    if !has_local_file(ws, "config") {
        let g = ws.goal("config", NO_FILES, Action::Null)?;
        ws.describe(g, "build configuration");
    }

    Ok(())
}
