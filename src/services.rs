//! Command-line services: goal listing, database printing, embedding.

use std::io::Write;

use crate::error::{BuildError, Result};
use crate::file::FileId;
use crate::output::Context;
use crate::recipe::RecipeId;
use crate::workspace::Workspace;

/// Print the user-visible goals with their descriptions, sorted and
/// aligned.
pub fn list_goals(ws: &Workspace, ctx: &mut Context) {
    let mut goals: Vec<(String, FileId)> = ws
        .files
        .iter()
        .filter(|(_, n)| n.is_goal && !n.is_hidden)
        .map(|(id, _)| (ws.display(id), id))
        .collect();
    if goals.is_empty() {
        return;
    }
    goals.sort();
    let width = goals.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, id) in goals {
        match ws.file_var_here(id, "DESCRIPTION") {
            Some(desc) => {
                let padded = format!("{:width$} ", name, width = width);
                ctx.print_def(&padded, &desc.to_string());
            }
            None => ctx.print_info(&name),
        }
    }
}

/// Print every concrete recipe (`results: deps` plus tab-indented
/// commands), then the generic rules of the extension database.
pub fn print_db(ws: &mut Workspace, out: &mut dyn Write) -> Result<()> {
    let mut write = |s: String| -> Result<()> {
        out.write_all(s.as_bytes()).map_err(BuildError::action)
    };

    // concrete rules, one entry per recipe
    let mut seen: Vec<RecipeId> = Vec::new();
    let with_recipes: Vec<(FileId, RecipeId)> = ws
        .files
        .iter()
        .filter_map(|(id, n)| n.recipe.map(|r| (id, r)))
        .collect();
    for (_, rid) in with_recipes {
        if seen.contains(&rid) {
            continue;
        }
        seen.push(rid);
        let (ress, deps) = {
            let r = ws.recipes.get(rid);
            (r.ress.clone(), r.deps.clone())
        };
        let ress: Vec<String> = ress.iter().map(|&f| ws.display(f)).collect();
        let deps: Vec<String> = deps.iter().map(|&f| ws.display(f)).collect();
        write(format!("{}: {}\n", ress.join(" "), deps.join(" ")))?;
        for cmd in ws.recipe_commands(rid) {
            write(format!("\t{}\n", cmd))?;
        }
        write("\n".to_string())?;
    }

    // generic rules; inherited reachability entries are annotated with the
    // final extension they lead to
    for (ext, target, gid) in ws.exts.entries() {
        let res = ws.exts.r#gen(gid).res.clone();
        if res == target {
            write(format!("*{}: *{}\n", res, ext))?;
        } else {
            write(format!("[{}] *{}: *{}\n", target, res, ext))?;
        }
        for cmd in ws.generator_commands(gid) {
            write(format!("\t{}\n", cmd))?;
        }
        write("\n".to_string())?;
    }
    Ok(())
}

/// Copy the running build tool under the project's state directory so the
/// tree can be rebuilt without a system-wide installation.
pub fn embed(ws: &Workspace, ctx: &mut Context) -> Result<()> {
    let exe = std::env::current_exe()
        .map_err(|e| BuildError::action(format!("cannot locate the running tool: {}", e)))?;
    let name = exe
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "mason".to_string());
    let dir = ws.state_dir().join("bin");
    crate::fs_utils::makedir(&dir)?;
    let dest = dir.join(&name);
    std::fs::copy(&exe, dest.as_std())
        .map_err(|e| BuildError::action(format!("cannot embed '{}': {}", dest, e)))?;
    ctx.print_info(&format!("embedded {} into {}", name, dir));
    Ok(())
}
