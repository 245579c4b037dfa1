//! Low-level filesystem operations shared by actions and services.

use walkdir::WalkDir;

use crate::error::{BuildError, Result};
use crate::filter::Filter;
use crate::path::Fpath;

/// Build a directory chain if it does not exist yet.
pub fn makedir(path: &Fpath) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path.as_std())
        .map_err(|e| BuildError::action(format!("cannot create '{}': {}", path, e)))
}

/// Copy a file, or recursively copy a directory, into `to`. The filter
/// selects which files are kept; a refused directory prunes its whole
/// subtree.
pub fn copy(from: &Fpath, to: &Fpath, filter: &Filter) -> Result<()> {
    makedir(to)?;
    if !from.is_dir() {
        std::fs::copy(from.as_std(), to.join(from.basename()).as_std())
            .map_err(|e| BuildError::action(format!("cannot copy '{}': {}", from, e)))?;
        return Ok(());
    }

    let anchor = from.parent();
    for entry in WalkDir::new(from.as_std())
        .into_iter()
        .filter_entry(|e| {
            // always enter the root; prune refused sub-directories
            e.depth() == 0 || !e.file_type().is_dir() || filter.accept(&Fpath::from(e.path()))
        })
    {
        let entry = entry.map_err(BuildError::action)?;
        let src = Fpath::from(entry.path());
        let rel = src
            .relative_to(&anchor)
            .unwrap_or_else(|| Fpath::new(src.basename()));
        let dst = to.join(rel.as_std());
        if entry.file_type().is_dir() {
            makedir(&dst)?;
        } else if filter.accept(&src) {
            std::fs::copy(src.as_std(), dst.as_std())
                .map_err(|e| BuildError::action(format!("cannot copy '{}': {}", src, e)))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_makedir_builds_chain() {
        let dir = tempfile::tempdir().unwrap();
        let p = Fpath::from(dir.path().join("a/b/c"));
        makedir(&p).unwrap();
        assert!(p.is_dir());
        // existing directory is fine
        makedir(&p).unwrap();
    }

    #[test]
    fn test_copy_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("x.txt");
        std::fs::write(&src, "content").unwrap();
        let dst = Fpath::from(dir.path().join("out"));
        copy(&Fpath::from(src.as_path()), &dst, &Filter::Yes).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out/x.txt")).unwrap(),
            "content"
        );
    }

    #[test]
    fn test_copy_tree_with_filter() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("keep.txt"), "k").unwrap();
        std::fs::write(root.join("drop.bak"), "d").unwrap();
        std::fs::write(root.join("sub/also.txt"), "a").unwrap();

        let dst = Fpath::from(dir.path().join("out"));
        let filter = Filter::not(Filter::from("*.bak"));
        copy(&Fpath::from(root.as_path()), &dst, &filter).unwrap();

        assert!(dir.path().join("out/data/keep.txt").exists());
        assert!(dir.path().join("out/data/sub/also.txt").exists());
        assert!(!dir.path().join("out/data/drop.bak").exists());
    }
}
