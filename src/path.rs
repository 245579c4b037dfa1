//! Normalized filesystem paths.
//!
//! `Fpath` is the path value type used throughout the engine: an immutable
//! string-backed path with lexical normalization, combinators, and the
//! filesystem queries staleness decisions rely on. Equality is string
//! equality after normalization.

use std::fmt;
use std::path::{Component, Path as StdPath, PathBuf};
use std::time::SystemTime;

/// An engine path. Construct with [`Fpath::new`], normalize with
/// [`Fpath::norm`]; all paths interned in the file registry are normalized.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fpath {
    buf: PathBuf,
}

impl Fpath {
    pub fn new(s: impl Into<PathBuf>) -> Self {
        Fpath { buf: s.into() }
    }

    pub fn as_str(&self) -> &str {
        self.buf.to_str().unwrap_or("")
    }

    pub fn as_std(&self) -> &StdPath {
        &self.buf
    }

    pub fn is_absolute(&self) -> bool {
        self.buf.is_absolute()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.as_os_str().is_empty()
    }

    /// Join with a sub-component using the platform separator.
    pub fn join(&self, sub: impl AsRef<StdPath>) -> Fpath {
        Fpath {
            buf: self.buf.join(sub),
        }
    }

    /// String-append an extension (including its dot) to the full path.
    pub fn append_ext(&self, ext: &str) -> Fpath {
        let mut s = self.buf.clone().into_os_string();
        s.push(ext);
        Fpath { buf: s.into() }
    }

    /// Collapse `.`, `..`, and duplicate separators lexically.
    /// Normalization is idempotent.
    pub fn norm(&self) -> Fpath {
        let mut out = PathBuf::new();
        for comp in self.buf.components() {
            match comp {
                Component::CurDir => {}
                Component::ParentDir => {
                    // pop a normal component; keep ".." at the front of a
                    // relative path or when nothing is left to pop
                    let last = out.components().next_back();
                    let is_normal = matches!(last, Some(Component::Normal(_)));
                    let is_rooted =
                        matches!(last, Some(Component::RootDir) | Some(Component::Prefix(_)));
                    if is_normal {
                        out.pop();
                    } else if !is_rooted {
                        out.push("..");
                    }
                }
                other => out.push(other.as_os_str()),
            }
        }
        if out.as_os_str().is_empty() {
            out.push(".");
        }
        Fpath { buf: out }
    }

    /// Parent directory; empty path when there is none.
    pub fn parent(&self) -> Fpath {
        Fpath {
            buf: self.buf.parent().map(|p| p.to_path_buf()).unwrap_or_default(),
        }
    }

    /// Final component as a string.
    pub fn basename(&self) -> String {
        self.buf
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Extension including the leading dot, or the empty string.
    pub fn extension(&self) -> String {
        match self.buf.extension() {
            Some(e) => format!(".{}", e.to_string_lossy()),
            None => String::new(),
        }
    }

    /// Path without its extension.
    pub fn base(&self) -> Fpath {
        match self.buf.extension() {
            Some(_) => Fpath {
                buf: self.buf.with_extension(""),
            },
            None => self.clone(),
        }
    }

    /// Final component without its extension.
    pub fn stem(&self) -> String {
        self.buf
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Test whether `anchor` is a (lexical) prefix of this path.
    pub fn prefixed_by(&self, anchor: &Fpath) -> bool {
        self.buf.starts_with(&anchor.buf)
    }

    /// The relative form under `anchor`, if one exists.
    pub fn relative_to(&self, anchor: &Fpath) -> Option<Fpath> {
        self.buf
            .strip_prefix(&anchor.buf)
            .ok()
            .map(|p| {
                if p.as_os_str().is_empty() {
                    Fpath::new(".")
                } else {
                    Fpath::new(p)
                }
            })
    }

    pub fn exists(&self) -> bool {
        self.buf.exists()
    }

    pub fn is_dir(&self) -> bool {
        self.buf.is_dir()
    }

    pub fn can_read(&self) -> bool {
        std::fs::File::open(&self.buf).is_ok()
    }

    /// Last modification time; the epoch when the file does not exist
    /// (missing files are older than everything).
    pub fn mod_time(&self) -> SystemTime {
        std::fs::metadata(&self.buf)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

impl fmt::Display for Fpath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.buf.display())
    }
}

impl fmt::Debug for Fpath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.buf)
    }
}

impl From<&str> for Fpath {
    fn from(s: &str) -> Self {
        Fpath::new(s)
    }
}

impl From<String> for Fpath {
    fn from(s: String) -> Self {
        Fpath::new(s)
    }
}

impl From<&StdPath> for Fpath {
    fn from(p: &StdPath) -> Self {
        Fpath::new(p)
    }
}

impl From<PathBuf> for Fpath {
    fn from(p: PathBuf) -> Self {
        Fpath::new(p)
    }
}
