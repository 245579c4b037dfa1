//! Path predicates.
//!
//! Filters decide which paths an install-style copy keeps. They compose
//! with `not`, `all`, and `any`; the loose factory mirrors what scripts
//! pass: nothing, a shell glob, an explicit list, a regular expression, or
//! a function.

use std::fmt;
use std::rc::Rc;

use crate::error::{BuildError, Result};
use crate::path::Fpath;

#[derive(Clone)]
pub enum Filter {
    /// Accept everything.
    Yes,
    /// Refuse everything.
    No,
    /// Accept paths in the given list.
    Members(Vec<String>),
    /// Unix shell-glob match over the whole path.
    Glob(glob::Pattern),
    /// Regular-expression search over the whole path.
    Regex(regex::Regex),
    /// Arbitrary predicate.
    Fun(Rc<dyn Fn(&Fpath) -> bool>),
    Not(Box<Filter>),
    All(Vec<Filter>),
    Any(Vec<Filter>),
}

impl Filter {
    pub fn glob(pattern: &str) -> Result<Filter> {
        glob::Pattern::new(pattern)
            .map(Filter::Glob)
            .map_err(|e| BuildError::script(format!("bad glob pattern '{}': {}", pattern, e)))
    }

    pub fn regex(pattern: &str) -> Result<Filter> {
        regex::Regex::new(pattern)
            .map(Filter::Regex)
            .map_err(|e| BuildError::script(format!("bad filter pattern '{}': {}", pattern, e)))
    }

    pub fn members<I, S>(items: I) -> Filter
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Members(items.into_iter().map(Into::into).collect())
    }

    pub fn fun(f: impl Fn(&Fpath) -> bool + 'static) -> Filter {
        Filter::Fun(Rc::new(f))
    }

    pub fn not(f: Filter) -> Filter {
        Filter::Not(Box::new(f))
    }

    /// The loose factory: nothing accepts everything, unless the caller
    /// asked for the inverted default.
    pub fn of(arg: Option<Filter>, neg: bool) -> Filter {
        match arg {
            Some(f) => f,
            None if neg => Filter::No,
            None => Filter::Yes,
        }
    }

    pub fn accept(&self, path: &Fpath) -> bool {
        match self {
            Filter::Yes => true,
            Filter::No => false,
            Filter::Members(list) => list.iter().any(|i| i == path.as_str()),
            Filter::Glob(p) => p.matches(path.as_str()),
            Filter::Regex(re) => re.is_match(path.as_str()),
            Filter::Fun(f) => f(path),
            Filter::Not(f) => !f.accept(path),
            Filter::All(fs) => fs.iter().all(|f| f.accept(path)),
            Filter::Any(fs) => fs.iter().any(|f| f.accept(path)),
        }
    }
}

impl From<&str> for Filter {
    /// Bare strings are shell globs; an invalid pattern refuses everything.
    fn from(pattern: &str) -> Filter {
        Filter::glob(pattern).unwrap_or(Filter::No)
    }
}

impl From<Vec<String>> for Filter {
    fn from(list: Vec<String>) -> Filter {
        Filter::Members(list)
    }
}

impl From<regex::Regex> for Filter {
    fn from(re: regex::Regex) -> Filter {
        Filter::Regex(re)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Yes => write!(f, "true"),
            Filter::No => write!(f, "false"),
            Filter::Members(list) => write!(f, "one of [{}]", list.join(", ")),
            Filter::Glob(p) => write!(f, "{}", p.as_str()),
            Filter::Regex(re) => write!(f, "{}", re.as_str()),
            Filter::Fun(_) => write!(f, "fun"),
            Filter::Not(inner) => write!(f, "not {}", inner),
            Filter::All(fs) => {
                let parts: Vec<String> = fs.iter().map(|x| x.to_string()).collect();
                write!(f, "({})", parts.join(" and "))
            }
            Filter::Any(fs) => {
                let parts: Vec<String> = fs.iter().map(|x| x.to_string()).collect();
                write!(f, "({})", parts.join(" or "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_factory() {
        assert!(Filter::of(None, false).accept(&Fpath::new("x")));
        assert!(!Filter::of(None, true).accept(&Fpath::new("x")));
    }

    #[test]
    fn test_glob_filter() {
        let f = Filter::from("*.c");
        assert!(f.accept(&Fpath::new("main.c")));
        assert!(!f.accept(&Fpath::new("main.o")));
    }

    #[test]
    fn test_members_filter() {
        let f = Filter::members(["a.c", "b.c"]);
        assert!(f.accept(&Fpath::new("a.c")));
        assert!(!f.accept(&Fpath::new("c.c")));
    }

    #[test]
    fn test_regex_filter() {
        let f = Filter::regex(r"\.(c|h)$").unwrap();
        assert!(f.accept(&Fpath::new("x.h")));
        assert!(!f.accept(&Fpath::new("x.hh")));
    }

    #[test]
    fn test_compose_not_and_or() {
        let not_c = Filter::not(Filter::from("*.c"));
        assert!(not_c.accept(&Fpath::new("x.o")));
        assert!(!not_c.accept(&Fpath::new("x.c")));

        let both = Filter::All(vec![Filter::from("src/*"), Filter::not(Filter::from("*.bak"))]);
        assert!(both.accept(&Fpath::new("src/a")));
        assert!(!both.accept(&Fpath::new("src/a.bak")));

        let either = Filter::Any(vec![Filter::from("*.c"), Filter::from("*.h")]);
        assert!(either.accept(&Fpath::new("x.h")));
        assert!(!either.accept(&Fpath::new("x.o")));
    }

    #[test]
    fn test_fun_filter() {
        let f = Filter::fun(|p| p.basename().starts_with("keep"));
        assert!(f.accept(&Fpath::new("dir/keep-me")));
        assert!(!f.accept(&Fpath::new("dir/drop-me")));
    }

    #[test]
    fn test_display() {
        assert_eq!(Filter::Yes.to_string(), "true");
        assert_eq!(Filter::not(Filter::from("*.o")).to_string(), "not *.o");
        assert_eq!(
            Filter::members(["a", "b"]).to_string(),
            "one of [a, b]"
        );
    }
}
