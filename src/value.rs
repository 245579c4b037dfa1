//! Variable values.
//!
//! Everything scripts store in environments or attach to file nodes is a
//! `Value`: a small tagged sum over the types build variables actually take.
//! Command lines are built from nested value lists and flattened with
//! [`crate::action::make_line`].

use std::fmt;

use crate::path::Fpath;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    List(Vec<Value>),
    Path(Fpath),
    Int(i64),
    Bool(bool),
}

impl Value {
    /// An empty value is dropped from command lines and is the identity for
    /// [`Value::concat`].
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Str(s) => s.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Path(p) => p.is_empty(),
            _ => false,
        }
    }

    /// Join two values the way `append` does: lists extend (one level),
    /// a list and a scalar upgrade to a list, two strings concatenate with
    /// a space.
    pub fn concat(self, other: Value) -> Value {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        match (self, other) {
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Value::List(a)
            }
            (Value::List(mut a), b) => {
                a.push(b);
                Value::List(a)
            }
            (a, Value::List(b)) => {
                let mut l = vec![a];
                l.extend(b);
                Value::List(l)
            }
            (a, b) => Value::Str(format!("{} {}", a, b)),
        }
    }

    /// View as a list: lists as-is, scalars as a singleton, empty values as
    /// the empty list.
    pub fn into_list(self) -> Vec<Value> {
        if self.is_empty() {
            return Vec::new();
        }
        match self {
            Value::List(l) => l,
            v => vec![v],
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<Fpath> {
        match self {
            Value::Path(p) => Some(p.clone()),
            Value::Str(s) => Some(Fpath::new(s.as_str())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Path(p) => write!(f, "{}", p),
            Value::Int(i) => write!(f, "{}", i),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(l) => {
                let mut first = true;
                for v in l {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", v)?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Fpath> for Value {
    fn from(p: Fpath) -> Self {
        Value::Path(p)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<Vec<String>> for Value {
    fn from(l: Vec<String>) -> Self {
        Value::List(l.into_iter().map(Value::Str).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        match o {
            Some(v) => v.into(),
            None => Value::Str(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_strings() {
        let v = Value::from("-g").concat(Value::from("-O2"));
        assert_eq!(v, Value::from("-g -O2"));
    }

    #[test]
    fn test_concat_empty_identity() {
        assert_eq!(Value::from("").concat(Value::from("x")), Value::from("x"));
        assert_eq!(Value::from("x").concat(Value::from("")), Value::from("x"));
    }

    #[test]
    fn test_concat_lists_extend_one_level() {
        let a = Value::List(vec!["a".into(), "b".into()]);
        let b = Value::List(vec!["c".into()]);
        assert_eq!(
            a.concat(b),
            Value::List(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn test_concat_scalar_upgrades_to_list() {
        let a = Value::List(vec!["a".into()]);
        assert_eq!(
            a.concat("b".into()),
            Value::List(vec!["a".into(), "b".into()])
        );
        let b = Value::List(vec!["b".into()]);
        assert_eq!(
            Value::from("a").concat(b),
            Value::List(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_display_list_space_joined() {
        let v = Value::List(vec!["-lm".into(), Value::Path(Fpath::new("lib/x.a"))]);
        assert_eq!(v.to_string(), "-lm lib/x.a");
    }

    #[test]
    fn test_into_list() {
        assert_eq!(Value::from("x").into_list(), vec![Value::from("x")]);
        assert!(Value::from("").into_list().is_empty());
    }
}
