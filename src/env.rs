//! Layered variable environments.
//!
//! Environments form a parent chain ending at the process environment:
//! file, script, config, builtin, then OS. Lookup walks the chain; `set`
//! writes to the addressed level; `append` prefers the closest level that
//! already defines the key and falls back to a local set.
//!
//! The chain lives in an arena owned by the [`crate::workspace::Workspace`];
//! levels are addressed by [`EnvId`] handles.

use std::collections::HashMap;

use crate::path::Fpath;
use crate::value::Value;

/// Stable handle to one environment level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(pub(crate) usize);

enum Level {
    /// Leaf level reading and writing the process environment.
    Os,
    /// Ordinary map level (builtin, config, script, and per-file layers).
    Map(HashMap<String, Value>),
}

struct EnvData {
    name: String,
    dir: Fpath,
    parent: Option<EnvId>,
    level: Level,
}

/// OS variables that are interpreted rather than returned as plain strings.
fn os_interpret(key: &str, raw: String) -> Value {
    match key {
        "HOME" => Value::Path(Fpath::new(raw)),
        _ => Value::Str(raw),
    }
}

pub struct Envs {
    slots: Vec<EnvData>,
}

impl Envs {
    /// Create the arena with the single OS leaf level.
    pub fn new(topdir: &Fpath) -> (Envs, EnvId) {
        let os = EnvData {
            name: "os".into(),
            dir: topdir.clone(),
            parent: None,
            level: Level::Os,
        };
        (Envs { slots: vec![os] }, EnvId(0))
    }

    /// Add a map level under `parent`.
    pub fn push_level(&mut self, name: impl Into<String>, dir: Fpath, parent: EnvId) -> EnvId {
        let id = EnvId(self.slots.len());
        self.slots.push(EnvData {
            name: name.into(),
            dir,
            parent: Some(parent),
            level: Level::Map(HashMap::new()),
        });
        id
    }

    pub fn name(&self, id: EnvId) -> &str {
        &self.slots[id.0].name
    }

    /// Directory this level is scoped to (the script's directory).
    pub fn dir(&self, id: EnvId) -> &Fpath {
        &self.slots[id.0].dir
    }

    pub fn parent(&self, id: EnvId) -> Option<EnvId> {
        self.slots[id.0].parent
    }

    /// Chain lookup starting at `id`.
    pub fn get(&self, id: EnvId, key: &str) -> Option<Value> {
        let mut cur = Some(id);
        while let Some(e) = cur {
            if let Some(v) = self.get_here(e, key) {
                return Some(v);
            }
            cur = self.slots[e.0].parent;
        }
        None
    }

    /// Lookup confined to one level.
    pub fn get_here(&self, id: EnvId, key: &str) -> Option<Value> {
        match &self.slots[id.0].level {
            Level::Os => std::env::var(key).ok().map(|v| os_interpret(key, v)),
            Level::Map(map) => map.get(key).cloned(),
        }
    }

    /// Write to the addressed level.
    pub fn set(&mut self, id: EnvId, key: impl Into<String>, val: impl Into<Value>) {
        let key = key.into();
        let val = val.into();
        match &mut self.slots[id.0].level {
            Level::Os => {
                // Safety: the engine is single-threaded during script
                // evaluation and job post-completion, the only times
                // environments are mutated.
                unsafe { std::env::set_var(&key, val.to_string()) }
            }
            Level::Map(map) => {
                map.insert(key, val);
            }
        }
    }

    pub fn is_def(&self, id: EnvId, key: &str) -> bool {
        self.get(id, key).is_some()
    }

    fn is_def_here(&self, id: EnvId, key: &str) -> bool {
        match &self.slots[id.0].level {
            Level::Os => std::env::var(key).is_ok(),
            Level::Map(map) => map.contains_key(key),
        }
    }

    /// The key-value pairs defined directly on a map level (the OS leaf
    /// reports none).
    pub fn local_entries(&self, id: EnvId) -> Vec<(String, Value)> {
        match &self.slots[id.0].level {
            Level::Os => Vec::new(),
            Level::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    /// Append `val` to `key` in the innermost level that already defines it;
    /// set locally when no level does.
    pub fn append(&mut self, id: EnvId, key: &str, val: impl Into<Value>) {
        let val = val.into();
        let mut cur = Some(id);
        while let Some(e) = cur {
            if self.is_def_here(e, key) {
                let old = self.get_here(e, key).unwrap_or(Value::Str(String::new()));
                self.set(e, key, old.concat(val));
                return;
            }
            cur = self.slots[e.0].parent;
        }
        self.set(id, key, val);
    }
}
