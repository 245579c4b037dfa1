//! Persisted action signatures.
//!
//! The signature of a recipe is the trace of the actions needed to realize
//! it; the store maps each target's canonical path to a digest of that
//! trace. When the digest recorded by the last successful build differs
//! from the current one, the target is rebuilt even if its timestamps are
//! fine, which is how configuration changes propagate.
//!
//! The on-disk form is a self-identifying envelope (magic + version over a
//! sorted map) written atomically through a sibling temporary file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::file::FileId;
use crate::output::Context;
use crate::path::Fpath;
use crate::workspace::Workspace;

const MAGIC: &str = "mason-signs";
const VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct OnDisk {
    magic: String,
    version: u32,
    signs: BTreeMap<String, String>,
}

/// Digest of an action signature text.
pub fn digest(text: &str) -> String {
    let mut h = Sha256::new();
    h.update(text.as_bytes());
    hex::encode(h.finalize())
}

#[derive(Default)]
pub struct SignStore {
    map: BTreeMap<String, String>,
    dirty: bool,
}

impl SignStore {
    pub fn new() -> Self {
        SignStore::default()
    }

    /// Read the store. A missing file yields an empty store marked dirty; a
    /// corrupt one additionally warns, once, through the context.
    pub fn load(path: &Fpath, ctx: &mut Context) -> SignStore {
        if !path.exists() {
            return SignStore {
                map: BTreeMap::new(),
                dirty: true,
            };
        }
        let parsed = std::fs::read(path.as_std())
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<OnDisk>(&bytes).map_err(|e| e.to_string())
            })
            .and_then(|d| {
                if d.magic != MAGIC || d.version != VERSION {
                    Err("unrecognized signature file".to_string())
                } else {
                    Ok(d.signs)
                }
            });
        match parsed {
            Ok(map) => SignStore { map, dirty: false },
            Err(e) => {
                ctx.print_warning(&format!(
                    "signature file cannot be read ({}). This may cause some unexpected recompilations.",
                    e
                ));
                SignStore {
                    map: BTreeMap::new(),
                    dirty: true,
                }
            }
        }
    }

    /// True when the stored digest for `key` matches the signature text.
    pub fn matches(&self, key: &str, text: &str) -> bool {
        self.map.get(key).map(|d| *d == digest(text)).unwrap_or(false)
    }

    /// Record the signature for `key`; only an actual change marks the
    /// store dirty.
    pub fn record(&mut self, key: &str, text: &str) {
        let d = digest(text);
        if self.map.get(key) != Some(&d) {
            self.map.insert(key.to_string(), d);
            self.dirty = true;
        }
    }

    /// Write the store when dirty, atomically via a sibling temporary file.
    pub fn save(&mut self, path: &Fpath, ctx: &mut Context) {
        if !self.dirty {
            return;
        }
        let result = (|| -> std::result::Result<(), String> {
            let parent = path.parent();
            if !parent.is_empty() {
                std::fs::create_dir_all(parent.as_std()).map_err(|e| e.to_string())?;
            }
            let doc = OnDisk {
                magic: MAGIC.to_string(),
                version: VERSION,
                signs: self.map.clone(),
            };
            let bytes = serde_json::to_vec(&doc).map_err(|e| e.to_string())?;
            let tmp = tempfile::NamedTempFile::new_in(parent.as_std())
                .map_err(|e| e.to_string())?;
            std::fs::write(tmp.path(), &bytes).map_err(|e| e.to_string())?;
            tmp.persist(path.as_std()).map_err(|e| e.to_string())?;
            Ok(())
        })();
        match result {
            Ok(()) => self.dirty = false,
            Err(e) => ctx.print_warning(&format!("cannot save signature file: {}", e)),
        }
    }
}

impl Workspace {
    fn signs_path(&self) -> Fpath {
        self.state_dir().join("signs")
    }

    pub fn load_signs(&mut self, ctx: &mut Context) {
        self.signs = SignStore::load(&self.signs_path(), ctx);
    }

    pub fn save_signs(&mut self, ctx: &mut Context) {
        let path = self.signs_path();
        let mut signs = std::mem::take(&mut self.signs);
        signs.save(&path, ctx);
        self.signs = signs;
    }

    /// True when the file's stored signature matches its recipe's current
    /// action signature. Files without a recipe always match.
    pub fn sign_test(&mut self, fid: FileId) -> bool {
        let Some(rid) = self.node(fid).recipe else {
            return true;
        };
        let text = self.recipe_signature(rid);
        let key = self.node(fid).path.to_string();
        self.signs.matches(&key, &text)
    }

    /// Record the file's current action signature after a successful job.
    pub fn sign_record(&mut self, fid: FileId) {
        let Some(rid) = self.node(fid).recipe else {
            return;
        };
        let text = self.recipe_signature(rid);
        let key = self.node(fid).path.to_string();
        self.signs.record(&key, &text);
    }
}
