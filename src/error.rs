//! Engine error taxonomy.
//!
//! Script misuse is reported before any build step; traversal errors
//! (missing inputs, unreachable extension chains) are reported while the
//! stale set is computed; action failures abort the running job after the
//! signatures of completed jobs have been flushed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    /// Misuse in a build script (duplicate goal, missing sub-directory, ...).
    #[error("{0}")]
    Script(String),

    /// A file with no recipe does not exist on disk.
    #[error("don't know how to build {0}")]
    MissingInput(String),

    /// No generator chain connects two extensions.
    #[error("don't know how to build '{to}' from '{from}'")]
    NoChain { from: String, to: String },

    /// Sub-process exit non-zero, or I/O error inside a primitive action.
    #[error("{0}")]
    ActionFailed(String),

    /// Corrupt or unreadable signature store. Non-fatal: the caller warns
    /// and proceeds with an empty store.
    #[error("signature store: {0}")]
    SignatureIo(String),

    /// User signal.
    #[error("action interrupted by user!")]
    Interrupted,
}

impl BuildError {
    /// Wrap an arbitrary action-time failure, keeping the original message.
    pub fn action(err: impl std::fmt::Display) -> Self {
        BuildError::ActionFailed(err.to_string())
    }

    pub fn script(msg: impl Into<String>) -> Self {
        BuildError::Script(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_chain_message() {
        let e = BuildError::NoChain {
            from: ".y".into(),
            to: ".o".into(),
        };
        assert_eq!(e.to_string(), "don't know how to build '.o' from '.y'");
    }

    #[test]
    fn test_missing_input_message() {
        let e = BuildError::MissingInput("src/main.c".into());
        assert_eq!(e.to_string(), "don't know how to build src/main.c");
    }
}
