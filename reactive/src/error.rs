//! Error types shared by every pathweave crate.
//!
//! Nothing in the engine retries. Every variant is fatal for the operation that
//! produced it and is propagated to the caller of `enqueue_ref`, `read`, `write`
//! or `render`.

use thiserror::Error;

/// Result type alias for pathweave operations.
pub type PathweaveResult<T> = Result<T, PathweaveError>;

/// Errors raised by path resolution, list identities and the update engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathweaveError {
    // Structural: the binding set and the state class disagree.
    /// A path was enqueued or rendered that the path manager never registered.
    #[error("path is not registered: {pattern}")]
    UnknownPath { pattern: String },

    /// A nested path had no parent info to resolve against.
    #[error("parent path info is missing: {pattern}")]
    MissingParentInfo { pattern: String },

    /// A write walked into a missing or non-container intermediate value.
    #[error("no container value to write into: {pattern}")]
    MissingParentValue { pattern: String },

    /// `invoke` named a member the state class does not define.
    #[error("state class has no member named {name}")]
    UnknownMember { name: String },

    // Identity: list indexes that no longer resolve.
    /// The list index behind a ref was released by a list diff.
    #[error("list index has been released: {pattern}")]
    ListIndexReleased { pattern: String },

    /// A positional identity lookup fell outside the identity chain or list.
    #[error("list index position {position} is out of range: {pattern}")]
    IdentityOutOfRange { pattern: String, position: isize },

    /// A list operation was applied to a value that is not an array.
    #[error("value is not a list: {pattern}")]
    NotAList { pattern: String },

    // Contract violations.
    /// `set` was called through a read-only state view.
    #[error("state is read-only, cannot write {pattern}")]
    ReadonlyWrite { pattern: String },

    /// Computed properties recursed deeper than the resolution stack allows.
    #[error("resolution stack overflow (depth {depth}) while reading {pattern}")]
    StackOverflow { pattern: String, depth: usize },

    /// A wildcard path was accessed with no loop context to pick the element.
    #[error("no list index in context for wildcard path: {pattern}")]
    NoContextualIndex { pattern: String },

    /// A write targeted a member that only defines a getter.
    #[error("member is a getter without a setter: {pattern}")]
    GetterOnly { pattern: String },

    /// A state class member used a reserved `$` name.
    #[error("member name is reserved: {name}")]
    ReservedName { name: String },

    /// A write went through a parent value that only exists as a computed result.
    #[error("cannot write through computed value at {pattern}")]
    WriteThroughComputed { pattern: String },

    /// `invoke` named a member that is not a method.
    #[error("member is not callable: {name}")]
    NotCallable { name: String },

    /// A getter, setter or method body failed with its own message.
    #[error("{0}")]
    Custom(String),
}

impl PathweaveError {
    /// Builds a [`PathweaveError::Custom`] from a state class body.
    pub fn custom(message: impl Into<String>) -> Self {
        PathweaveError::Custom(message.into())
    }
}
