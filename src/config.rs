/// Maximum nesting of state resolution before a read is considered cyclic.
pub const STACK_DEPTH: usize = 32;

/// Tunables of one component engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Depth of the resolution stack; exceeding it fails with `StackOverflow`.
    pub stack_depth: usize,
    /// Whether read-only views cache values for the duration of a pass.
    pub readonly_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stack_depth: STACK_DEPTH,
            readonly_cache: true,
        }
    }
}
