//! Path patterns and their interned decomposition.
//!
//! A pattern is a dot separated state path such as `items.*.name`, where `*`
//! stands for "the current element" of the enclosing list. Every distinct
//! pattern is parsed once per [`PathResolver`] and handed out as a shared
//! [`PathInfo`], so two infos for the same string are always the same `Rc`.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use rustc_hash::FxHashMap;

/// The wildcard segment.
pub const WILDCARD: &str = "*";

/// Sequential identifier of an interned path, unique within one resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PathId(u32);

impl PathId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable decomposition of one path pattern.
pub struct PathInfo {
    id: PathId,
    pattern: Rc<str>,
    segments: Vec<Rc<str>>,
    parent_info: Option<Rc<PathInfo>>,
    /// Every prefix of the pattern, the pattern itself last.
    cumulative_paths: Vec<Rc<str>>,
    /// Strict prefixes, root-first.
    ancestor_infos: Vec<Rc<PathInfo>>,
    wildcard_paths: Vec<Rc<str>>,
    wildcard_parent_infos: Vec<Rc<PathInfo>>,
    last_wildcard_path: Option<Rc<str>>,
}

impl PathInfo {
    pub fn id(&self) -> PathId {
        self.id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn pattern_rc(&self) -> Rc<str> {
        self.pattern.clone()
    }

    pub fn segments(&self) -> &[Rc<str>] {
        &self.segments
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(|s| &**s)
    }

    /// True for the synthetic info of the empty pattern.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when the last segment is the wildcard, i.e. this path names list elements.
    pub fn is_wildcard(&self) -> bool {
        self.last_segment() == Some(WILDCARD)
    }

    pub fn parent_path(&self) -> Option<&str> {
        self.parent_info.as_ref().map(|info| info.pattern())
    }

    pub fn parent_info(&self) -> Option<&Rc<PathInfo>> {
        self.parent_info.as_ref()
    }

    pub fn cumulative_paths(&self) -> &[Rc<str>] {
        &self.cumulative_paths
    }

    pub fn ancestor_infos(&self) -> &[Rc<PathInfo>] {
        &self.ancestor_infos
    }

    /// Cumulative prefixes ending in a wildcard segment, outermost first.
    pub fn wildcard_paths(&self) -> &[Rc<str>] {
        &self.wildcard_paths
    }

    /// The list paths governing each wildcard level, outermost first.
    ///
    /// For `items.*.tags.*` this is `[items, items.*.tags]`.
    pub fn wildcard_parent_infos(&self) -> &[Rc<PathInfo>] {
        &self.wildcard_parent_infos
    }

    pub fn last_wildcard_path(&self) -> Option<&str> {
        self.last_wildcard_path.as_deref()
    }

    pub fn wildcard_count(&self) -> usize {
        self.wildcard_paths.len()
    }
}

impl fmt::Debug for PathInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathInfo")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("wildcard_count", &self.wildcard_count())
            .finish()
    }
}

impl fmt::Display for PathInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Interning table for [`PathInfo`].
///
/// One resolver belongs to one component engine; infos live as long as it does.
#[derive(Default)]
pub struct PathResolver {
    infos: RefCell<FxHashMap<Rc<str>, Rc<PathInfo>>>,
    next_id: Cell<u32>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the interned info for `pattern`, parsing it on first use.
    ///
    /// Ancestors are interned before the pattern itself, so an info's id is
    /// always greater than the ids of its prefixes.
    pub fn resolve(&self, pattern: &str) -> Rc<PathInfo> {
        let existing = self.infos.borrow().get(pattern).cloned();
        if let Some(info) = existing {
            return info;
        }
        let info = Rc::new(self.build(pattern));
        self.infos
            .borrow_mut()
            .insert(info.pattern.clone(), info.clone());
        info
    }

    /// Looks up an info without interning a new one.
    pub fn get(&self, pattern: &str) -> Option<Rc<PathInfo>> {
        self.infos.borrow().get(pattern).cloned()
    }

    pub fn root(&self) -> Rc<PathInfo> {
        self.resolve("")
    }

    pub fn len(&self) -> usize {
        self.infos.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.borrow().is_empty()
    }

    fn build(&self, pattern: &str) -> PathInfo {
        if pattern.is_empty() {
            return PathInfo {
                id: self.next_id(),
                pattern: Rc::from(""),
                segments: Vec::new(),
                parent_info: None,
                cumulative_paths: Vec::new(),
                ancestor_infos: Vec::new(),
                wildcard_paths: Vec::new(),
                wildcard_parent_infos: Vec::new(),
                last_wildcard_path: None,
            };
        }

        let segments: Vec<Rc<str>> = pattern.split('.').map(Rc::from).collect();
        let mut cumulative_paths = Vec::with_capacity(segments.len());
        let mut ancestor_infos = Vec::with_capacity(segments.len().saturating_sub(1));
        let mut wildcard_paths = Vec::new();
        let mut wildcard_parent_infos = Vec::new();

        for (i, segment) in segments.iter().enumerate() {
            let prefix: Rc<str> = Rc::from(join(&segments[..=i]));
            if &**segment == WILDCARD {
                wildcard_paths.push(prefix.clone());
                wildcard_parent_infos.push(self.resolve(&join(&segments[..i])));
            }
            if i + 1 < segments.len() {
                ancestor_infos.push(self.resolve(&prefix));
            }
            cumulative_paths.push(prefix);
        }

        PathInfo {
            id: self.next_id(),
            pattern: Rc::from(pattern),
            parent_info: ancestor_infos.last().cloned(),
            last_wildcard_path: wildcard_paths.last().cloned(),
            segments,
            cumulative_paths,
            ancestor_infos,
            wildcard_paths,
            wildcard_parent_infos,
        }
    }

    fn next_id(&self) -> PathId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        PathId(id)
    }
}

fn join(segments: &[Rc<str>]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(segment);
    }
    out
}
