//! Per component type registry of every reachable state path.
//!
//! The static part (paths, lists, member classification, the structural
//! parent → child tree and the precompiled accessors) is built once from the
//! component definition. The dynamic part records which computed members read
//! which paths; it is discovered while getters run and only ever grows.

use std::{collections::BTreeMap, rc::Rc};

use indexmap::IndexSet;
use pathweave_reactive::{PathInfo, PathResolver, WILDCARD};
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use tracing::debug;

use crate::class::{MemberKind, StateClass};

type PathSet = IndexSet<Rc<str>, FxBuildHasher>;

/// One step of a precompiled accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Member access on an object.
    Key(Rc<str>),
    /// Element access on an array, using the identity at this wildcard level.
    Index(usize),
}

/// Direct route to a path's value from the nearest computed prefix, or from the
/// root data when no prefix is computed.
#[derive(Debug, Clone)]
pub struct Accessor {
    pub base: Option<Rc<PathInfo>>,
    pub steps: Vec<Step>,
}

#[derive(Default)]
pub struct PathManager {
    alls: FxHashSet<Rc<str>>,
    lists: FxHashSet<Rc<str>>,
    elements: FxHashSet<Rc<str>>,
    getters: FxHashSet<Rc<str>>,
    setters: FxHashSet<Rc<str>>,
    funcs: FxHashSet<Rc<str>>,
    optimizes: FxHashMap<Rc<str>, Rc<Accessor>>,
    static_dependencies: FxHashMap<Rc<str>, PathSet>,
    dynamic_dependencies: FxHashMap<Rc<str>, PathSet>,
    generation: u64,
}

impl PathManager {
    pub fn new<'a>(
        resolver: &PathResolver,
        class: &StateClass,
        paths: impl IntoIterator<Item = &'a str>,
        lists: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut manager = PathManager::default();
        manager.add_path(resolver, "");

        for (name, member) in class.members() {
            let kind = member.kind();
            if kind.contains(MemberKind::GETTER) {
                manager.getters.insert(Rc::from(name));
            }
            if kind.contains(MemberKind::SETTER) {
                manager.setters.insert(Rc::from(name));
            }
            if kind.contains(MemberKind::CALLABLE) {
                manager.funcs.insert(Rc::from(name));
            }
        }
        // Accessors are compiled as paths are added, so classify first.
        for (name, member) in class.members() {
            if !member.kind().contains(MemberKind::CALLABLE) {
                manager.add_path(resolver, name);
            }
        }
        for name in class.initial().keys() {
            manager.add_path(resolver, name);
        }

        for list in lists {
            manager.add_list(resolver, list);
        }
        for path in paths {
            manager.add_path(resolver, path);
        }
        manager
    }

    /// Registers `pattern` and all of its prefixes.
    pub fn add_path(&mut self, resolver: &PathResolver, pattern: &str) {
        if self.alls.contains(pattern) {
            return;
        }
        let info = resolver.resolve(pattern);
        let mut parent: Rc<str> = Rc::from("");
        self.alls.insert(parent.clone());
        for prefix in info.cumulative_paths() {
            if self.alls.insert(prefix.clone()) {
                self.generation += 1;
                self.static_dependencies
                    .entry(parent.clone())
                    .or_default()
                    .insert(prefix.clone());
                self.optimize(resolver, prefix);
            }
            parent = prefix.clone();
        }
    }

    /// Registers a list path and its synthesized element path.
    pub fn add_list(&mut self, resolver: &PathResolver, pattern: &str) {
        let element: Rc<str> = Rc::from(format!("{pattern}.{WILDCARD}"));
        self.add_path(resolver, pattern);
        self.add_path(resolver, &element);
        self.lists.insert(Rc::from(pattern));
        self.elements.insert(element);
    }

    /// Records that `dependent` must be re-checked whenever `dependency` changes.
    ///
    /// Edges are never removed. Returns whether the edge is new.
    pub fn add_dynamic_dependency(
        &mut self,
        resolver: &PathResolver,
        dependency: &str,
        dependent: &str,
    ) -> bool {
        self.add_path(resolver, dependency);
        self.add_path(resolver, dependent);
        let dependent = self
            .alls
            .get(dependent)
            .cloned()
            .unwrap_or_else(|| Rc::from(dependent));
        let dependency = self
            .alls
            .get(dependency)
            .cloned()
            .unwrap_or_else(|| Rc::from(dependency));
        let added = self
            .dynamic_dependencies
            .entry(dependency.clone())
            .or_default()
            .insert(dependent.clone());
        if added {
            self.generation += 1;
            debug!(%dependency, %dependent, "discovered dynamic dependency");
        }
        added
    }

    fn optimize(&mut self, resolver: &PathResolver, pattern: &Rc<str>) {
        let info = resolver.resolve(pattern);
        if info.segments().len() < 2
            || self.getters.contains(&**pattern)
            || self.setters.contains(&**pattern)
        {
            return;
        }
        let accessor = build_accessor(&info, |prefix| {
            self.getters.contains(prefix) || self.setters.contains(prefix)
        });
        self.optimizes.insert(pattern.clone(), Rc::new(accessor));
    }

    pub fn paths(&self) -> impl Iterator<Item = &Rc<str>> {
        self.alls.iter()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.alls.contains(pattern)
    }

    pub fn is_list(&self, pattern: &str) -> bool {
        self.lists.contains(pattern)
    }

    pub fn is_element(&self, pattern: &str) -> bool {
        self.elements.contains(pattern)
    }

    pub fn is_getter(&self, pattern: &str) -> bool {
        self.getters.contains(pattern)
    }

    pub fn is_setter(&self, pattern: &str) -> bool {
        self.setters.contains(pattern)
    }

    pub fn is_func(&self, pattern: &str) -> bool {
        self.funcs.contains(pattern)
    }

    pub fn accessor(&self, pattern: &str) -> Option<Rc<Accessor>> {
        self.optimizes.get(pattern).cloned()
    }

    pub fn static_children(&self, pattern: &str) -> impl Iterator<Item = &Rc<str>> {
        self.static_dependencies
            .get(pattern)
            .into_iter()
            .flat_map(|children| children.iter())
    }

    pub fn dynamic_dependents(&self, pattern: &str) -> impl Iterator<Item = &Rc<str>> {
        self.dynamic_dependencies
            .get(pattern)
            .into_iter()
            .flat_map(|dependents| dependents.iter())
    }

    /// Bumped every time a path or a dynamic edge is added.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> PathManagerSnapshot {
        fn sorted(set: &FxHashSet<Rc<str>>) -> Vec<String> {
            let mut out: Vec<String> = set.iter().map(|p| p.to_string()).collect();
            out.sort();
            out
        }
        fn edges(map: &FxHashMap<Rc<str>, PathSet>) -> BTreeMap<String, Vec<String>> {
            map.iter()
                .map(|(from, to)| (from.to_string(), to.iter().map(|p| p.to_string()).collect()))
                .collect()
        }
        let mut optimized: Vec<String> = self.optimizes.keys().map(|p| p.to_string()).collect();
        optimized.sort();
        PathManagerSnapshot {
            alls: sorted(&self.alls),
            lists: sorted(&self.lists),
            elements: sorted(&self.elements),
            getters: sorted(&self.getters),
            setters: sorted(&self.setters),
            funcs: sorted(&self.funcs),
            optimized,
            static_dependencies: edges(&self.static_dependencies),
            dynamic_dependencies: edges(&self.dynamic_dependencies),
        }
    }
}

/// Builds the accessor for `info`, starting at the longest prefix for which
/// `is_computed` holds.
pub fn build_accessor(info: &Rc<PathInfo>, is_computed: impl Fn(&str) -> bool) -> Accessor {
    let mut base = None;
    let mut start = 0;
    for (i, prefix) in info.ancestor_infos().iter().enumerate().rev() {
        if is_computed(prefix.pattern()) {
            base = Some(prefix.clone());
            start = i + 1;
            break;
        }
    }

    let segments = info.segments();
    let mut level = segments[..start]
        .iter()
        .filter(|s| &***s == WILDCARD)
        .count();
    let mut steps = Vec::with_capacity(segments.len() - start);
    for segment in &segments[start..] {
        if &**segment == WILDCARD {
            steps.push(Step::Index(level));
            level += 1;
        } else {
            steps.push(Step::Key(segment.clone()));
        }
    }
    Accessor { base, steps }
}

/// Plain copy of a [`PathManager`] for debugging dumps.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PathManagerSnapshot {
    pub alls: Vec<String>,
    pub lists: Vec<String>,
    pub elements: Vec<String>,
    pub getters: Vec<String>,
    pub setters: Vec<String>,
    pub funcs: Vec<String>,
    pub optimized: Vec<String>,
    pub static_dependencies: BTreeMap<String, Vec<String>>,
    pub dynamic_dependencies: BTreeMap<String, Vec<String>>,
}
