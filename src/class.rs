//! State class definitions.
//!
//! A state class is the initial data of a component plus its computed members.
//! Members are keyed by path pattern, so a getter can be declared for a nested
//! or per-element path such as `items.*.total`.

use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use pathweave_reactive::{PathweaveError, PathweaveResult};
use serde_json::{Map, Value};

use crate::state::StateView;

pub type GetterFn = Rc<dyn Fn(&mut dyn StateView) -> PathweaveResult<Value>>;
pub type SetterFn = Rc<dyn Fn(&mut dyn StateView, Value) -> PathweaveResult<()>>;
pub type MethodFn = Rc<dyn Fn(&mut dyn StateView, &[Value]) -> PathweaveResult<Value>>;

#[derive(educe::Educe, Clone)]
#[educe(Debug)]
pub struct Body<T>(#[educe(Debug(ignore))] pub(crate) T);

bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemberKind: u8 {
        const GETTER = 1;
        const SETTER = 1 << 1;
        const CALLABLE = 1 << 2;
    }
}

/// One declared member of a state class.
#[derive(Debug, Clone)]
pub enum Member {
    Getter(Body<GetterFn>),
    Accessor {
        get: Option<Body<GetterFn>>,
        set: Body<SetterFn>,
    },
    Method(Body<MethodFn>),
}

impl Member {
    pub fn kind(&self) -> MemberKind {
        match self {
            Member::Getter(_) => MemberKind::GETTER,
            Member::Accessor { get: Some(_), .. } => MemberKind::GETTER | MemberKind::SETTER,
            Member::Accessor { get: None, .. } => MemberKind::SETTER,
            Member::Method(_) => MemberKind::CALLABLE,
        }
    }
}

/// Keys the state view answers itself instead of looking them up in state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedKey {
    /// `$1`..`$9`: position of the enclosing element at that loop level.
    Index(usize),
    /// `$resolve`: access a wildcard path with explicit positions.
    Resolve,
    /// `$getAll`: every value of a wildcard path.
    GetAll,
    /// `$trackDependency`: record a dependency without reading.
    TrackDependency,
}

impl ReservedKey {
    pub fn parse(name: &str) -> Option<ReservedKey> {
        match name {
            "$resolve" => Some(ReservedKey::Resolve),
            "$getAll" => Some(ReservedKey::GetAll),
            "$trackDependency" => Some(ReservedKey::TrackDependency),
            _ => {
                let digit = name.strip_prefix('$')?;
                match digit.parse::<usize>() {
                    Ok(level @ 1..=9) if digit.len() == 1 => Some(ReservedKey::Index(level)),
                    _ => None,
                }
            }
        }
    }

    /// Any `$` prefixed name is reserved for the engine, known or not.
    pub fn is_reserved(name: &str) -> bool {
        name.starts_with('$')
    }
}

/// Initial data and computed members of a component type.
#[derive(Debug, Clone, Default)]
pub struct StateClass {
    initial: Map<String, Value>,
    members: IndexMap<Rc<str>, Member>,
}

impl StateClass {
    pub fn builder(initial: Value) -> StateClassBuilder {
        StateClassBuilder {
            initial,
            members: Vec::new(),
        }
    }

    pub fn initial(&self) -> &Map<String, Value> {
        &self.initial
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.members.iter().map(|(name, member)| (&**name, member))
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn kind(&self, name: &str) -> MemberKind {
        self.members
            .get(name)
            .map(Member::kind)
            .unwrap_or_default()
    }

    pub(crate) fn getter(&self, name: &str) -> Option<GetterFn> {
        match self.members.get(name)? {
            Member::Getter(body) => Some(body.0.clone()),
            Member::Accessor { get: Some(body), .. } => Some(body.0.clone()),
            _ => None,
        }
    }

    pub(crate) fn setter(&self, name: &str) -> Option<SetterFn> {
        match self.members.get(name)? {
            Member::Accessor { set, .. } => Some(set.0.clone()),
            _ => None,
        }
    }

    pub(crate) fn method(&self, name: &str) -> PathweaveResult<MethodFn> {
        match self.members.get(name) {
            Some(Member::Method(body)) => Ok(body.0.clone()),
            Some(_) => Err(PathweaveError::NotCallable {
                name: name.to_string(),
            }),
            None => Err(PathweaveError::UnknownMember {
                name: name.to_string(),
            }),
        }
    }
}

pub struct StateClassBuilder {
    initial: Value,
    members: Vec<(String, Member)>,
}

impl StateClassBuilder {
    pub fn getter(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&mut dyn StateView) -> PathweaveResult<Value> + 'static,
    ) -> Self {
        self.members
            .push((name.into(), Member::Getter(Body(Rc::new(get)))));
        self
    }

    /// A computed member that can also be assigned.
    pub fn accessor(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&mut dyn StateView) -> PathweaveResult<Value> + 'static,
        set: impl Fn(&mut dyn StateView, Value) -> PathweaveResult<()> + 'static,
    ) -> Self {
        self.members.push((
            name.into(),
            Member::Accessor {
                get: Some(Body(Rc::new(get))),
                set: Body(Rc::new(set)),
            },
        ));
        self
    }

    pub fn setter(
        mut self,
        name: impl Into<String>,
        set: impl Fn(&mut dyn StateView, Value) -> PathweaveResult<()> + 'static,
    ) -> Self {
        self.members.push((
            name.into(),
            Member::Accessor {
                get: None,
                set: Body(Rc::new(set)),
            },
        ));
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        call: impl Fn(&mut dyn StateView, &[Value]) -> PathweaveResult<Value> + 'static,
    ) -> Self {
        self.members
            .push((name.into(), Member::Method(Body(Rc::new(call)))));
        self
    }

    pub fn build(self) -> PathweaveResult<StateClass> {
        let initial = match self.initial {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(PathweaveError::custom(
                    "state class initial data must be an object",
                ));
            }
        };
        for key in initial.keys() {
            if ReservedKey::is_reserved(key) {
                return Err(PathweaveError::ReservedName { name: key.clone() });
            }
        }

        let mut members = IndexMap::with_capacity(self.members.len());
        for (name, member) in self.members {
            if name.split('.').any(ReservedKey::is_reserved) {
                return Err(PathweaveError::ReservedName { name });
            }
            members.insert(Rc::from(name), member);
        }
        Ok(StateClass { initial, members })
    }
}
