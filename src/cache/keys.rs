//! Cache key resolver.
//!
//! Maps `(kind, view, id)` addresses to the query keys the store is indexed
//! by. Key shapes differ per kind and are read from the kind's
//! [`EntityProfile`](crate::domain::entity::EntityProfile).

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::domain::entity::{DetailKeyShape, EntityKind, ListKeyShape};
use crate::domain::types::EntityId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySegment {
    Name(String),
    Id(i64),
    /// Filter and pagination parameters of a list query.
    Filters(BTreeMap<String, String>),
}

impl Display for KeySegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySegment::Name(name) => write!(f, "{name}"),
            KeySegment::Id(id) => write!(f, "{id}"),
            KeySegment::Filters(filters) => {
                let pairs: Vec<String> = filters.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", pairs.join("&"))
            }
        }
    }
}

fn name(value: &str) -> KeySegment {
    KeySegment::Name(value.to_string())
}

/// Exact key of one cached query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    pub fn new(segments: Vec<KeySegment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Prefix pattern selecting every key that starts with its segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyPattern(Vec<KeySegment>);

impl KeyPattern {
    pub fn new(segments: Vec<KeySegment>) -> Self {
        Self(segments)
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        key.0.starts_with(&self.0)
    }
}

impl From<&QueryKey> for KeyPattern {
    fn from(key: &QueryKey) -> Self {
        Self(key.0.clone())
    }
}

impl Display for KeyPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}, ..]", parts.join(", "))
    }
}

/// Which projection of an entity an address refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Detail,
    List,
}

/// Logical cache address of an entity projection.
///
/// Detail addresses name one query; list addresses name every cached list
/// result set of the kind, whatever its filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheAddress {
    pub kind: EntityKind,
    pub view: ViewKind,
    pub id: Option<EntityId>,
}

impl CacheAddress {
    pub fn detail(kind: EntityKind, id: EntityId) -> Self {
        Self {
            kind,
            view: ViewKind::Detail,
            id: Some(id),
        }
    }

    pub fn list(kind: EntityKind) -> Self {
        Self {
            kind,
            view: ViewKind::List,
            id: None,
        }
    }

    /// Pattern selecting the queries behind this address.
    pub fn pattern(&self) -> KeyPattern {
        match (self.view, self.id) {
            (ViewKind::Detail, Some(id)) => KeyPattern::from(&detail_key(self.kind, id)),
            _ => list_pattern(self.kind),
        }
    }
}

/// Exact detail key: `[res, id]` or `[res, "detail", id]`.
pub fn detail_key(kind: EntityKind, id: EntityId) -> QueryKey {
    let profile = kind.profile();
    let segments = match profile.detail_key {
        DetailKeyShape::Bare => vec![name(profile.resource), KeySegment::Id(id.get())],
        DetailKeyShape::Segmented => vec![
            name(profile.resource),
            name("detail"),
            KeySegment::Id(id.get()),
        ],
    };
    QueryKey(segments)
}

/// Exact list key for one filter set.
pub fn list_key(kind: EntityKind, filters: BTreeMap<String, String>) -> QueryKey {
    let profile = kind.profile();
    let segments = match profile.list_key {
        ListKeyShape::Root => vec![name(profile.resource), KeySegment::Filters(filters)],
        ListKeyShape::Segmented => vec![
            name(profile.resource),
            name("list"),
            KeySegment::Filters(filters),
        ],
    };
    QueryKey(segments)
}

/// Pattern matching every list of the kind.
///
/// For lead lists this is the resource root, so it also matches lead detail
/// keys; consumers sweeping list data must skip non-list values.
pub fn list_pattern(kind: EntityKind) -> KeyPattern {
    let profile = kind.profile();
    match profile.list_key {
        ListKeyShape::Root => KeyPattern(vec![name(profile.resource)]),
        ListKeyShape::Segmented => KeyPattern(vec![name(profile.resource), name("list")]),
    }
}

/// Pattern matching every query of the kind.
pub fn root_pattern(kind: EntityKind) -> KeyPattern {
    KeyPattern(vec![name(kind.profile().resource)])
}
