//! Static registry of tracked endpoints.
//!
//! Every tracked route has a small integer id and a fixed set of supported
//! methods. Backup, migrate and the report all sweep the full
//! `EndpointId x Method` cross-product, so a route that is not registered
//! here is never counted.

use http::Method;
use std::borrow::Cow;
use std::fmt;

const CRUD_METHODS: &[Method] = &[Method::POST, Method::GET, Method::PUT, Method::DELETE];
const ITEM_METHODS: &[Method] = &[Method::GET];

/// Identifier of a registered route.
///
/// `0` is the "unknown, ignore" sentinel and [`EndpointId::LIMIT`] is one
/// past the last swept id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u16);

impl EndpointId {
    pub const UNKNOWN: EndpointId = EndpointId(0);
    pub const FARMS: EndpointId = EndpointId(1);
    pub const FARMS_ID: EndpointId = EndpointId(2);
    pub const PONDS: EndpointId = EndpointId(3);
    pub const PONDS_ID: EndpointId = EndpointId(4);
    pub const LIMIT: EndpointId = EndpointId(5);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// True for ids inside `1..LIMIT`.
    pub fn is_known(self) -> bool {
        self.0 > 0 && self < Self::LIMIT
    }

    /// Canonical path of the route, used as the report label.
    pub fn path(self) -> Option<&'static str> {
        match self {
            Self::FARMS => Some("/farms"),
            Self::FARMS_ID => Some("/farms/{id}"),
            Self::PONDS => Some("/ponds"),
            Self::PONDS_ID => Some("/ponds/{id}"),
            _ => None,
        }
    }

    /// Methods tracked for this route. Empty for unknown ids.
    pub fn methods(self) -> &'static [Method] {
        match self {
            Self::FARMS | Self::PONDS => CRUD_METHODS,
            Self::FARMS_ID | Self::PONDS_ID => ITEM_METHODS,
            _ => &[],
        }
    }

    pub fn supports(self, method: &Method) -> bool {
        self.methods().contains(method)
    }

    /// Resolve a canonical path to its id, or [`EndpointId::UNKNOWN`].
    ///
    /// The item templates (`/farms/{id}`) resolve too, for callers that
    /// report the matched route pattern instead of the raw path.
    pub fn resolve(path: &str) -> Self {
        Self::all()
            .find(|id| id.path() == Some(path))
            .unwrap_or(Self::UNKNOWN)
    }

    /// All swept ids, in order.
    pub fn all() -> impl Iterator<Item = EndpointId> {
        (1..Self::LIMIT.0).map(EndpointId)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every registered `(endpoint, method)` pair.
pub fn pairs() -> impl Iterator<Item = (EndpointId, Method)> {
    EndpointId::all().flat_map(|id| id.methods().iter().map(move |m| (id, m.clone())))
}

/// Collapse a trailing numeric resource id into its collection path.
///
/// `/farms/42` becomes `/farms` so item requests aggregate into the
/// collection's counters. A single trailing slash is ignored.
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    let trimmed = if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    };

    if let Some((collection, last)) = trimmed.rsplit_once('/') {
        if !collection.is_empty()
            && !last.is_empty()
            && last.bytes().all(|b| b.is_ascii_digit())
        {
            return Cow::Owned(collection.to_string());
        }
    }

    if trimmed.len() == path.len() {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(trimmed.to_string())
    }
}
