//! Role-scoped query selection.
//!
//! A [`TaskQuery`] is chosen once per subscription from the session's role
//! and lowered to a declarative [`QuerySpec`] that any store adapter can
//! evaluate the same way.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::TaskDocument;
use crate::session::{Role, Session};

/// Document field a query can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryField {
    /// `area`
    Area,
    /// `assignedTo`
    AssignedTo,
}

impl QueryField {
    /// Wire name of the field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Area => "area",
            Self::AssignedTo => "assignedTo",
        }
    }
}

/// Equality filter `field == value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldFilter {
    /// Filtered field.
    pub field: QueryField,
    /// Required value.
    pub value: String,
}

impl FieldFilter {
    /// Whether a document satisfies the filter. Unset fields never match.
    #[must_use]
    pub fn matches(&self, doc: &TaskDocument) -> bool {
        let actual = match self.field {
            QueryField::Area => doc.area.as_deref(),
            QueryField::AssignedTo => doc.assigned_to.as_deref(),
        };
        actual == Some(self.value.as_str())
    }
}

/// Declarative query consumed by store adapters.
///
/// Results are always ordered by creation time, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Optional equality filter; `None` selects the whole collection.
    pub filter: Option<FieldFilter>,
}

impl QuerySpec {
    /// Whether a document belongs to the result set.
    #[must_use]
    pub fn matches(&self, doc: &TaskDocument) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(doc))
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some(filter) => write!(
                f,
                "tasks where {} == {:?} order by createdAt desc",
                filter.field.as_str(),
                filter.value
            ),
            None => write!(f, "tasks order by createdAt desc"),
        }
    }
}

/// The closed set of role-scoped queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskQuery {
    /// Every task (admin).
    All,
    /// Tasks whose area is the lead's department.
    Department(String),
    /// Tasks assigned to the worker's email.
    AssignedTo(String),
}

impl TaskQuery {
    /// Picks the query for a session.
    ///
    /// Returns `None` (no access) for a missing role, and for a lead without
    /// a department or a worker without an email.
    #[must_use]
    pub fn for_session(session: &Session) -> Option<Self> {
        match session.role? {
            Role::Admin => Some(Self::All),
            Role::Lead => session
                .department
                .as_ref()
                .filter(|d| !d.is_empty())
                .map(|d| Self::Department(d.clone())),
            Role::Worker => Some(session.email.clone())
                .filter(|e| !e.is_empty())
                .map(Self::AssignedTo),
        }
    }

    /// Lowers to the declarative spec evaluated by the store.
    #[must_use]
    pub fn spec(&self) -> QuerySpec {
        let filter = match self {
            Self::All => None,
            Self::Department(area) => Some(FieldFilter {
                field: QueryField::Area,
                value: area.clone(),
            }),
            Self::AssignedTo(email) => Some(FieldFilter {
                field: QueryField::AssignedTo,
                value: email.clone(),
            }),
        };
        QuerySpec { filter }
    }
}
