//! Document and document id model
//!
//! A [`Document`] is one mutation (put, update or remove) addressed by an
//! [`Id`]. Both are plain immutable values; the client never modifies them.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::FeedError;

/// Identifies a document and selects the `/document/v1/` path form.
///
/// A numeric key takes precedence over a group key, which takes precedence
/// over the plain `docid` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id {
    pub namespace: String,
    pub doc_type: String,
    pub number: Option<u64>,
    pub group: Option<String>,
    pub user_specific: String,
}

impl Id {
    /// Create an id without location key (`docid` path form)
    pub fn new(
        namespace: impl Into<String>,
        doc_type: impl Into<String>,
        user_specific: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            doc_type: doc_type.into(),
            number: None,
            group: None,
            user_specific: user_specific.into(),
        }
    }

    /// Set the numeric location key (`n=`)
    pub fn with_number(mut self, number: u64) -> Self {
        self.number = Some(number);
        self
    }

    /// Set the group location key (`g=`)
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// The group key, if set and non-empty
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref().filter(|g| !g.is_empty())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id:{}:{}:", self.namespace, self.doc_type)?;
        if let Some(n) = self.number {
            write!(f, "n={}", n)?;
        } else if let Some(g) = self.group() {
            write!(f, "g={}", g)?;
        }
        write!(f, ":{}", self.user_specific)
    }
}

impl FromStr for Id {
    type Err = FeedError;

    /// Parse `id:<namespace>:<type>:<n=N|g=G|>:<user-specific>`.
    ///
    /// The user-specific part is everything after the fourth colon and may
    /// itself contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| FeedError::InvalidId(format!("{}: '{}'", reason, s));

        let rest = s
            .strip_prefix("id:")
            .ok_or_else(|| invalid("missing 'id:' scheme"))?;
        let mut parts = rest.splitn(4, ':');
        let (namespace, doc_type, key_values, user_specific) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(ns), Some(t), Some(kv), Some(us)) => (ns, t, kv, us),
                _ => return Err(invalid("expected 5 colon-separated parts")),
            };

        if namespace.is_empty() {
            return Err(invalid("empty namespace"));
        }
        if doc_type.is_empty() {
            return Err(invalid("empty document type"));
        }
        if user_specific.is_empty() {
            return Err(invalid("empty user-specific part"));
        }

        let mut id = Id::new(namespace, doc_type, user_specific);
        if let Some(n) = key_values.strip_prefix("n=") {
            let number = n
                .parse::<u64>()
                .map_err(|_| invalid("numeric key is not an unsigned integer"))?;
            id = id.with_number(number);
        } else if let Some(g) = key_values.strip_prefix("g=") {
            if g.is_empty() {
                return Err(invalid("empty group key"));
            }
            id = id.with_group(g);
        } else if !key_values.is_empty() {
            return Err(invalid("unknown key/value pair"));
        }
        Ok(id)
    }
}

/// The mutation a document carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Put,
    Update,
    Remove,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Put => "put",
            Operation::Update => "update",
            Operation::Remove => "remove",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single document operation to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: Id,
    pub operation: Operation,
    /// Raw request body, usually a JSON document
    pub body: Bytes,
    /// Test-and-set condition
    pub condition: Option<String>,
    /// Create the document if it does not exist (updates only)
    pub create: bool,
}

impl Document {
    pub fn new(id: Id, operation: Operation, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            operation,
            body: body.into(),
            condition: None,
            create: false,
        }
    }

    pub fn put(id: Id, body: impl Into<Bytes>) -> Self {
        Self::new(id, Operation::Put, body)
    }

    pub fn update(id: Id, body: impl Into<Bytes>) -> Self {
        Self::new(id, Operation::Update, body)
    }

    pub fn remove(id: Id) -> Self {
        Self::new(id, Operation::Remove, Bytes::new())
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// The test-and-set condition, if set and non-empty
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref().filter(|c| !c.is_empty())
    }
}
