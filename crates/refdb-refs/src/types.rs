//! Core ref types.
//!
//! A [`Ref`] is never mutated after construction. Stored refs come from the
//! repository accessor; the global ref database only compares and records
//! them.

use std::fmt;

use refdb_types::ObjectId;
use serde::{Deserialize, Serialize};

/// Where a ref value lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefStorage {
    /// Not stored anywhere. Used by the null ref and unborn refs.
    New,
    /// Stored as a loose file in the repository.
    Loose,
    /// Stored in the packed-refs file.
    Packed,
    /// Loose and packed copies both exist; the loose one wins.
    LoosePacked,
    /// Held in memory only, e.g. a value received over the network.
    Network,
}

impl RefStorage {
    /// Whether a loose copy of the ref exists.
    pub fn is_loose(self) -> bool {
        matches!(self, RefStorage::Loose | RefStorage::LoosePacked)
    }

    /// Whether a packed copy of the ref exists.
    pub fn is_packed(self) -> bool {
        matches!(self, RefStorage::Packed | RefStorage::LoosePacked)
    }
}

/// A named git reference.
///
/// Either points at an object id (optionally with the id of the peeled tag
/// target) or is symbolic and names another ref.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    name: String,
    object_id: Option<ObjectId>,
    peeled_object_id: Option<ObjectId>,
    target: Option<String>,
    storage: RefStorage,
}

impl Ref {
    /// The null ref: "this ref does not exist yet".
    ///
    /// Carries no name, no object id and `RefStorage::New`. Pass it as the
    /// expected current value of a compare-and-put to create a ref.
    pub fn null() -> Self {
        Self {
            name: String::new(),
            object_id: None,
            peeled_object_id: None,
            target: None,
            storage: RefStorage::New,
        }
    }

    /// An in-memory ref holding the desired new value of `name`.
    pub fn new_ref(name: impl Into<String>, id: ObjectId) -> Self {
        Self::object(name, id, RefStorage::Network)
    }

    /// A non-symbolic ref pointing at `id`.
    pub fn object(name: impl Into<String>, id: ObjectId, storage: RefStorage) -> Self {
        Self {
            name: name.into(),
            object_id: Some(id),
            peeled_object_id: None,
            target: None,
            storage,
        }
    }

    /// An annotated tag ref with its peeled target.
    pub fn peeled_tag(
        name: impl Into<String>,
        id: ObjectId,
        peeled: ObjectId,
        storage: RefStorage,
    ) -> Self {
        Self {
            peeled_object_id: Some(peeled),
            ..Self::object(name, id, storage)
        }
    }

    /// A symbolic ref naming `target`, like `HEAD -> refs/heads/master`.
    pub fn symbolic(name: impl Into<String>, target: impl Into<String>, storage: RefStorage) -> Self {
        Self {
            name: name.into(),
            object_id: None,
            peeled_object_id: None,
            target: Some(target.into()),
            storage,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object id, `None` for symbolic refs and the null ref.
    pub fn object_id(&self) -> Option<ObjectId> {
        self.object_id
    }

    /// The object id with absence mapped to [`ObjectId::zero`].
    pub fn object_id_or_zero(&self) -> ObjectId {
        self.object_id.unwrap_or_else(ObjectId::zero)
    }

    pub fn peeled_object_id(&self) -> Option<ObjectId> {
        self.peeled_object_id
    }

    /// The name of the ref this symbolic ref points to.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn storage(&self) -> RefStorage {
        self.storage
    }

    pub fn is_symbolic(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_peeled(&self) -> bool {
        self.peeled_object_id.is_some()
    }

    /// Whether this value means "absent": unstored, non-symbolic, zero id.
    pub fn is_null(&self) -> bool {
        self.storage == RefStorage::New && !self.is_symbolic() && self.object_id_or_zero().is_zero()
    }

    /// Equality used by compare-and-put.
    ///
    /// Two symbolic refs match when they name the same target. Two object
    /// refs match when their ids match, absence counting as the zero id. A
    /// symbolic ref never matches an object ref. Names and storage are not
    /// compared.
    pub fn matches_for_cas(&self, other: &Ref) -> bool {
        match (&self.target, &other.target) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.object_id_or_zero() == other.object_id_or_zero(),
            _ => false,
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.target, self.is_null()) {
            (Some(target), _) => write!(f, "{} -> {}", self.name, target),
            (None, true) => write!(f, "{}(null)", self.name),
            (None, false) => write!(f, "{}={}", self.name, self.object_id_or_zero().short_hex()),
        }
    }
}
