//! pgraph object store
//!
//! The loader persists its results (vertex maps, fragments, fragment groups)
//! as sealed, immutable objects addressed by [`ObjectId`]. The store surface
//! the loader relies on is deliberately small:
//!
//! - `create_and_seal(payload) -> id`
//! - `resolve(id) -> payload`
//! - `persist(id)`
//! - `local_instance_id()`
//!
//! On top of the byte-level [`ObjectStore`] trait, [`seal_object`] and
//! [`resolve_object`] store typed values inside a checksummed
//! [`envelope`] so that a resolved payload is verified before it is decoded.

pub mod envelope;
pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Identifier of one store instance (one per host/server in a deployment).
pub type InstanceId = u32;

// ============================================================================
// Object ids
// ============================================================================

/// Handle to a sealed object: the creating instance in the high 32 bits and
/// a per-instance sequence number in the low 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn compose(instance: InstanceId, seq: u32) -> Self {
        Self(((instance as u64) << 32) | seq as u64)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn instance(self) -> InstanceId {
        (self.0 >> 32) as InstanceId
    }

    pub const fn seq(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{:016x}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('o').unwrap_or(s);
        u64::from_str_radix(hex, 16)
            .map(ObjectId)
            .map_err(|_| StoreError::InvalidId(s.to_string()))
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object {0} not found")]
    NotFound(ObjectId),

    #[error("invalid object id: {0}")]
    InvalidId(String),

    #[error("object {id} holds a {actual}, expected {expected}")]
    TypeMismatch {
        id: ObjectId,
        expected: String,
        actual: String,
    },

    #[error("object id space exhausted for instance {0}")]
    Exhausted(InstanceId),

    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Incompatible version: object {object_version:#x}, reader {reader_version:#x}")]
    IncompatibleVersion {
        object_version: u32,
        reader_version: u32,
    },

    #[error("Header checksum mismatch")]
    HeaderChecksumMismatch,

    #[error("Content length mismatch: expected {expected}, got {actual}")]
    ContentLengthMismatch { expected: u64, actual: u64 },

    #[error("Content checksum mismatch")]
    ContentChecksumMismatch,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Store interface
// ============================================================================

/// Byte-level sealed object store.
///
/// Objects are immutable once `create_and_seal` returns. `persist` marks an
/// object as durable (kept beyond the session that created it); it never
/// changes the object's content.
pub trait ObjectStore: Send + Sync {
    fn local_instance_id(&self) -> InstanceId;

    fn create_and_seal(&self, payload: Vec<u8>) -> Result<ObjectId, StoreError>;

    fn resolve(&self, id: ObjectId) -> Result<Arc<[u8]>, StoreError>;

    fn persist(&self, id: ObjectId) -> Result<(), StoreError>;

    fn is_persisted(&self, id: ObjectId) -> Result<bool, StoreError>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn local_instance_id(&self) -> InstanceId {
        (**self).local_instance_id()
    }

    fn create_and_seal(&self, payload: Vec<u8>) -> Result<ObjectId, StoreError> {
        (**self).create_and_seal(payload)
    }

    fn resolve(&self, id: ObjectId) -> Result<Arc<[u8]>, StoreError> {
        (**self).resolve(id)
    }

    fn persist(&self, id: ObjectId) -> Result<(), StoreError> {
        (**self).persist(id)
    }

    fn is_persisted(&self, id: ObjectId) -> Result<bool, StoreError> {
        (**self).is_persisted(id)
    }
}

/// A value that can be sealed into an [`ObjectStore`].
pub trait StoredObject: Serialize + DeserializeOwned {
    /// Recorded in the envelope and checked on resolve.
    const TYPE_NAME: &'static str;
}

/// Encode `value`, wrap it in a checksummed envelope and seal it.
pub fn seal_object<S, T>(store: &S, value: &T) -> Result<ObjectId, StoreError>
where
    S: ObjectStore + ?Sized,
    T: StoredObject,
{
    let body = bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let bytes = envelope::encode(T::TYPE_NAME, &body)?;
    let id = store.create_and_seal(bytes)?;
    tracing::debug!(%id, type_name = T::TYPE_NAME, bytes = body.len(), "sealed object");
    Ok(id)
}

/// Resolve `id`, verify its envelope and type, and decode it.
pub fn resolve_object<S, T>(store: &S, id: ObjectId) -> Result<T, StoreError>
where
    S: ObjectStore + ?Sized,
    T: StoredObject,
{
    let bytes = store.resolve(id)?;
    let (header, body) = envelope::decode(&bytes)?;
    if header.type_name != T::TYPE_NAME {
        return Err(StoreError::TypeMismatch {
            id,
            expected: T::TYPE_NAME.to_string(),
            actual: header.type_name,
        });
    }
    bincode::deserialize(body).map_err(|e| StoreError::Deserialization(e.to_string()))
}
