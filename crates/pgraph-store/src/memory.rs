//! In-memory store shared by every worker of one process.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::{InstanceId, ObjectId, ObjectStore, StoreError};

struct Entry {
    bytes: Arc<[u8]>,
    persisted: bool,
}

#[derive(Default)]
struct Shared {
    objects: RwLock<HashMap<ObjectId, Entry>>,
    next_seq: Mutex<HashMap<InstanceId, u32>>,
}

/// Handle to an in-memory store. Clones and [`MemoryStore::connect`]
/// handles see the same objects.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    instance: InstanceId,
}

impl MemoryStore {
    pub fn new(instance: InstanceId) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            instance,
        }
    }

    /// Another handle onto the same objects, acting as `instance`.
    pub fn connect(&self, instance: InstanceId) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            instance,
        }
    }

    /// Number of sealed objects.
    pub fn len(&self) -> usize {
        self.shared.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryStore {
    fn local_instance_id(&self) -> InstanceId {
        self.instance
    }

    fn create_and_seal(&self, payload: Vec<u8>) -> Result<ObjectId, StoreError> {
        let seq = {
            let mut next = self.shared.next_seq.lock();
            let slot = next.entry(self.instance).or_insert(0);
            let seq = *slot;
            *slot = slot.checked_add(1).ok_or(StoreError::Exhausted(self.instance))?;
            seq
        };
        let id = ObjectId::compose(self.instance, seq);
        self.shared.objects.write().insert(
            id,
            Entry {
                bytes: payload.into(),
                persisted: false,
            },
        );
        Ok(id)
    }

    fn resolve(&self, id: ObjectId) -> Result<Arc<[u8]>, StoreError> {
        self.shared
            .objects
            .read()
            .get(&id)
            .map(|e| Arc::clone(&e.bytes))
            .ok_or(StoreError::NotFound(id))
    }

    fn persist(&self, id: ObjectId) -> Result<(), StoreError> {
        let mut objects = self.shared.objects.write();
        let entry = objects.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        entry.persisted = true;
        Ok(())
    }

    fn is_persisted(&self, id: ObjectId) -> Result<bool, StoreError> {
        self.shared
            .objects
            .read()
            .get(&id)
            .map(|e| e.persisted)
            .ok_or(StoreError::NotFound(id))
    }
}
