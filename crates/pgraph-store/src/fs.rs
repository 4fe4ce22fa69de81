//! Directory-backed store
//!
//! Layout under the store root:
//!
//! ```text
//! objects/<id>.obj     sealed payloads (written to a temp file, then renamed)
//! persisted/<id>       empty marker files for persisted objects
//! ```
//!
//! Several processes may share one root as long as each uses its own
//! instance id; ids never collide because the instance id is part of the
//! object id and each instance allocates its sequence numbers locally.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::{InstanceId, ObjectId, ObjectStore, StoreError};

const OBJECTS_DIR: &str = "objects";
const PERSISTED_DIR: &str = "persisted";

pub struct FsStore {
    root: PathBuf,
    instance: InstanceId,
    next_seq: Mutex<u32>,
}

impl FsStore {
    /// Open (or create) a store rooted at `root`, acting as `instance`.
    pub fn open(root: impl AsRef<Path>, instance: InstanceId) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(OBJECTS_DIR))?;
        fs::create_dir_all(root.join(PERSISTED_DIR))?;

        // Continue after the highest sequence this instance already used.
        let mut next_seq = 0u32;
        for entry in fs::read_dir(root.join(OBJECTS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("obj") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<ObjectId>().ok())
            else {
                continue;
            };
            if id.instance() == instance {
                next_seq = next_seq.max(id.seq().saturating_add(1));
            }
        }
        debug!(root = %root.display(), instance, next_seq, "opened fs store");

        Ok(Self {
            root,
            instance,
            next_seq: Mutex::new(next_seq),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: ObjectId) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(format!("{id}.obj"))
    }

    fn marker_path(&self, id: ObjectId) -> PathBuf {
        self.root.join(PERSISTED_DIR).join(id.to_string())
    }
}

impl ObjectStore for FsStore {
    fn local_instance_id(&self) -> InstanceId {
        self.instance
    }

    fn create_and_seal(&self, payload: Vec<u8>) -> Result<ObjectId, StoreError> {
        let mut next = self.next_seq.lock();
        loop {
            let id = ObjectId::compose(self.instance, *next);
            *next = next.checked_add(1).ok_or(StoreError::Exhausted(self.instance))?;
            let path = self.object_path(id);
            if path.exists() {
                continue;
            }
            let tmp = path.with_extension("obj.tmp");
            let mut f = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
            f.write_all(&payload)?;
            f.sync_data()?;
            fs::rename(&tmp, &path)?;
            return Ok(id);
        }
    }

    fn resolve(&self, id: ObjectId) -> Result<Arc<[u8]>, StoreError> {
        match fs::read(self.object_path(id)) {
            Ok(bytes) => Ok(bytes.into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, id: ObjectId) -> Result<(), StoreError> {
        if !self.object_path(id).exists() {
            return Err(StoreError::NotFound(id));
        }
        File::create(self.marker_path(id))?.sync_all()?;
        Ok(())
    }

    fn is_persisted(&self, id: ObjectId) -> Result<bool, StoreError> {
        if !self.object_path(id).exists() {
            return Err(StoreError::NotFound(id));
        }
        Ok(self.marker_path(id).exists())
    }
}
