//! Durable storage for the player identity token.
//!
//! The session reads the store once at construction and writes it only
//! when the host assigns, replaces or rejects the identity, or when the
//! user clears it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use directories::ProjectDirs;
use mobcast_protocol::PlayerId;
use serde_json::{Map, Value};

use crate::SessionError;

/// Fixed key the identity token is stored under.
pub const IDENTITY_KEY: &str = "mob_player_id";

/// A key/value slot holding at most one [`PlayerId`].
pub trait IdentityStore: Send {
    fn load(&self) -> Result<Option<PlayerId>, SessionError>;
    fn save(&mut self, id: &PlayerId) -> Result<(), SessionError>;
    fn clear(&mut self) -> Result<(), SessionError>;
}

impl<S: IdentityStore + ?Sized> IdentityStore for Box<S> {
    fn load(&self) -> Result<Option<PlayerId>, SessionError> {
        (**self).load()
    }

    fn save(&mut self, id: &PlayerId) -> Result<(), SessionError> {
        (**self).save(id)
    }

    fn clear(&mut self) -> Result<(), SessionError> {
        (**self).clear()
    }
}

// ---------------------------------------------------------------------------
// MemoryIdentityStore
// ---------------------------------------------------------------------------

/// In-process store. Clones share the same slot, so a clone kept aside
/// outlives a session the way a file would outlive the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    slot: Arc<Mutex<Option<PlayerId>>>,
}

impl MemoryIdentityStore {
    pub fn with_identity(id: impl Into<PlayerId>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(id.into()))),
        }
    }

    /// What is stored right now.
    pub fn current(&self) -> Option<PlayerId> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, value: Option<PlayerId>) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<PlayerId>, SessionError> {
        Ok(self.current())
    }

    fn save(&mut self, id: &PlayerId) -> Result<(), SessionError> {
        self.set(Some(id.clone()));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SessionError> {
        self.set(None);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileIdentityStore
// ---------------------------------------------------------------------------

/// A JSON object on disk with the token under [`IDENTITY_KEY`]. Other
/// keys in the file are left alone.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `identity.json` in the platform data directory for the given app.
    pub fn in_data_dir(
        qualifier: &str,
        organization: &str,
        application: &str,
    ) -> Result<Self, SessionError> {
        let dirs = ProjectDirs::from(qualifier, organization, application)
            .ok_or(SessionError::NoStorageLocation)?;
        Ok(Self::new(dirs.data_dir().join("identity.json")))
    }

    /// The data-directory store for mobcast itself.
    pub fn default_location() -> Result<Self, SessionError> {
        Self::in_data_dir("", "mobcast", "mobcast")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SessionError {
        SessionError::StorageIo {
            path: self.path.clone(),
            source,
        }
    }

    fn read_map(&self) -> Result<Map<String, Value>, SessionError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let bytes = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<PlayerId>, SessionError> {
        let map = self.read_map()?;
        Ok(map
            .get(IDENTITY_KEY)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(PlayerId::from))
    }

    fn save(&mut self, id: &PlayerId) -> Result<(), SessionError> {
        let mut map = self.read_map()?;
        map.insert(IDENTITY_KEY.to_owned(), Value::from(id.as_str()));
        self.write_map(&map)
    }

    fn clear(&mut self) -> Result<(), SessionError> {
        let mut map = self.read_map()?;
        if map.remove(IDENTITY_KEY).is_none() {
            return Ok(());
        }
        self.write_map(&map)
    }
}
