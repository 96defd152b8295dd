//! Session persistence
//!
//! The orchestrator writes through a `SessionStore` after every message change
//! and on finalize. Store failures are logged by the caller and never stop a
//! conversation.

use super::types::{Message, Session};
use crate::{Result, SessionError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub trait SessionStore: Send {
    /// Record a newly appended message
    fn insert(&self, message: &Message, session: &Session) -> Result<()>;

    /// Write the full session
    fn save(&self, session: &Session) -> Result<()>;
}

impl<S: SessionStore + ?Sized> SessionStore for Box<S> {
    fn insert(&self, message: &Message, session: &Session) -> Result<()> {
        (**self).insert(message, session)
    }

    fn save(&self, session: &Session) -> Result<()> {
        (**self).save(session)
    }
}

/// In-memory store, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    inserted: Arc<RwLock<Vec<Message>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    /// Messages passed to `insert`, in call order
    pub fn inserted(&self) -> Vec<Message> {
        self.inserted.read().clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn insert(&self, message: &Message, session: &Session) -> Result<()> {
        self.inserted.write().push(message.clone());
        self.sessions.write().insert(session.id, session.clone());
        Ok(())
    }

    fn save(&self, session: &Session) -> Result<()> {
        self.sessions.write().insert(session.id, session.clone());
        Ok(())
    }
}

/// One pretty-printed JSON file per session
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Store under the platform data directory
    pub fn in_data_dir() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| SessionError::Config("No data directory on this platform".into()))?;
        Self::new(base.join("tertulia").join("sessions"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn load(&self, id: Uuid) -> Result<Session> {
        let content = fs::read_to_string(self.path_for(id))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All stored sessions, most recently started first
    pub fn list(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            sessions.push(serde_json::from_str::<Session>(&content)?);
        }
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    fn write(&self, session: &Session) -> Result<()> {
        let path = self.path_for(session.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(session)?)?;
        fs::rename(&tmp, &path)?;
        debug!("Saved session {} to {:?}", session.id, path);
        Ok(())
    }
}

impl SessionStore for JsonFileStore {
    fn insert(&self, _message: &Message, session: &Session) -> Result<()> {
        self.write(session)
    }

    fn save(&self, session: &Session) -> Result<()> {
        self.write(session)
    }
}
