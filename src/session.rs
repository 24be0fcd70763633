use crate::core::{AuditStamp, Result, SyncError};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Signed-in user on whose behalf mutations run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub display_name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    pub fn stamp(&self) -> AuditStamp {
        AuditStamp::new(self.id.clone())
    }
}

/// Source of the current session, checked at mutation time.
pub trait SessionProvider: Send + Sync {
    fn current_actor(&self) -> Option<Actor>;

    fn require_actor(&self) -> Result<Actor> {
        self.current_actor().ok_or_else(|| {
            SyncError::AuthenticationRequired("no active session".to_string())
        })
    }
}

/// Mutable session slot owned by the workspace.
#[derive(Debug, Default)]
pub struct Session {
    actor: RwLock<Option<Actor>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(actor: Actor) -> Self {
        Self {
            actor: RwLock::new(Some(actor)),
        }
    }

    pub fn sign_in(&self, actor: Actor) -> Result<()> {
        *self.actor.write()? = Some(actor);
        Ok(())
    }

    /// Returns the actor that was signed in, if any.
    pub fn sign_out(&self) -> Result<Option<Actor>> {
        Ok(self.actor.write()?.take())
    }
}

impl SessionProvider for Session {
    fn current_actor(&self) -> Option<Actor> {
        // A poisoned slot reads as signed out
        self.actor.read().ok().and_then(|actor| actor.clone())
    }
}
