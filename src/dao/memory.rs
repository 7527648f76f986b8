//! Process-local room used by tests and the demo host.
//!
//! Every [`RoomHandle`] sees the same property store, so replication is
//! immediate. The first participant to join holds the authority role; when it
//! leaves the role is not handed to anyone else.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::room::{Participant, ParticipantId, PropertyKey, RoomEvent, RoomPlatform},
    error::CollaboratorError,
};

const EVENT_CAPACITY: usize = 64;

/// Shared room state for every in-process participant.
#[derive(Debug)]
pub struct InMemoryRoom {
    properties: DashMap<String, Value>,
    members: Mutex<IndexMap<ParticipantId, Participant>>,
    authority: Mutex<Option<ParticipantId>>,
    open: AtomicBool,
    events: broadcast::Sender<RoomEvent>,
}

impl InMemoryRoom {
    /// Create an empty, open room.
    pub fn new() -> Arc<Self> {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            properties: DashMap::new(),
            members: Mutex::new(IndexMap::new()),
            authority: Mutex::new(None),
            open: AtomicBool::new(true),
            events,
        })
    }

    /// Join the room, returning the handle the new participant talks through.
    pub fn join(self: &Arc<Self>, nickname: impl Into<String>) -> Result<RoomHandle, CollaboratorError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("room", "room is closed to new joiners"));
        }

        let participant = Participant {
            id: Uuid::new_v4(),
            nickname: nickname.into(),
        };
        let id = participant.id;

        {
            let mut members = self.members();
            let mut authority = self.authority_slot();
            if members.is_empty() && authority.is_none() {
                *authority = Some(id);
            }
            members.insert(id, participant.clone());
        }

        info!(participant = %id, nickname = %participant.nickname, "participant joined room");
        let _ = self.events.send(RoomEvent::Joined(id));

        Ok(RoomHandle {
            room: self.clone(),
            local: id,
        })
    }

    /// Remove a replicated property, as if it had never been written.
    pub fn remove_property(&self, key: PropertyKey) {
        self.properties.remove(&key.to_string());
    }

    /// Whether new participants may join.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Participant currently holding the authority role.
    pub fn authority_id(&self) -> Option<ParticipantId> {
        *self.authority_slot()
    }

    fn members(&self) -> MutexGuard<'_, IndexMap<ParticipantId, Participant>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn authority_slot(&self) -> MutexGuard<'_, Option<ParticipantId>> {
        self.authority.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, key: PropertyKey, value: Value) {
        debug!(%key, %value, "room property written");
        self.properties.insert(key.to_string(), value);
        let _ = self.events.send(RoomEvent::PropertyChanged(key));
    }

    fn read(&self, key: PropertyKey) -> Option<Value> {
        self.properties
            .get(&key.to_string())
            .map(|entry| entry.value().clone())
    }

    fn remove_member(&self, id: ParticipantId) -> bool {
        let removed = self.members().shift_remove(&id).is_some();
        if removed {
            let mut authority = self.authority_slot();
            if *authority == Some(id) {
                authority.take();
            }
        }
        removed
    }
}

/// One participant's view of an [`InMemoryRoom`].
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room: Arc<InMemoryRoom>,
    local: ParticipantId,
}

impl RoomHandle {
    /// Identifier of the participant owning this handle.
    pub fn id(&self) -> ParticipantId {
        self.local
    }

    /// The room this handle belongs to.
    pub fn room(&self) -> &Arc<InMemoryRoom> {
        &self.room
    }
}

impl RoomPlatform for RoomHandle {
    fn local_participant(&self) -> ParticipantId {
        self.local
    }

    fn participants(&self) -> Vec<Participant> {
        self.room.members().values().cloned().collect()
    }

    fn set_shared_property(&self, key: PropertyKey, value: Value) -> Result<(), CollaboratorError> {
        if !self.room.members().contains_key(&self.local) {
            return Err(CollaboratorError::new(
                "room",
                format!("cannot write `{key}` after leaving the room"),
            ));
        }
        self.room.write(key, value);
        Ok(())
    }

    fn shared_property(&self, key: PropertyKey) -> Option<Value> {
        self.room.read(key)
    }

    fn is_authority(&self) -> bool {
        self.room.authority_id() == Some(self.local)
    }

    fn authority(&self) -> Option<ParticipantId> {
        self.room.authority_id()
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.room.events.subscribe()
    }

    fn set_open(&self, open: bool) -> Result<(), CollaboratorError> {
        self.room.open.store(open, Ordering::SeqCst);
        Ok(())
    }

    fn leave_room(&self) -> Result<(), CollaboratorError> {
        if !self.room.remove_member(self.local) {
            return Err(CollaboratorError::new("room", "participant already left"));
        }
        info!(participant = %self.local, "participant left room");
        let _ = self.room.events.send(RoomEvent::Left(self.local));
        Ok(())
    }
}
