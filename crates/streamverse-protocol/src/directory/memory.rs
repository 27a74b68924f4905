use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::directory::{roster_keys, RecipientDirectory};
use crate::error::ProtocolError;
use crate::messaging::envelope::{CreatePartyRequest, PartyNotification, RosterEntry, WatchParty};

/// In-process watch-party directory.
///
/// Backs the relay service and tests. Rosters keep registration order; a
/// re-published key replaces the user's previous entry in place.
#[derive(Default)]
pub struct MemoryDirectory {
    parties: RwLock<HashMap<String, WatchParty>>,
    rosters: RwLock<HashMap<String, Vec<RosterEntry>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a watch party hosted by `host_id`, with a fresh id.
    pub fn create_party(&self, host_id: &str, req: CreatePartyRequest) -> WatchParty {
        let party = WatchParty {
            id: uuid::Uuid::new_v4().to_string(),
            title: req.title.trim().to_string(),
            description: req.description,
            date_time: req.date_time,
            movie_ids: req.movie_ids,
            movies: Vec::new(),
            is_public: req.is_public,
            host_id: Some(host_id.to_string()),
            participants: vec![host_id.to_string()],
            invited_user_ids: req.invited_user_ids,
        };
        self.insert_party(party.clone());
        party
    }

    /// Add `user_id` to a party's participants. Joining twice is a no-op.
    pub fn join(&self, conversation_id: &str, user_id: &str) -> Result<WatchParty, ProtocolError> {
        let mut parties = self.parties.write();
        let party = parties
            .get_mut(conversation_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("watch party {conversation_id}")))?;
        if !party.admits(user_id) {
            return Err(ProtocolError::Forbidden(format!(
                "{user_id} is not invited to watch party {conversation_id}"
            )));
        }
        if !party.has_participant(user_id) {
            party.participants.push(user_id.to_string());
            tracing::debug!(party = %conversation_id, user = %user_id, "joined watch party");
        }
        Ok(party.clone())
    }

    /// Parties `user_id` hosts or joined.
    pub fn parties_of(&self, user_id: &str) -> Vec<WatchParty> {
        self.select(|p| p.has_participant(user_id))
    }

    pub fn public_parties(&self) -> Vec<WatchParty> {
        self.select(|p| p.is_public)
    }

    /// Pending invitations: parties `user_id` is invited to but has not joined.
    pub fn invitations(&self, user_id: &str) -> Vec<PartyNotification> {
        self.select(|p| {
            p.invited_user_ids.iter().any(|u| u == user_id) && !p.has_participant(user_id)
        })
        .into_iter()
        .map(|p| PartyNotification {
            id: format!("invite-{}-{user_id}", p.id),
            kind: "watchPartyInvite".into(),
            message: format!("You are invited to {}", p.title),
            watch_party_id: p.id,
        })
        .collect()
    }

    /// Matching parties ordered by start time, then id.
    fn select(&self, keep: impl Fn(&WatchParty) -> bool) -> Vec<WatchParty> {
        let mut parties: Vec<WatchParty> =
            self.parties.read().values().filter(|p| keep(p)).cloned().collect();
        parties.sort_by(|a, b| (&a.date_time, &a.id).cmp(&(&b.date_time, &b.id)));
        parties
    }

    /// Insert or replace a watch party under its own id.
    pub fn insert_party(&self, party: WatchParty) {
        tracing::debug!(party = %party.id, title = %party.title, "watch party registered");
        self.parties.write().insert(party.id.clone(), party);
    }

    pub fn party(&self, conversation_id: &str) -> Option<WatchParty> {
        self.parties.read().get(conversation_id).cloned()
    }

    /// Raw roster entries for a conversation.
    pub fn entries(&self, conversation_id: &str) -> Vec<RosterEntry> {
        self.rosters
            .read()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Last-write-wins upsert of one user's entry.
    pub fn upsert(&self, conversation_id: &str, entry: RosterEntry) {
        let mut rosters = self.rosters.write();
        let roster = rosters.entry(conversation_id.to_string()).or_default();
        match roster.iter_mut().find(|e| e.user_id == entry.user_id) {
            Some(existing) => *existing = entry,
            None => roster.push(entry),
        }
    }
}

#[async_trait]
impl RecipientDirectory for MemoryDirectory {
    async fn fetch_metadata(&self, conversation_id: &str) -> Result<WatchParty, ProtocolError> {
        self.party(conversation_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("watch party {conversation_id}")))
    }

    async fn fetch_roster(&self, conversation_id: &str) -> Result<Vec<Vec<u8>>, ProtocolError> {
        Ok(roster_keys(&self.entries(conversation_id)))
    }

    async fn publish_key(
        &self,
        conversation_id: &str,
        user_id: &str,
        public_key: &[u8],
    ) -> Result<(), ProtocolError> {
        self.upsert(conversation_id, RosterEntry::new(user_id, public_key));
        Ok(())
    }
}
