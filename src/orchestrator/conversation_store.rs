//! Persistence for Conversation + Turn, atomic per the append invariant in
//! §5: persisting a Turn and appending to its Conversation happen inside
//! one `WriteBatch`.

use crate::storage::keys::{conversation_key, turn_key, turn_prefix, CF_CONVERSATIONS, CF_TURNS};
use crate::storage::Storage;
use crate::types::{Conversation, Result, Turn};
use chrono::Utc;
use uuid::Uuid;

pub struct ConversationStore {
    storage: Storage,
}

impl ConversationStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Conversation>> {
        match self.storage.get(CF_CONVERSATIONS, &conversation_key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn create(&self, conversation: &Conversation) -> Result<()> {
        let bytes = bincode::serialize(conversation)?;
        self.storage.put(CF_CONVERSATIONS, &conversation_key(conversation.id), &bytes)
    }

    pub fn turns(&self, conversation_id: Uuid) -> Result<Vec<Turn>> {
        self.storage
            .iter_prefix(CF_TURNS, &turn_prefix(conversation_id))?
            .into_iter()
            .map(|(_, v)| Ok(bincode::deserialize(&v)?))
            .collect()
    }

    /// Appends `turn` to `conversation` and persists both atomically. The
    /// caller must hold the per-conversation-id lock for the duration of
    /// this call (§5 ordering guarantees).
    pub fn append_turn(&self, conversation: &mut Conversation, turn: &Turn) -> Result<()> {
        conversation.turn_ids.push(turn.id);
        conversation.updated_at = Utc::now();

        let mut batch = self.storage.batch();
        let turns_cf = self.storage.cf(CF_TURNS)?;
        let convs_cf = self.storage.cf(CF_CONVERSATIONS)?;
        batch.put_cf(turns_cf, &turn_key(conversation.id, turn.turn_number), &bincode::serialize(turn)?);
        batch.put_cf(convs_cf, &conversation_key(conversation.id), &bincode::serialize(conversation)?);
        self.storage.write_batch(batch)
    }
}
