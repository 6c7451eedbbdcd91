//! Key-building helpers for each column family.
//!
//! Point lookups use `{entity}:{id}`; ordered children use
//! `{entity}:{parent_id}:{ordinal}` so a prefix scan returns them in turn
//! order, mirroring the corpus's `storage::keys` module.

use uuid::Uuid;

pub const CF_CONVERSATIONS: &str = "conversations";
pub const CF_TURNS: &str = "turns";
pub const CF_EXAMPLES: &str = "examples";
pub const CF_FEEDBACK: &str = "feedback";
pub const CF_ANNOTATIONS: &str = "annotations";
pub const CF_EXAMPLE_VECTORS: &str = "example_vectors";

pub fn conversation_key(id: Uuid) -> Vec<u8> {
    format!("conversation:{id}").into_bytes()
}

pub fn turn_key(conversation_id: Uuid, turn_number: u32) -> Vec<u8> {
    format!("turn:{conversation_id}:{turn_number:010}").into_bytes()
}

pub fn turn_prefix(conversation_id: Uuid) -> Vec<u8> {
    format!("turn:{conversation_id}:").into_bytes()
}

pub fn example_key(id: Uuid) -> Vec<u8> {
    format!("example:{id}").into_bytes()
}

pub fn feedback_key(turn_id: Uuid) -> Vec<u8> {
    format!("feedback:{turn_id}").into_bytes()
}

pub fn annotation_key(target_name: &str) -> Vec<u8> {
    format!("annotation:{target_name}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_keys_sort_lexicographically_in_turn_order() {
        let conv = Uuid::nil();
        let k1 = turn_key(conv, 1);
        let k2 = turn_key(conv, 2);
        let k10 = turn_key(conv, 10);
        assert!(k1 < k2);
        assert!(k2 < k10, "zero-padded ordinal must sort numerically, not lexically");
    }
}
