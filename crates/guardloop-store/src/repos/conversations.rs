//! Conversation-history repository.

use rusqlite::{params, Connection};

use guardloop_core::errors::StoreError;
use guardloop_core::Role;

use crate::rows::ConversationTurnRow;
use crate::{now_iso, repos::read_err, repos::write_err};

/// SQL CRUD for the `conversation_history` table.
pub struct ConversationRepository;

impl ConversationRepository {
    /// Append a turn, assigning the next dense turn number.
    ///
    /// Turn numbering is computed inside the INSERT so concurrent appends to
    /// the same conversation cannot leave gaps; the UNIQUE constraint turns
    /// a lost race into a retryable constraint error instead of a duplicate.
    pub fn append_turn(
        conn: &Connection,
        conversation_id: &str,
        role: Role,
        content: &str,
        tokens_used: i64,
    ) -> Result<i64, StoreError> {
        let _ = conn
            .execute(
                "INSERT INTO conversation_history
                 (conversation_id, turn_number, role, content, timestamp, tokens_used)
                 SELECT ?1,
                        COALESCE(MAX(turn_number) + 1, 0),
                        ?2, ?3, ?4, ?5
                 FROM conversation_history WHERE conversation_id = ?1",
                params![conversation_id, role.as_str(), content, now_iso(), tokens_used],
            )
            .map_err(|e| write_err("conversation_history", e))?;

        conn.query_row(
            "SELECT MAX(turn_number) FROM conversation_history WHERE conversation_id = ?1",
            params![conversation_id],
            |r| r.get(0),
        )
        .map_err(|e| read_err("conversation_history", e))
    }

    /// All turns of a conversation in turn order.
    pub fn turns(
        conn: &Connection,
        conversation_id: &str,
    ) -> Result<Vec<ConversationTurnRow>, StoreError> {
        let mut stmt = conn
            .prepare(
                "SELECT * FROM conversation_history
                 WHERE conversation_id = ?1 ORDER BY turn_number",
            )
            .map_err(|e| read_err("conversation_history", e))?;
        let mapped = stmt
            .query_map(params![conversation_id], |row| {
                ConversationTurnRow::from_row(row)
            })
            .map_err(|e| read_err("conversation_history", e))?;
        mapped
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| read_err("conversation_history", e))
    }

    /// Delete a conversation's persisted turns.
    pub fn delete(conn: &Connection, conversation_id: &str) -> Result<usize, StoreError> {
        conn.execute(
            "DELETE FROM conversation_history WHERE conversation_id = ?1",
            params![conversation_id],
        )
        .map_err(|e| write_err("conversation_history", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn turn_numbers_are_dense_from_zero() {
        let (_dir, store) = store();
        let conn = store.conn().unwrap();

        let t0 = ConversationRepository::append_turn(&conn, "c1", Role::User, "hi", 1).unwrap();
        let t1 =
            ConversationRepository::append_turn(&conn, "c1", Role::Assistant, "hello", 2).unwrap();
        let t2 = ConversationRepository::append_turn(&conn, "c1", Role::User, "more", 1).unwrap();

        assert_eq!((t0, t1, t2), (0, 1, 2));

        let turns = ConversationRepository::turns(&conn, "c1").unwrap();
        let numbers: Vec<i64> = turns.iter().map(|t| t.turn_number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
    }

    #[test]
    fn conversations_are_independent() {
        let (_dir, store) = store();
        let conn = store.conn().unwrap();

        let _ = ConversationRepository::append_turn(&conn, "c1", Role::User, "a", 1).unwrap();
        let first_in_c2 =
            ConversationRepository::append_turn(&conn, "c2", Role::User, "b", 1).unwrap();
        assert_eq!(first_in_c2, 0);
    }

    #[test]
    fn delete_removes_all_turns() {
        let (_dir, store) = store();
        let conn = store.conn().unwrap();
        let _ = ConversationRepository::append_turn(&conn, "c1", Role::User, "a", 1).unwrap();
        let _ = ConversationRepository::append_turn(&conn, "c1", Role::Assistant, "b", 1).unwrap();

        assert_eq!(ConversationRepository::delete(&conn, "c1").unwrap(), 2);
        assert!(ConversationRepository::turns(&conn, "c1").unwrap().is_empty());
    }
}
