use rusqlite::params;

use crate::error::Result;
use crate::models::MessageRow;
use crate::users::ensure_user_exists;
use crate::Database;

impl Database {
    /// Persists a direct message. Both identities must exist; the row is
    /// immutable once written.
    pub fn create_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            ensure_user_exists(conn, sender_id)?;
            ensure_user_exists(conn, receiver_id)?;

            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, content) VALUES (?1, ?2, ?3)",
                params![sender_id, receiver_id, content],
            )?;
            let id = conn.last_insert_rowid();
            let row = conn.query_row(
                "SELECT id, sender_id, receiver_id, content, created_at \
                 FROM messages WHERE id = ?1",
                [id],
                map_message_row,
            )?;
            Ok(row)
        })
    }

    /// One page of the conversation between two users: the union of both
    /// directions, oldest first. Symmetric in argument order. Returns the
    /// page plus the total message count.
    pub fn find_conversation(
        &self,
        user_x: i64,
        user_y: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<MessageRow>, i64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages \
                 WHERE (sender_id = ?1 AND receiver_id = ?2) \
                    OR (sender_id = ?2 AND receiver_id = ?1)",
                (user_x, user_y),
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, created_at FROM messages \
                 WHERE (sender_id = ?1 AND receiver_id = ?2) \
                    OR (sender_id = ?2 AND receiver_id = ?1) \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT ?3 OFFSET ?4",
            )?;
            let rows = stmt
                .query_map(params![user_x, user_y, limit, offset], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total))
        })
    }
}

fn map_message_row(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::test_support::{add_user, test_db};
    use crate::StoreError;

    #[test]
    fn message_to_unknown_user_is_not_found() {
        let db = test_db();
        let alice = add_user(&db, "alice", true);

        assert!(matches!(
            db.create_message(alice, 999, "hi"),
            Err(StoreError::UserNotFound(999))
        ));
        assert!(matches!(
            db.create_message(999, alice, "hi"),
            Err(StoreError::UserNotFound(999))
        ));
    }

    #[test]
    fn conversation_unions_both_directions_in_order() {
        let db = test_db();
        let alice = add_user(&db, "alice", true);
        let bob = add_user(&db, "bob", true);
        let carol = add_user(&db, "carol", true);

        db.create_message(alice, bob, "hello").unwrap();
        db.create_message(bob, alice, "hey yourself").unwrap();
        db.create_message(alice, bob, "coffee?").unwrap();
        // Unrelated pair must not leak in.
        db.create_message(alice, carol, "other thread").unwrap();

        let (rows, total) = db.find_conversation(alice, bob, 50, 0).unwrap();
        assert_eq!(total, 3);
        let contents: Vec<&str> = rows.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "hey yourself", "coffee?"]);

        // Symmetric in argument order.
        let (mirrored, mirrored_total) = db.find_conversation(bob, alice, 50, 0).unwrap();
        assert_eq!(mirrored_total, 3);
        let mirrored_ids: Vec<i64> = mirrored.iter().map(|m| m.id).collect();
        let ids: Vec<i64> = rows.iter().map(|m| m.id).collect();
        assert_eq!(mirrored_ids, ids);
    }

    #[test]
    fn conversation_pagination_windows() {
        let db = test_db();
        let alice = add_user(&db, "alice", true);
        let bob = add_user(&db, "bob", true);

        for i in 0..5 {
            db.create_message(alice, bob, &format!("m{i}")).unwrap();
        }

        let (first, total) = db.find_conversation(alice, bob, 2, 0).unwrap();
        let (second, _) = db.find_conversation(alice, bob, 2, 2).unwrap();
        let (last, _) = db.find_conversation(alice, bob, 2, 4).unwrap();

        assert_eq!(total, 5);
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(last.len(), 1);
        assert_eq!(first[0].content, "m0");
        assert_eq!(last[0].content, "m4");
    }
}
