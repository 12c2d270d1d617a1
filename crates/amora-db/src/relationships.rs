//! The relationship ledger (likes, connection requests) and the match
//! reconciler. A match row materializes exactly when a like becomes
//! reciprocal or a connection request is accepted, at most once per
//! unordered pair.

use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{is_unique_violation, Result, StoreError};
use crate::models::{
    ConnectionRequestRow, LikeReceivedRow, LikeRow, MatchPartnerRow, MatchRow, RequestReceivedRow,
    RequestStatus,
};
use crate::users::ensure_user_exists;
use crate::Database;

/// Outcome of a successful like insert. `new_match` is set when this like
/// completed a reciprocal pair.
#[derive(Debug)]
pub struct LikeCreated {
    pub like: LikeRow,
    pub new_match: Option<MatchRow>,
}

/// Outcome of accepting a connection request. `new_match` is `None` when
/// the pair was already matched (e.g. via reciprocal likes, or a re-accept).
#[derive(Debug)]
pub struct RequestAccepted {
    pub request: ConnectionRequestRow,
    pub new_match: Option<MatchRow>,
}

impl Database {
    /// Records that `liker_id` likes `liked_id`. Returns `Ok(None)` when the
    /// ordered pair already exists. When the reverse like is present, the
    /// match is materialized in the same transaction as the like insert.
    pub fn create_like(&self, liker_id: i64, liked_id: i64) -> Result<Option<LikeCreated>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            ensure_user_exists(&tx, liker_id)?;
            ensure_user_exists(&tx, liked_id)?;

            let duplicate: Option<i64> = tx
                .query_row(
                    "SELECT id FROM likes WHERE liker_id = ?1 AND liked_id = ?2",
                    (liker_id, liked_id),
                    |row| row.get(0),
                )
                .optional()?;
            if duplicate.is_some() {
                return Ok(None);
            }

            if let Err(e) = tx.execute(
                "INSERT INTO likes (liker_id, liked_id) VALUES (?1, ?2)",
                (liker_id, liked_id),
            ) {
                // Lost a concurrent race for the same ordered pair.
                if is_unique_violation(&e) {
                    return Ok(None);
                }
                return Err(e.into());
            }
            let like = query_like(&tx, tx.last_insert_rowid())?
                .ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;

            let reciprocal: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM likes WHERE liker_id = ?1 AND liked_id = ?2)",
                (liked_id, liker_id),
                |row| row.get(0),
            )?;
            let new_match = if reciprocal {
                create_match_if_absent(&tx, liker_id, liked_id)?
            } else {
                None
            };

            tx.commit()?;
            Ok(Some(LikeCreated { like, new_match }))
        })
    }

    /// Records a pending connection request. Returns `Ok(None)` when the
    /// ordered pair already exists; the reverse direction is a distinct
    /// request.
    pub fn create_connection_request(
        &self,
        sender_id: i64,
        receiver_id: i64,
    ) -> Result<Option<ConnectionRequestRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            ensure_user_exists(&tx, sender_id)?;
            ensure_user_exists(&tx, receiver_id)?;

            let duplicate: Option<i64> = tx
                .query_row(
                    "SELECT id FROM connection_requests \
                     WHERE sender_id = ?1 AND receiver_id = ?2",
                    (sender_id, receiver_id),
                    |row| row.get(0),
                )
                .optional()?;
            if duplicate.is_some() {
                return Ok(None);
            }

            if let Err(e) = tx.execute(
                "INSERT INTO connection_requests (sender_id, receiver_id) VALUES (?1, ?2)",
                (sender_id, receiver_id),
            ) {
                if is_unique_violation(&e) {
                    return Ok(None);
                }
                return Err(e.into());
            }
            let request = query_request(&tx, tx.last_insert_rowid())?
                .ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;

            tx.commit()?;
            Ok(Some(request))
        })
    }

    pub fn get_connection_request(&self, id: i64) -> Result<Option<ConnectionRequestRow>> {
        self.with_conn(|conn| query_request(conn, id))
    }

    /// Marks the request ACCEPTED and materializes the match for
    /// (sender, receiver) atomically. Only the receiver may accept;
    /// re-accepting an already accepted request is a no-op for the match.
    pub fn accept_connection_request(
        &self,
        request_id: i64,
        acting_user_id: i64,
    ) -> Result<RequestAccepted> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let request = query_request(&tx, request_id)?
                .ok_or(StoreError::RequestNotFound(request_id))?;
            if request.receiver_id != acting_user_id {
                return Err(StoreError::NotReceiver {
                    request_id,
                    user_id: acting_user_id,
                });
            }

            tx.execute(
                "UPDATE connection_requests SET status = ?1 WHERE id = ?2",
                (RequestStatus::Accepted, request_id),
            )?;
            let new_match = create_match_if_absent(&tx, request.sender_id, request.receiver_id)?;
            let request = query_request(&tx, request_id)?
                .ok_or(StoreError::RequestNotFound(request_id))?;

            tx.commit()?;
            Ok(RequestAccepted { request, new_match })
        })
    }

    /// Deletes the request. Only the receiver may decline; no match side
    /// effect.
    pub fn decline_connection_request(&self, request_id: i64, acting_user_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let request = query_request(conn, request_id)?
                .ok_or(StoreError::RequestNotFound(request_id))?;
            if request.receiver_id != acting_user_id {
                return Err(StoreError::NotReceiver {
                    request_id,
                    user_id: acting_user_id,
                });
            }
            conn.execute(
                "DELETE FROM connection_requests WHERE id = ?1",
                [request_id],
            )?;
            Ok(())
        })
    }

    /// The match row for an unordered pair, if any. Looks up the canonical
    /// direction only.
    pub fn match_between(&self, user_x: i64, user_y: i64) -> Result<Option<MatchRow>> {
        let (a, b) = (user_x.min(user_y), user_x.max(user_y));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_a_id, user_b_id, matched_at FROM matches \
                 WHERE user_a_id = ?1 AND user_b_id = ?2",
            )?;
            Ok(stmt.query_row((a, b), map_match_row).optional()?)
        })
    }

    /// Matched partners of a user, newest match first.
    pub fn match_partners(&self, user_id: i64) -> Result<Vec<MatchPartnerRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, \
                        CASE WHEN m.user_a_id = ?1 THEN m.user_b_id ELSE m.user_a_id END, \
                        u.username, m.matched_at \
                 FROM matches m \
                 JOIN users u \
                   ON u.id = CASE WHEN m.user_a_id = ?1 THEN m.user_b_id ELSE m.user_a_id END \
                 WHERE m.user_a_id = ?1 OR m.user_b_id = ?1 \
                 ORDER BY m.matched_at DESC, m.id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(MatchPartnerRow {
                        match_id: row.get(0)?,
                        partner_id: row.get(1)?,
                        partner_username: row.get(2)?,
                        matched_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Likes received by a user, with the liker's username, newest first.
    pub fn likes_received(&self, user_id: i64) -> Result<Vec<LikeReceivedRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT l.id, l.liker_id, u.username, l.created_at \
                 FROM likes l JOIN users u ON u.id = l.liker_id \
                 WHERE l.liked_id = ?1 \
                 ORDER BY l.created_at DESC, l.id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(LikeReceivedRow {
                        id: row.get(0)?,
                        liker_id: row.get(1)?,
                        liker_username: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Ids of every profile the user has liked.
    pub fn liked_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT liked_id FROM likes WHERE liker_id = ?1 ORDER BY id")?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Connection requests received by a user, with the sender's username,
    /// newest first.
    pub fn requests_received(&self, user_id: i64) -> Result<Vec<RequestReceivedRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.sender_id, u.username, r.status, r.created_at \
                 FROM connection_requests r JOIN users u ON u.id = r.sender_id \
                 WHERE r.receiver_id = ?1 \
                 ORDER BY r.created_at DESC, r.id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(RequestReceivedRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        sender_username: row.get(2)?,
                        status: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Ids of every profile the user has sent a connection request to.
    pub fn requested_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT receiver_id FROM connection_requests WHERE sender_id = ?1 ORDER BY id",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }
}

/// Match reconciler. Canonicalizes the unordered pair by numeric id
/// ordering, checks the canonical direction only (the sole storage
/// direction), and inserts when absent. A concurrent attempt losing the
/// race hits the unique constraint and reports "already matched" instead
/// of an error.
fn create_match_if_absent(conn: &Connection, user_x: i64, user_y: i64) -> Result<Option<MatchRow>> {
    let (a, b) = (user_x.min(user_y), user_x.max(user_y));

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM matches WHERE user_a_id = ?1 AND user_b_id = ?2)",
        (a, b),
        |row| row.get(0),
    )?;
    if exists {
        return Ok(None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO matches (user_a_id, user_b_id) VALUES (?1, ?2)",
        (a, b),
    ) {
        if is_unique_violation(&e) {
            return Ok(None);
        }
        return Err(e.into());
    }

    let mut stmt = conn.prepare(
        "SELECT id, user_a_id, user_b_id, matched_at FROM matches WHERE id = ?1",
    )?;
    let row = stmt.query_row([conn.last_insert_rowid()], map_match_row)?;
    Ok(Some(row))
}

fn query_like(conn: &Connection, id: i64) -> Result<Option<LikeRow>> {
    let mut stmt =
        conn.prepare("SELECT id, liker_id, liked_id, created_at FROM likes WHERE id = ?1")?;
    let row = stmt
        .query_row([id], |row| {
            Ok(LikeRow {
                id: row.get(0)?,
                liker_id: row.get(1)?,
                liked_id: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn query_request(conn: &Connection, id: i64) -> Result<Option<ConnectionRequestRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, receiver_id, status, created_at \
         FROM connection_requests WHERE id = ?1",
    )?;
    let row = stmt
        .query_row([id], |row| {
            Ok(ConnectionRequestRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn map_match_row(row: &Row) -> rusqlite::Result<MatchRow> {
    Ok(MatchRow {
        id: row.get(0)?,
        user_a_id: row.get(1)?,
        user_b_id: row.get(2)?,
        matched_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::test_support::{add_user, test_db};

    #[test]
    fn like_unknown_user_is_not_found() {
        let db = test_db();
        let alice = add_user(&db, "alice", true);

        assert!(matches!(
            db.create_like(alice, 999),
            Err(StoreError::UserNotFound(999))
        ));
        assert!(matches!(
            db.create_like(999, alice),
            Err(StoreError::UserNotFound(999))
        ));
    }

    #[test]
    fn duplicate_like_is_suppressed() {
        let db = test_db();
        let alice = add_user(&db, "alice", true);
        let bob = add_user(&db, "bob", true);

        let first = db.create_like(alice, bob).unwrap();
        assert!(first.is_some());

        for _ in 0..3 {
            assert!(db.create_like(alice, bob).unwrap().is_none());
        }
        assert_eq!(db.liked_ids(alice).unwrap(), vec![bob]);
    }

    #[test]
    fn one_sided_like_creates_no_match() {
        let db = test_db();
        let alice = add_user(&db, "alice", true);
        let bob = add_user(&db, "bob", true);

        let created = db.create_like(alice, bob).unwrap().expect("created");
        assert!(created.new_match.is_none());
        assert!(db.match_between(alice, bob).unwrap().is_none());
    }

    #[test]
    fn reciprocal_like_creates_match_once() {
        let db = test_db();
        let alice = add_user(&db, "alice", true);
        let bob = add_user(&db, "bob", true);

        db.create_like(alice, bob).unwrap();
        let second = db.create_like(bob, alice).unwrap().expect("created");
        let m = second.new_match.expect("match materialized");

        // Canonical storage direction: smaller id first.
        assert_eq!(m.user_a_id, alice.min(bob));
        assert_eq!(m.user_b_id, alice.max(bob));

        // Retrying the like reports duplicate and leaves the single match.
        assert!(db.create_like(bob, alice).unwrap().is_none());
        let found = db.match_between(bob, alice).unwrap().expect("match");
        assert_eq!(found.id, m.id);
    }

    #[test]
    fn accept_creates_match_and_sets_status() {
        let db = test_db();
        let sender = add_user(&db, "sender", true);
        let receiver = add_user(&db, "receiver", true);

        let request = db
            .create_connection_request(sender, receiver)
            .unwrap()
            .expect("created");
        assert_eq!(request.status, RequestStatus::Pending);

        let accepted = db.accept_connection_request(request.id, receiver).unwrap();
        assert_eq!(accepted.request.status, RequestStatus::Accepted);
        assert!(accepted.new_match.is_some());
        assert!(db.match_between(sender, receiver).unwrap().is_some());
    }

    #[test]
    fn accept_by_non_receiver_is_rejected_without_side_effects() {
        let db = test_db();
        let sender = add_user(&db, "sender", true);
        let receiver = add_user(&db, "receiver", true);
        let outsider = add_user(&db, "outsider", true);

        let request = db
            .create_connection_request(sender, receiver)
            .unwrap()
            .expect("created");

        for actor in [sender, outsider] {
            assert!(matches!(
                db.accept_connection_request(request.id, actor),
                Err(StoreError::NotReceiver { .. })
            ));
        }

        let unchanged = db.get_connection_request(request.id).unwrap().expect("row");
        assert_eq!(unchanged.status, RequestStatus::Pending);
        assert!(db.match_between(sender, receiver).unwrap().is_none());
    }

    #[test]
    fn accept_after_reciprocal_likes_reuses_match() {
        let db = test_db();
        let sender = add_user(&db, "sender", true);
        let receiver = add_user(&db, "receiver", true);

        db.create_like(sender, receiver).unwrap();
        let existing = db
            .create_like(receiver, sender)
            .unwrap()
            .expect("created")
            .new_match
            .expect("match");

        let request = db
            .create_connection_request(sender, receiver)
            .unwrap()
            .expect("created");
        let accepted = db.accept_connection_request(request.id, receiver).unwrap();

        assert!(accepted.new_match.is_none());
        let found = db.match_between(sender, receiver).unwrap().expect("match");
        assert_eq!(found.id, existing.id);
    }

    #[test]
    fn re_accept_is_idempotent() {
        let db = test_db();
        let sender = add_user(&db, "sender", true);
        let receiver = add_user(&db, "receiver", true);

        let request = db
            .create_connection_request(sender, receiver)
            .unwrap()
            .expect("created");
        let first = db.accept_connection_request(request.id, receiver).unwrap();
        assert!(first.new_match.is_some());

        let again = db.accept_connection_request(request.id, receiver).unwrap();
        assert_eq!(again.request.status, RequestStatus::Accepted);
        assert!(again.new_match.is_none());
    }

    #[test]
    fn decline_removes_request_permanently() {
        let db = test_db();
        let sender = add_user(&db, "sender", true);
        let receiver = add_user(&db, "receiver", true);

        let request = db
            .create_connection_request(sender, receiver)
            .unwrap()
            .expect("created");

        assert!(matches!(
            db.decline_connection_request(request.id, sender),
            Err(StoreError::NotReceiver { .. })
        ));
        db.decline_connection_request(request.id, receiver).unwrap();

        assert!(db.get_connection_request(request.id).unwrap().is_none());
        assert!(matches!(
            db.accept_connection_request(request.id, receiver),
            Err(StoreError::RequestNotFound(_))
        ));
        assert!(matches!(
            db.decline_connection_request(request.id, receiver),
            Err(StoreError::RequestNotFound(_))
        ));
        assert!(db.match_between(sender, receiver).unwrap().is_none());
    }

    #[test]
    fn duplicate_request_suppressed_but_reverse_allowed() {
        let db = test_db();
        let alice = add_user(&db, "alice", true);
        let bob = add_user(&db, "bob", true);

        assert!(db.create_connection_request(alice, bob).unwrap().is_some());
        assert!(db.create_connection_request(alice, bob).unwrap().is_none());
        assert!(db.create_connection_request(bob, alice).unwrap().is_some());
    }

    #[test]
    fn match_partners_lists_both_sides() {
        let db = test_db();
        let alice = add_user(&db, "alice", true);
        let bob = add_user(&db, "bob", true);
        let carol = add_user(&db, "carol", true);

        db.create_like(alice, bob).unwrap();
        db.create_like(bob, alice).unwrap();
        db.create_like(carol, alice).unwrap();
        db.create_like(alice, carol).unwrap();

        let partners = db.match_partners(alice).unwrap();
        let mut names: Vec<&str> = partners
            .iter()
            .map(|p| p.partner_username.as_str())
            .collect();
        names.sort();
        assert_eq!(names, vec!["bob", "carol"]);

        let bobs = db.match_partners(bob).unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].partner_id, alice);
    }

    #[test]
    fn activity_feeds_join_usernames() {
        let db = test_db();
        let alice = add_user(&db, "alice", true);
        let bob = add_user(&db, "bob", true);
        let carol = add_user(&db, "carol", true);

        db.create_like(bob, alice).unwrap();
        db.create_like(carol, alice).unwrap();
        db.create_connection_request(carol, alice).unwrap();

        let likes = db.likes_received(alice).unwrap();
        assert_eq!(likes.len(), 2);
        assert!(likes.iter().any(|l| l.liker_username == "bob"));
        assert!(likes.iter().any(|l| l.liker_username == "carol"));

        let requests = db.requests_received(alice).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].sender_username, "carol");
        assert_eq!(requests[0].status, RequestStatus::Pending);

        assert_eq!(db.requested_ids(carol).unwrap(), vec![alice]);
        assert!(db.requested_ids(alice).unwrap().is_empty());
    }

    #[test]
    fn cascade_on_user_delete_clears_relationship_rows() {
        let db = test_db();
        let alice = add_user(&db, "alice", true);
        let bob = add_user(&db, "bob", true);

        db.create_like(alice, bob).unwrap();
        db.create_like(bob, alice).unwrap();
        assert!(db.match_between(alice, bob).unwrap().is_some());

        db.delete_user(bob).unwrap();
        assert!(db.match_between(alice, bob).unwrap().is_none());
        assert!(db.liked_ids(alice).unwrap().is_empty());
        assert!(db.likes_received(alice).unwrap().is_empty());
    }
}
