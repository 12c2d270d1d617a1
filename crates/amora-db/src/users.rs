use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{is_unique_violation, Result, StoreError};
use crate::models::{NewUser, UserRow, UserUpdate};
use crate::Database;

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, bio, gender, \
     date_of_birth, city, country, profile_picture_url, verified, verification_notes, \
     created_at, updated_at";

impl Database {
    pub fn create_user(&self, new: NewUser) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, email, password_hash, full_name, bio, gender, \
                 date_of_birth, city, country, profile_picture_url) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    new.username,
                    new.email,
                    new.password_hash,
                    new.full_name,
                    new.bio,
                    new.gender,
                    new.date_of_birth,
                    new.city,
                    new.country,
                    new.profile_picture_url,
                ],
            );
            if let Err(e) = inserted {
                if is_unique_violation(&e) {
                    return Err(StoreError::Conflict(
                        "username or email already in use".into(),
                    ));
                }
                return Err(e.into());
            }
            let id = conn.last_insert_rowid();
            query_user(conn, id)?.ok_or(StoreError::UserNotFound(id))
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"))?;
            Ok(stmt.query_row([username], map_user_row).optional()?)
        })
    }

    /// Discovery feed: verified profiles other than the caller's, newest
    /// first. Returns the page plus the total row count for the pagination
    /// headers.
    pub fn list_users_excluding(
        &self,
        excluded_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UserRow>, i64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE id <> ?1 AND verified = 1",
                [excluded_id],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users \
                 WHERE id <> ?1 AND verified = 1 \
                 ORDER BY created_at DESC, id DESC \
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(params![excluded_id, limit, offset], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total))
        })
    }

    pub fn update_user(&self, id: i64, update: UserUpdate) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            if !user_exists(conn, id)? {
                return Err(StoreError::UserNotFound(id));
            }
            let updated = conn.execute(
                "UPDATE users SET username = ?1, email = ?2, \
                 password_hash = COALESCE(?3, password_hash), full_name = ?4, bio = ?5, \
                 gender = ?6, date_of_birth = ?7, city = ?8, country = ?9, \
                 profile_picture_url = ?10, updated_at = datetime('now') \
                 WHERE id = ?11",
                params![
                    update.username,
                    update.email,
                    update.password_hash,
                    update.full_name,
                    update.bio,
                    update.gender,
                    update.date_of_birth,
                    update.city,
                    update.country,
                    update.profile_picture_url,
                    id,
                ],
            );
            if let Err(e) = updated {
                if is_unique_violation(&e) {
                    return Err(StoreError::Conflict(
                        "username or email already in use".into(),
                    ));
                }
                return Err(e.into());
            }
            query_user(conn, id)?.ok_or(StoreError::UserNotFound(id))
        })
    }

    pub fn set_verification(
        &self,
        id: i64,
        verified: bool,
        notes: Option<String>,
    ) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET verified = ?1, verification_notes = ?2, \
                 updated_at = datetime('now') WHERE id = ?3",
                params![verified, notes, id],
            )?;
            if changed == 0 {
                return Err(StoreError::UserNotFound(id));
            }
            query_user(conn, id)?.ok_or(StoreError::UserNotFound(id))
        })
    }

    /// Removes the profile and, via cascade, every like, request, match and
    /// message that references it.
    pub fn delete_user(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(StoreError::UserNotFound(id));
            }
            Ok(())
        })
    }
}

pub(crate) fn user_exists(conn: &Connection, id: i64) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn ensure_user_exists(conn: &Connection, id: i64) -> Result<()> {
    if user_exists(conn, id)? {
        Ok(())
    } else {
        Err(StoreError::UserNotFound(id))
    }
}

fn query_user(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
    Ok(stmt.query_row([id], map_user_row).optional()?)
}

fn map_user_row(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        full_name: row.get(4)?,
        bio: row.get(5)?,
        gender: row.get(6)?,
        date_of_birth: row.get(7)?,
        city: row.get(8)?,
        country: row.get(9)?,
        profile_picture_url: row.get(10)?,
        verified: row.get(11)?,
        verification_notes: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn test_db() -> Database {
        Database::open_in_memory().expect("in-memory store")
    }

    pub fn add_user(db: &Database, username: &str, verified: bool) -> i64 {
        let row = db
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: "$argon2id$stub".to_string(),
                full_name: None,
                bio: None,
                gender: None,
                date_of_birth: None,
                city: None,
                country: None,
                profile_picture_url: None,
            })
            .expect("create user");
        if verified {
            db.set_verification(row.id, true, None).expect("verify");
        }
        row.id
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{add_user, test_db};
    use super::*;

    #[test]
    fn create_and_fetch_user() {
        let db = test_db();
        let id = add_user(&db, "alice", false);

        let user = db.get_user(id).unwrap().expect("row");
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
        assert!(!user.verified);

        let by_name = db.get_user_by_username("alice").unwrap().expect("row");
        assert_eq!(by_name.id, id);
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_conflict() {
        let db = test_db();
        add_user(&db, "alice", false);

        let err = db
            .create_user(NewUser {
                username: "alice".to_string(),
                email: "other@example.com".to_string(),
                password_hash: "$argon2id$stub".to_string(),
                full_name: None,
                bio: None,
                gender: None,
                date_of_birth: None,
                city: None,
                country: None,
                profile_picture_url: None,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn update_preserves_password_when_absent() {
        let db = test_db();
        let id = add_user(&db, "alice", false);
        let before = db.get_user(id).unwrap().unwrap();

        let updated = db
            .update_user(
                id,
                UserUpdate {
                    username: "alice".to_string(),
                    email: "alice@example.com".to_string(),
                    password_hash: None,
                    full_name: Some("Alice L".to_string()),
                    bio: Some("hello".to_string()),
                    gender: None,
                    date_of_birth: Some("1994-03-02".to_string()),
                    city: Some("Lisbon".to_string()),
                    country: None,
                    profile_picture_url: None,
                },
            )
            .unwrap();

        assert_eq!(updated.full_name.as_deref(), Some("Alice L"));
        assert_eq!(updated.date_of_birth.as_deref(), Some("1994-03-02"));
        assert_eq!(updated.password_hash, before.password_hash);

        let rehashed = db
            .update_user(
                id,
                UserUpdate {
                    username: "alice".to_string(),
                    email: "alice@example.com".to_string(),
                    password_hash: Some("$argon2id$new".to_string()),
                    full_name: None,
                    bio: None,
                    gender: None,
                    date_of_birth: None,
                    city: None,
                    country: None,
                    profile_picture_url: None,
                },
            )
            .unwrap();
        assert_eq!(rehashed.password_hash, "$argon2id$new");
    }

    #[test]
    fn update_unknown_user_is_not_found() {
        let db = test_db();
        let err = db
            .update_user(
                999,
                UserUpdate {
                    username: "ghost".to_string(),
                    email: "ghost@example.com".to_string(),
                    password_hash: None,
                    full_name: None,
                    bio: None,
                    gender: None,
                    date_of_birth: None,
                    city: None,
                    country: None,
                    profile_picture_url: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(999)));
    }

    #[test]
    fn verification_flag_round_trip() {
        let db = test_db();
        let id = add_user(&db, "alice", false);

        let verified = db
            .set_verification(id, true, Some("documents checked".to_string()))
            .unwrap();
        assert!(verified.verified);
        assert_eq!(
            verified.verification_notes.as_deref(),
            Some("documents checked")
        );

        let unverified = db.set_verification(id, false, None).unwrap();
        assert!(!unverified.verified);
    }

    #[test]
    fn discovery_excludes_caller_and_unverified() {
        let db = test_db();
        let me = add_user(&db, "me", true);
        add_user(&db, "seen", true);
        add_user(&db, "hidden", false);

        let (page, total) = db.list_users_excluding(me, 10, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].username, "seen");
    }

    #[test]
    fn discovery_pagination_windows() {
        let db = test_db();
        let me = add_user(&db, "me", true);
        for i in 0..5 {
            add_user(&db, &format!("user{i}"), true);
        }

        let (first, total) = db.list_users_excluding(me, 2, 0).unwrap();
        let (second, _) = db.list_users_excluding(me, 2, 2).unwrap();
        let (last, _) = db.list_users_excluding(me, 2, 4).unwrap();
        assert_eq!(total, 5);
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(last.len(), 1);

        let mut ids: Vec<i64> = first
            .iter()
            .chain(second.iter())
            .chain(last.iter())
            .map(|u| u.id)
            .collect();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn delete_user_removes_row() {
        let db = test_db();
        let id = add_user(&db, "alice", false);
        db.delete_user(id).unwrap();
        assert!(db.get_user(id).unwrap().is_none());
        assert!(matches!(
            db.delete_user(id),
            Err(StoreError::UserNotFound(_))
        ));
    }
}
