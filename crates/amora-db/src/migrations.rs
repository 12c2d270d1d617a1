use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            username            TEXT NOT NULL UNIQUE,
            email               TEXT NOT NULL UNIQUE,
            password_hash       TEXT NOT NULL,
            full_name           TEXT,
            bio                 TEXT,
            gender              TEXT,
            date_of_birth       TEXT,
            city                TEXT,
            country             TEXT,
            profile_picture_url TEXT,
            verified            INTEGER NOT NULL DEFAULT 0,
            verification_notes  TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS likes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            liker_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            liked_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(liker_id, liked_id)
        );

        CREATE INDEX IF NOT EXISTS idx_likes_liked
            ON likes(liked_id, created_at);

        CREATE TABLE IF NOT EXISTS connection_requests (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            receiver_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status      TEXT NOT NULL DEFAULT 'PENDING',
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(sender_id, receiver_id)
        );

        CREATE INDEX IF NOT EXISTS idx_requests_receiver
            ON connection_requests(receiver_id, created_at);

        -- Rows are stored canonically with user_a_id < user_b_id; the unique
        -- constraint on the canonical pair backstops concurrent reconciliation.
        CREATE TABLE IF NOT EXISTS matches (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_a_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            user_b_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            matched_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_a_id, user_b_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            receiver_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
