//! secureface-store: SQLite-backed identity store.
//!
//! Two tables: `users` (registered identities, unique `face_id`) and
//! `visitors` (one row per unrecognized-face event). All access goes through
//! a single background connection thread via tokio-rusqlite.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use secureface_core::{
    EmotionScores, IdentityStore, NewUser, NewVisitor, StoreError, User, Visitor,
};
use std::path::Path;
use tokio_rusqlite::Connection;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    age           INTEGER NOT NULL,
    gender        TEXT NOT NULL,
    face_id       TEXT NOT NULL,
    registered_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS users_face_id ON users(face_id);

CREATE TABLE IF NOT EXISTS visitors (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    age              INTEGER,
    gender           TEXT,
    emotion          TEXT NOT NULL,
    dominant_emotion TEXT,
    detected_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS visitors_detected_at ON visitors(detected_at);
";

const USER_COLUMNS: &str = "id, name, age, gender, face_id, registered_at";
const VISITOR_COLUMNS: &str = "id, name, age, gender, emotion, dominant_emotion, detected_at";

/// Identity store on a SQLite database file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `location`.
    ///
    /// Accepts a plain path, a `sqlite://` URL, or `:memory:`.
    pub async fn open(location: &str) -> Result<Self, StoreError> {
        let path = location.strip_prefix("sqlite://").unwrap_or(location);
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(backend)?;
                }
            }
        }
        let conn = Connection::open(path).await.map_err(backend)?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await.map_err(backend)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(backend)?;
        tracing::debug!("identity store schema ready");
        Ok(Self { conn })
    }
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn is_unique_violation(err: &tokio_rusqlite::Error) -> bool {
    matches!(
        err,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        gender: row.get(3)?,
        face_id: row.get(4)?,
        registered_at: row.get(5)?,
    })
}

fn visitor_from_row(row: &Row<'_>) -> rusqlite::Result<Visitor> {
    let emotion_json: String = row.get(4)?;
    let emotion: EmotionScores = serde_json::from_str(&emotion_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Visitor {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        gender: row.get(3)?,
        emotion,
        dominant_emotion: row.get(5)?,
        detected_at: row.get(6)?,
    })
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn find_user_by_face(&self, face_id: &str) -> Result<Option<User>, StoreError> {
        let face_id = face_id.to_string();
        self.conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE face_id = ?1"),
                        params![face_id],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await
            .map_err(backend)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: user.name,
            age: user.age,
            gender: user.gender,
            face_id: user.face_id,
            registered_at: Utc::now(),
        };
        let row = user.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                    params![row.id, row.name, row.age, row.gender, row.face_id, row.registered_at],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateFace(user.face_id.clone())
                } else {
                    backend(e)
                }
            })?;
        Ok(user)
    }

    async fn insert_visitor(&self, mut visitor: NewVisitor) -> Result<Visitor, StoreError> {
        // Non-finite scores serialize as null and would poison every later read.
        visitor.emotion.retain_finite();
        let emotion_json = serde_json::to_string(&visitor.emotion).map_err(backend)?;
        let visitor = Visitor {
            id: Uuid::new_v4().to_string(),
            name: visitor.name,
            age: visitor.age,
            gender: visitor.gender,
            emotion: visitor.emotion,
            dominant_emotion: visitor.dominant_emotion,
            detected_at: Utc::now(),
        };
        let row = visitor.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO visitors ({VISITOR_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                    ),
                    params![
                        row.id,
                        row.name,
                        row.age,
                        row.gender,
                        emotion_json,
                        row.dominant_emotion,
                        row.detected_at
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(backend)?;
        Ok(visitor)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {USER_COLUMNS} FROM users ORDER BY registered_at, rowid"
                ))?;
                let users = stmt
                    .query_map([], user_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(users)
            })
            .await
            .map_err(backend)
    }

    async fn recent_visitors(&self, limit: usize) -> Result<Vec<Visitor>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {VISITOR_COLUMNS} FROM visitors \
                     ORDER BY detected_at DESC, rowid DESC LIMIT ?1"
                ))?;
                let visitors = stmt
                    .query_map(params![limit], visitor_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(visitors)
            })
            .await
            .map_err(backend)
    }
}
