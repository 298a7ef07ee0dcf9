//! SQLite schema and queries for account-scoped data.
//!
//! Tables: `users`, `sessions`, `saves` (append-only history, versioned per
//! account), `leaderboard`, `achievements`, `user_achievements`.

use crate::error::PersistError;
use crate::manager::SaveReceipt;
use chrono::Utc;
use lifequest_core::PlayerInfo;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

/// Achievements seeded on first migration: (id, title, description).
pub const DEFAULT_ACHIEVEMENTS: &[(&str, &str, &str)] = &[
    ("first_quest", "First Steps", "Complete your first quest"),
    ("park_unlocked", "Fresh Air", "Unlock the Park"),
    ("home_unlocked", "Home Sweet Home", "Unlock Home"),
    ("battle_ready", "Battle Ready", "Unlock the Battle arena"),
    ("level_5", "Growing Up", "Reach level 5"),
];

#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct UserRow {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub salt: String,
    pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct SessionRow {
    pub token: String,
    pub email: String,
    pub expires_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSave {
    pub version: u64,
    pub timestamp: i64,
    pub player_info: PlayerInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: i64,
    pub submitted_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockedAchievement {
    pub achievement: Achievement,
    pub unlocked_at: i64,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Open (creating if needed) and migrate the database at `url`.
///
/// In-memory URLs get a single connection so every query sees the same
/// database.
pub async fn init_db(url: &str) -> Result<SqlitePool, PersistError> {
    let opts = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let in_memory = url.contains(":memory:");
    let mut pool_opts = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
    if in_memory {
        pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
    }
    let pool = pool_opts.connect_with(opts).await?;
    migrate(&pool).await?;
    info!(%url, "database ready");
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<(), PersistError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            email TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            salt TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            email TEXT NOT NULL REFERENCES users(email) ON DELETE CASCADE,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS saves (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL REFERENCES users(email) ON DELETE CASCADE,
            version INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            snapshot TEXT NOT NULL,
            UNIQUE(email, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leaderboard (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL REFERENCES users(email) ON DELETE CASCADE,
            score INTEGER NOT NULL,
            submitted_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS achievements (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_achievements (
            email TEXT NOT NULL REFERENCES users(email) ON DELETE CASCADE,
            achievement_id TEXT NOT NULL REFERENCES achievements(id),
            unlocked_at INTEGER NOT NULL,
            PRIMARY KEY (email, achievement_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    for (id, title, description) in DEFAULT_ACHIEVEMENTS {
        sqlx::query("INSERT OR IGNORE INTO achievements (id, title, description) VALUES (?, ?, ?)")
            .bind(*id)
            .bind(*title)
            .bind(*description)
            .execute(pool)
            .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Users and sessions
// ---------------------------------------------------------------------------

/// Insert a user; returns `false` when the email is already registered.
pub async fn create_user(
    pool: &SqlitePool,
    email: &str,
    name: &str,
    password_hash: &str,
    salt: &str,
) -> Result<bool, PersistError> {
    let res = sqlx::query(
        "INSERT OR IGNORE INTO users (email, name, password_hash, salt, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(email)
    .bind(name)
    .bind(password_hash)
    .bind(salt)
    .bind(now_millis())
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn find_user(pool: &SqlitePool, email: &str) -> Result<Option<UserRow>, PersistError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT email, name, password_hash, salt, created_at FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn update_user_name(pool: &SqlitePool, email: &str, name: &str) -> Result<bool, PersistError> {
    let res = sqlx::query("UPDATE users SET name = ? WHERE email = ?")
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() == 1)
}

/// Remove an account together with its sessions, saves, scores and unlocks.
pub async fn delete_user(pool: &SqlitePool, email: &str) -> Result<bool, PersistError> {
    let mut tx = pool.begin().await?;
    for table in ["sessions", "saves", "leaderboard", "user_achievements"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE email = ?"))
            .bind(email)
            .execute(&mut *tx)
            .await?;
    }
    let res = sqlx::query("DELETE FROM users WHERE email = ?")
        .bind(email)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(res.rows_affected() == 1)
}

pub async fn create_session(
    pool: &SqlitePool,
    token: &str,
    email: &str,
    expires_at: i64,
) -> Result<(), PersistError> {
    sqlx::query("INSERT INTO sessions (token, email, expires_at) VALUES (?, ?, ?)")
        .bind(token)
        .bind(email)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Look up an unexpired session.
pub async fn find_session(pool: &SqlitePool, token: &str) -> Result<Option<SessionRow>, PersistError> {
    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT token, email, expires_at FROM sessions WHERE token = ? AND expires_at > ?",
    )
    .bind(token)
    .bind(now_millis())
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn purge_expired_sessions(pool: &SqlitePool) -> Result<u64, PersistError> {
    let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now_millis())
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

// ---------------------------------------------------------------------------
// Saves
// ---------------------------------------------------------------------------

/// Largest version the `saves` table can hold.
pub const MAX_SAVE_VERSION: u64 = i64::MAX as u64;

fn version_to_sql(version: u64) -> Result<i64, PersistError> {
    i64::try_from(version).map_err(|_| PersistError::VersionOutOfRange(version))
}

/// A unique-key clash on `(email, version)` means a concurrent save claimed
/// the version first.
fn conflict_as_stale(e: sqlx::Error, email: &str, attempted: u64) -> PersistError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => PersistError::StaleWrite {
            key: email.to_string(),
            stored: attempted,
            attempted,
        },
        _ => PersistError::Db(e),
    }
}

/// Append a save for `email`.
///
/// Without an explicit `version` the next version is used. An explicit
/// version not greater than the latest stored one is rejected as stale, and
/// one above [`MAX_SAVE_VERSION`] is rejected as out of range.
pub async fn create_save(
    pool: &SqlitePool,
    email: &str,
    player: &PlayerInfo,
    version: Option<u64>,
) -> Result<SaveReceipt, PersistError> {
    if let Some(v) = version {
        version_to_sql(v)?;
    }
    let snapshot = serde_json::to_string(player)?;
    let mut tx = pool.begin().await?;
    let latest: Option<i64> = sqlx::query("SELECT MAX(version) AS v FROM saves WHERE email = ?")
        .bind(email)
        .fetch_one(&mut *tx)
        .await?
        .try_get("v")?;
    let stored = stored_version(latest)?;
    let version = match version {
        Some(v) if v <= stored => {
            return Err(PersistError::StaleWrite {
                key: email.to_string(),
                stored,
                attempted: v,
            })
        }
        Some(v) => v,
        None => stored.checked_add(1).ok_or(PersistError::VersionOutOfRange(stored))?,
    };
    let timestamp = now_millis();
    sqlx::query("INSERT INTO saves (email, version, timestamp, snapshot) VALUES (?, ?, ?, ?)")
        .bind(email)
        .bind(version_to_sql(version)?)
        .bind(timestamp)
        .bind(&snapshot)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_as_stale(e, email, version))?;
    tx.commit().await?;
    debug!(%email, version, "server save stored");
    Ok(SaveReceipt { version, timestamp })
}

fn stored_version(raw: Option<i64>) -> Result<u64, PersistError> {
    match raw {
        None => Ok(0),
        Some(v) => u64::try_from(v).map_err(|_| PersistError::Corrupt {
            key: "saves.version".to_string(),
            reason: format!("negative version {v}"),
        }),
    }
}

fn decode_save(email: &str, row: &sqlx::sqlite::SqliteRow) -> Result<StoredSave, PersistError> {
    let version: i64 = row.try_get("version")?;
    let timestamp: i64 = row.try_get("timestamp")?;
    let snapshot: String = row.try_get("snapshot")?;
    let key = format!("{email}@v{version}");
    let version = u64::try_from(version).map_err(|_| PersistError::Corrupt {
        key: key.clone(),
        reason: format!("negative version {version}"),
    })?;
    let player_info = serde_json::from_str(&snapshot).map_err(|e| PersistError::Corrupt {
        key,
        reason: e.to_string(),
    })?;
    Ok(StoredSave {
        version,
        timestamp,
        player_info,
    })
}

pub async fn latest_save(pool: &SqlitePool, email: &str) -> Result<Option<StoredSave>, PersistError> {
    let row = sqlx::query(
        "SELECT version, timestamp, snapshot FROM saves WHERE email = ? ORDER BY version DESC LIMIT 1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    row.map(|r| decode_save(email, &r)).transpose()
}

/// Newest-first save history.
pub async fn list_saves(pool: &SqlitePool, email: &str, limit: u32) -> Result<Vec<StoredSave>, PersistError> {
    let rows = sqlx::query(
        "SELECT version, timestamp, snapshot FROM saves WHERE email = ? ORDER BY version DESC LIMIT ?",
    )
    .bind(email)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;
    rows.iter().map(|r| decode_save(email, r)).collect()
}

// ---------------------------------------------------------------------------
// Leaderboard
// ---------------------------------------------------------------------------

pub async fn submit_score(pool: &SqlitePool, email: &str, score: i64) -> Result<(), PersistError> {
    sqlx::query("INSERT INTO leaderboard (email, score, submitted_at) VALUES (?, ?, ?)")
        .bind(email)
        .bind(score)
        .bind(now_millis())
        .execute(pool)
        .await?;
    Ok(())
}

/// Best score per player, highest first.
pub async fn top_scores(pool: &SqlitePool, limit: u32) -> Result<Vec<LeaderboardEntry>, PersistError> {
    let rows = sqlx::query(
        r#"
        SELECT u.name AS name, MAX(l.score) AS score, MIN(l.submitted_at) AS submitted_at
        FROM leaderboard l JOIN users u ON u.email = l.email
        GROUP BY l.email
        ORDER BY score DESC, submitted_at ASC
        LIMIT ?
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|r| {
            Ok(LeaderboardEntry {
                name: r.try_get("name")?,
                score: r.try_get("score")?,
                submitted_at: r.try_get("submitted_at")?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Achievements
// ---------------------------------------------------------------------------

pub async fn list_achievements(pool: &SqlitePool) -> Result<Vec<Achievement>, PersistError> {
    let rows = sqlx::query_as::<_, Achievement>("SELECT id, title, description FROM achievements ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Record an unlock. Returns `false` when it was already unlocked.
pub async fn unlock_achievement(pool: &SqlitePool, email: &str, achievement_id: &str) -> Result<bool, PersistError> {
    let exists = sqlx::query("SELECT 1 FROM achievements WHERE id = ?")
        .bind(achievement_id)
        .fetch_optional(pool)
        .await?
        .is_some();
    if !exists {
        return Err(PersistError::NotFound(format!("achievement {achievement_id}")));
    }
    let res = sqlx::query(
        "INSERT OR IGNORE INTO user_achievements (email, achievement_id, unlocked_at) VALUES (?, ?, ?)",
    )
    .bind(email)
    .bind(achievement_id)
    .bind(now_millis())
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn user_achievements(pool: &SqlitePool, email: &str) -> Result<Vec<UnlockedAchievement>, PersistError> {
    let rows = sqlx::query(
        r#"
        SELECT a.id AS id, a.title AS title, a.description AS description, ua.unlocked_at AS unlocked_at
        FROM user_achievements ua JOIN achievements a ON a.id = ua.achievement_id
        WHERE ua.email = ?
        ORDER BY ua.unlocked_at, a.id
        "#,
    )
    .bind(email)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|r| {
            Ok(UnlockedAchievement {
                achievement: Achievement {
                    id: r.try_get("id")?,
                    title: r.try_get("title")?,
                    description: r.try_get("description")?,
                },
                unlocked_at: r.try_get("unlocked_at")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool_with_user(email: &str) -> SqlitePool {
        let pool = init_db("sqlite::memory:").await.unwrap();
        assert!(create_user(&pool, email, "Ava", "hash", "salt").await.unwrap());
        pool
    }

    #[tokio::test]
    async fn duplicate_registration_is_refused() {
        let pool = pool_with_user("ava@example.com").await;
        assert!(!create_user(&pool, "ava@example.com", "Other", "h", "s").await.unwrap());
        let user = find_user(&pool, "ava@example.com").await.unwrap().unwrap();
        assert_eq!(user.name, "Ava");
    }

    #[tokio::test]
    async fn saves_are_versioned_per_account() {
        let pool = pool_with_user("ava@example.com").await;
        let mut p = PlayerInfo::new("Ava", "ava@example.com");
        assert_eq!(create_save(&pool, "ava@example.com", &p, None).await.unwrap().version, 1);
        p.level = 3;
        assert_eq!(create_save(&pool, "ava@example.com", &p, Some(5)).await.unwrap().version, 5);
        let stale = create_save(&pool, "ava@example.com", &p, Some(4)).await;
        assert!(matches!(stale, Err(PersistError::StaleWrite { stored: 5, .. })));

        let latest = latest_save(&pool, "ava@example.com").await.unwrap().unwrap();
        assert_eq!(latest.version, 5);
        assert_eq!(latest.player_info.level, 3);
        let history = list_saves(&pool, "ava@example.com", 10).await.unwrap();
        assert_eq!(history.iter().map(|s| s.version).collect::<Vec<_>>(), vec![5, 1]);
    }

    #[tokio::test]
    async fn oversized_versions_are_refused() {
        let pool = pool_with_user("ava@example.com").await;
        let p = PlayerInfo::new("Ava", "ava@example.com");
        assert!(matches!(
            create_save(&pool, "ava@example.com", &p, Some(u64::MAX)).await,
            Err(PersistError::VersionOutOfRange(u64::MAX))
        ));
        assert!(latest_save(&pool, "ava@example.com").await.unwrap().is_none());

        let top = create_save(&pool, "ava@example.com", &p, Some(MAX_SAVE_VERSION)).await.unwrap();
        assert_eq!(top.version, MAX_SAVE_VERSION);
        assert!(matches!(
            create_save(&pool, "ava@example.com", &p, Some(2)).await,
            Err(PersistError::StaleWrite { .. })
        ));
        assert!(matches!(
            create_save(&pool, "ava@example.com", &p, None).await,
            Err(PersistError::VersionOutOfRange(_))
        ));
        assert_eq!(latest_save(&pool, "ava@example.com").await.unwrap().unwrap().version, MAX_SAVE_VERSION);
    }

    #[tokio::test]
    async fn version_clash_reads_as_stale() {
        let pool = pool_with_user("ava@example.com").await;
        let p = PlayerInfo::new("Ava", "ava@example.com");
        create_save(&pool, "ava@example.com", &p, Some(3)).await.unwrap();
        // A second insert of the same version, as a racing writer would do.
        let clash = sqlx::query("INSERT INTO saves (email, version, timestamp, snapshot) VALUES (?, ?, ?, ?)")
            .bind("ava@example.com")
            .bind(3i64)
            .bind(0i64)
            .bind("{}")
            .execute(&pool)
            .await
            .unwrap_err();
        assert!(matches!(
            conflict_as_stale(clash, "ava@example.com", 3),
            PersistError::StaleWrite { attempted: 3, .. }
        ));
    }

    #[tokio::test]
    async fn leaderboard_keeps_best_score_per_player() {
        let pool = pool_with_user("ava@example.com").await;
        create_user(&pool, "ben@example.com", "Ben", "h", "s").await.unwrap();
        submit_score(&pool, "ava@example.com", 10).await.unwrap();
        submit_score(&pool, "ava@example.com", 50).await.unwrap();
        submit_score(&pool, "ben@example.com", 30).await.unwrap();
        let top = top_scores(&pool, 10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!((top[0].name.as_str(), top[0].score), ("Ava", 50));
        assert_eq!((top[1].name.as_str(), top[1].score), ("Ben", 30));
        assert_eq!(top_scores(&pool, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn achievements_unlock_once() {
        let pool = pool_with_user("ava@example.com").await;
        assert_eq!(list_achievements(&pool).await.unwrap().len(), DEFAULT_ACHIEVEMENTS.len());
        assert!(unlock_achievement(&pool, "ava@example.com", "first_quest").await.unwrap());
        assert!(!unlock_achievement(&pool, "ava@example.com", "first_quest").await.unwrap());
        assert!(matches!(
            unlock_achievement(&pool, "ava@example.com", "nope").await,
            Err(PersistError::NotFound(_))
        ));
        let mine = user_achievements(&pool, "ava@example.com").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].achievement.id, "first_quest");
    }

    #[tokio::test]
    async fn deleting_a_user_removes_their_rows() {
        let pool = pool_with_user("ava@example.com").await;
        let p = PlayerInfo::new("Ava", "ava@example.com");
        create_save(&pool, "ava@example.com", &p, None).await.unwrap();
        create_session(&pool, "tok", "ava@example.com", now_millis() + 60_000).await.unwrap();
        assert!(find_session(&pool, "tok").await.unwrap().is_some());
        assert!(delete_user(&pool, "ava@example.com").await.unwrap());
        assert!(find_user(&pool, "ava@example.com").await.unwrap().is_none());
        assert!(find_session(&pool, "tok").await.unwrap().is_none());
        assert!(latest_save(&pool, "ava@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_ignored_and_purged() {
        let pool = pool_with_user("ava@example.com").await;
        create_session(&pool, "old", "ava@example.com", now_millis() - 1).await.unwrap();
        assert!(find_session(&pool, "old").await.unwrap().is_none());
        assert_eq!(purge_expired_sessions(&pool).await.unwrap(), 1);
    }
}
