use domain::CommentError;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::{fs, path::Path};
mod models;
mod repo;

pub use repo::governance::{ErasedTree, SoftDeletedBatch};

#[derive(Clone)]
pub struct Db {
    pub(crate) pool: Pool<Sqlite>,
}

impl Db {
    pub async fn new(db_url: &str) -> anyhow::Result<Self> {
        let in_memory = db_url.contains(":memory:");
        if db_url.starts_with("sqlite://") && !in_memory {
            let path_str = db_url.trim_start_matches("sqlite://");
            let path = Path::new(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)?;
                }
            }
        }
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            Sqlite::create_database(db_url).await?;
        }

        // 内存库每个连接都是独立的数据库，只能用单连接
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(db_url)
                .await?
        } else {
            SqlitePoolOptions::new().connect(db_url).await?
        };

        sqlx::query("PRAGMA journal_mode = WAL;")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous = NORMAL;")
            .execute(&pool)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

pub(crate) fn db_err(e: sqlx::Error) -> CommentError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            CommentError::NetworkTransient(e.to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            CommentError::IntegrityViolation(db.message().to_string())
        }
        // 并发重复提交同一 txn_id：重试时会命中已存在的行
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            CommentError::NetworkTransient(format!("concurrent duplicate write: {}", db.message()))
        }
        sqlx::Error::Database(db)
            if db.message().contains("database is locked") || db.message().contains("busy") =>
        {
            CommentError::NetworkTransient(db.message().to_string())
        }
        _ => CommentError::Internal(e.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Db;
    use domain::{Comment, NewComment, Principal, ScriptId};

    pub async fn memory_db() -> Db {
        Db::new("sqlite::memory:").await.unwrap()
    }

    pub fn draft(script: &str, parent: Option<&str>, content: &str) -> NewComment {
        NewComment {
            script_id: ScriptId::new_unchecked(script.to_string()),
            parent_comment_id: parent.map(Into::into),
            content: content.to_string(),
            start_position: 0,
            end_position: 5,
        }
    }

    /// Parent by alice with two replies by bob, all active.
    pub async fn seed_thread(db: &Db) -> (Comment, Comment, Comment) {
        let alice = Principal::member("alice");
        let bob = Principal::member("bob");
        let parent = db
            .insert_comment(&alice, &draft("s1", None, "parent"), None)
            .await
            .unwrap();
        let r1 = db
            .insert_comment(&bob, &draft("s1", Some(&parent.id), "reply 1"), None)
            .await
            .unwrap();
        let r2 = db
            .insert_comment(&bob, &draft("s1", Some(&parent.id), "reply 2"), None)
            .await
            .unwrap();
        (parent, r1, r2)
    }
}
