use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{ContactMessage, InsertOutcome, NewContactMessage, NewWaitlistEntry, WaitlistEntry},
};

/// Storage seam for waitlist entries and contact messages. Emails are
/// normalized to lowercase inside the implementations so lookups and the
/// uniqueness constraint agree on case.
#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    async fn init(&self) -> AppResult<()>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<WaitlistEntry>>;
    /// Conditional insert: a single atomic statement that either creates the
    /// row or reports it already exists. Never read-then-write.
    async fn insert(&self, entry: NewWaitlistEntry) -> AppResult<InsertOutcome>;
    async fn insert_contact(&self, message: NewContactMessage) -> AppResult<ContactMessage>;
}

#[derive(Clone)]
pub struct PgWaitlistRepository {
    pool: PgPool,
}

impl PgWaitlistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl WaitlistRepository for PgWaitlistRepository {
    async fn init(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<WaitlistEntry>> {
        let entry = sqlx::query_as::<_, WaitlistEntry>(
            r#"
            SELECT id, email, attribution, referer, created_at
            FROM waitlist
            WHERE email = $1
            "#,
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn insert(&self, entry: NewWaitlistEntry) -> AppResult<InsertOutcome> {
        let created = sqlx::query_as::<_, WaitlistEntry>(
            r#"
            INSERT INTO waitlist (email, attribution, referer)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, attribution, referer, created_at
            "#,
        )
        .bind(entry.email.trim().to_lowercase())
        .bind(entry.attribution)
        .bind(entry.referer)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match created {
            Some(entry) => InsertOutcome::Created(entry),
            None => InsertOutcome::Duplicate,
        })
    }

    async fn insert_contact(&self, message: NewContactMessage) -> AppResult<ContactMessage> {
        let contact = sqlx::query_as::<_, ContactMessage>(
            r#"
            INSERT INTO contacts (type, name, email, subject, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, type, name, email, subject, message, created_at
            "#,
        )
        .bind(message.kind)
        .bind(message.name.trim())
        .bind(message.email.trim().to_lowercase())
        .bind(message.subject)
        .bind(message.message)
        .fetch_one(&self.pool)
        .await?;

        Ok(contact)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryWaitlistRepository {
    entries: RwLock<HashMap<String, WaitlistEntry>>,
    contacts: RwLock<Vec<ContactMessage>>,
}

impl InMemoryWaitlistRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn waitlist_len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn contact_count(&self) -> usize {
        self.contacts.read().await.len()
    }
}

#[async_trait]
impl WaitlistRepository for InMemoryWaitlistRepository {
    async fn init(&self) -> AppResult<()> {
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<WaitlistEntry>> {
        let key = email.trim().to_lowercase();
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn insert(&self, entry: NewWaitlistEntry) -> AppResult<InsertOutcome> {
        let key = entry.email.trim().to_lowercase();
        let mut entries = self.entries.write().await;
        if entries.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }

        let created = WaitlistEntry {
            id: Uuid::new_v4(),
            email: key.clone(),
            attribution: entry.attribution,
            referer: entry.referer,
            created_at: Utc::now(),
        };
        entries.insert(key, created.clone());
        Ok(InsertOutcome::Created(created))
    }

    async fn insert_contact(&self, message: NewContactMessage) -> AppResult<ContactMessage> {
        let contact = ContactMessage {
            id: Uuid::new_v4(),
            kind: message.kind,
            name: message.name.trim().to_string(),
            email: message.email.trim().to_lowercase(),
            subject: message.subject,
            message: message.message,
            created_at: Utc::now(),
        };
        self.contacts.write().await.push(contact.clone());
        Ok(contact)
    }
}
