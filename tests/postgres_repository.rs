use serde_json::json;
use sqlx::{PgPool, postgres::PgPoolOptions};
use waitlist_backend::{
    models::{InsertOutcome, NewContactMessage, NewWaitlistEntry},
    repository::{PgWaitlistRepository, WaitlistRepository},
};

async fn maybe_pool() -> Option<PgPool> {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()?;

    PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .ok()
}

#[tokio::test]
async fn postgres_conditional_insert_flow() {
    let Some(pool) = maybe_pool().await else {
        eprintln!(
            "Skipping postgres_conditional_insert_flow: TEST_DATABASE_URL/DATABASE_URL is not set or database is unreachable."
        );
        return;
    };

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations should run");

    sqlx::query("TRUNCATE TABLE waitlist, contacts")
        .execute(&pool)
        .await
        .expect("truncate should succeed");

    let repo = PgWaitlistRepository::new(pool.clone());

    let first = repo
        .insert(NewWaitlistEntry {
            email: "Alice@Example.com".to_string(),
            attribution: Some(json!({ "utm_source": "twitter" })),
            referer: Some("https://twitter.com/".to_string()),
        })
        .await
        .expect("insert should succeed");
    let InsertOutcome::Created(created) = first else {
        panic!("first insert should create a row");
    };
    assert_eq!(created.email, "alice@example.com");

    // Same address, different case: the conditional insert reports duplicate.
    let second = repo
        .insert(NewWaitlistEntry {
            email: "alice@example.com".to_string(),
            attribution: None,
            referer: None,
        })
        .await
        .expect("insert should succeed");
    assert!(matches!(second, InsertOutcome::Duplicate));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM waitlist WHERE email = $1")
        .bind("alice@example.com")
        .fetch_one(&pool)
        .await
        .expect("count should succeed");
    assert_eq!(count, 1);

    let found = repo
        .find_by_email("ALICE@example.com")
        .await
        .expect("find should succeed")
        .expect("entry should exist");
    assert_eq!(found.id, created.id);
    assert_eq!(
        found.attribution.expect("attribution should round-trip")["utm_source"],
        "twitter"
    );

    let missing = repo
        .find_by_email("nobody@example.com")
        .await
        .expect("find should succeed");
    assert!(missing.is_none());
}

#[tokio::test]
async fn postgres_contact_messages_are_persisted() {
    let Some(pool) = maybe_pool().await else {
        eprintln!(
            "Skipping postgres_contact_messages_are_persisted: TEST_DATABASE_URL/DATABASE_URL is not set or database is unreachable."
        );
        return;
    };

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations should run");

    let repo = PgWaitlistRepository::new(pool.clone());

    let contact = repo
        .insert_contact(NewContactMessage {
            kind: "support".to_string(),
            name: "Eve".to_string(),
            email: "eve@example.com".to_string(),
            subject: Some("[support] message from Eve".to_string()),
            message: "when does early access open?".to_string(),
        })
        .await
        .expect("insert should succeed");

    assert_eq!(contact.kind, "support");
    assert_eq!(contact.email, "eve@example.com");

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contacts WHERE id = $1")
        .bind(contact.id)
        .fetch_one(&pool)
        .await
        .expect("count should succeed");
    assert_eq!(count, 1);
}
