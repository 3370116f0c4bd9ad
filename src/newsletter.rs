use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use crate::attribution::Attribution;
use crate::error::{AppError, AppResult};

/// Result of registering an email with the newsletter service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
}

/// Seam for the external newsletter service. The real implementation talks
/// to Beehiiv; tests and keyless deployments swap in the doubles below.
#[async_trait]
pub trait NewsletterClient: Send + Sync {
    async fn subscribe(
        &self,
        email: &str,
        attribution: Option<&Attribution>,
    ) -> AppResult<SubscribeOutcome>;
}

pub struct BeehiivClient {
    http: reqwest::Client,
    base_url: String,
    publication_id: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct BeehiivErrorBody {
    #[serde(default)]
    errors: Vec<BeehiivErrorDetail>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BeehiivErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl BeehiivClient {
    pub fn new(base_url: String, publication_id: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            publication_id,
            api_key,
        }
    }

    fn subscriptions_url(&self) -> String {
        format!(
            "{}/publications/{}/subscriptions",
            self.base_url.trim_end_matches('/'),
            self.publication_id
        )
    }
}

#[async_trait]
impl NewsletterClient for BeehiivClient {
    async fn subscribe(
        &self,
        email: &str,
        attribution: Option<&Attribution>,
    ) -> AppResult<SubscribeOutcome> {
        let mut body = json!({
            "email": email,
            "reactivate_existing": false,
            "send_welcome_email": true,
        });

        if let Some(attribution) = attribution {
            let fields = body
                .as_object_mut()
                .ok_or(AppError::Internal)?;
            if let Some(source) = &attribution.utm_source {
                fields.insert("utm_source".to_string(), json!(source));
            }
            if let Some(medium) = &attribution.utm_medium {
                fields.insert("utm_medium".to_string(), json!(medium));
            }
            if let Some(campaign) = &attribution.utm_campaign {
                fields.insert("utm_campaign".to_string(), json!(campaign));
            }
            if let Some(referrer) = &attribution.referrer {
                fields.insert("referring_site".to_string(), json!(referrer));
            }
        }

        let response = self
            .http
            .post(self.subscriptions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::newsletter(format!("request failed: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(SubscribeOutcome::Subscribed);
        }

        let text = response.text().await.unwrap_or_default();

        // Beehiiv reports an existing subscriber as a client error whose
        // message mentions the email already exists.
        if status == reqwest::StatusCode::CONFLICT {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }
        if status.is_client_error() && mentions_existing(&text) {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        Err(AppError::newsletter(format!(
            "unexpected status {status}: {text}"
        )))
    }
}

fn mentions_existing(body: &str) -> bool {
    let direct = body.to_ascii_lowercase().contains("already");
    if direct {
        return true;
    }
    serde_json::from_str::<BeehiivErrorBody>(body)
        .map(|parsed| {
            parsed
                .message
                .iter()
                .chain(parsed.errors.iter().filter_map(|e| e.message.as_ref()))
                .any(|msg| msg.to_ascii_lowercase().contains("exist"))
        })
        .unwrap_or(false)
}

/// Used when no API key is configured: signups only hit the database.
pub struct NoopNewsletterClient;

#[async_trait]
impl NewsletterClient for NoopNewsletterClient {
    async fn subscribe(
        &self,
        email: &str,
        _attribution: Option<&Attribution>,
    ) -> AppResult<SubscribeOutcome> {
        debug!(email, "newsletter sync disabled, skipping");
        Ok(SubscribeOutcome::Subscribed)
    }
}

/// In-memory double with the same semantics as the real service: remembers
/// every subscribed address and flags resubscriptions.
#[derive(Debug, Default)]
pub struct InMemoryNewsletterClient {
    subscribers: RwLock<HashSet<String>>,
}

impl InMemoryNewsletterClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed addresses the service already knows about, for exercising
    /// cross-source duplicate detection.
    pub async fn with_existing<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        {
            let mut subscribers = client.subscribers.write().await;
            for email in emails {
                subscribers.insert(email.into().to_ascii_lowercase());
            }
        }
        client
    }

    pub async fn contains(&self, email: &str) -> bool {
        self.subscribers
            .read()
            .await
            .contains(&email.to_ascii_lowercase())
    }
}

#[async_trait]
impl NewsletterClient for InMemoryNewsletterClient {
    async fn subscribe(
        &self,
        email: &str,
        _attribution: Option<&Attribution>,
    ) -> AppResult<SubscribeOutcome> {
        let inserted = self
            .subscribers
            .write()
            .await
            .insert(email.to_ascii_lowercase());
        if inserted {
            Ok(SubscribeOutcome::Subscribed)
        } else {
            Ok(SubscribeOutcome::AlreadySubscribed)
        }
    }
}
