use std::sync::Arc;

use crate::{newsletter::NewsletterClient, rate_limit::RateLimiter, repository::WaitlistRepository};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn WaitlistRepository>,
    pub newsletter: Arc<dyn NewsletterClient>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn WaitlistRepository>,
        newsletter: Arc<dyn NewsletterClient>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            repo,
            newsletter,
            rate_limiter,
        }
    }
}
