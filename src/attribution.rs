use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// The UTM subset of an attribution record. Treated as a unit: when a new
/// visit carries at least one UTM parameter, the whole subset is replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtmParams {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub term: Option<String>,
    pub content: Option<String>,
}

impl UtmParams {
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.medium.is_none()
            && self.campaign.is_none()
            && self.term.is_none()
            && self.content.is_none()
    }

    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            let value = value.into_owned();
            match key.as_ref() {
                "utm_source" => params.source = Some(value),
                "utm_medium" => params.medium = Some(value),
                "utm_campaign" => params.campaign = Some(value),
                "utm_term" => params.term = Some(value),
                "utm_content" => params.content = Some(value),
                _ => {}
            }
        }
        params
    }
}

/// Marketing attribution for one visitor: how they arrived (UTM tags,
/// referrer) and where they landed. Stored as an opaque blob alongside the
/// waitlist row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landing_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
}

impl Attribution {
    /// Merge a new visit into a previously stored record.
    ///
    /// - a non-empty UTM set replaces the stored UTM fields wholesale;
    ///   an empty one leaves them untouched
    /// - referrer and landing path are first-touch: set only when absent
    /// - `ts` is set once, on first capture
    pub fn capture(
        stored: Option<Attribution>,
        utm: UtmParams,
        referrer: Option<&str>,
        landing_path: Option<&str>,
        now: DateTime<Utc>,
    ) -> Attribution {
        let mut merged = stored.unwrap_or_default();

        if !utm.is_empty() {
            merged.utm_source = utm.source;
            merged.utm_medium = utm.medium;
            merged.utm_campaign = utm.campaign;
            merged.utm_term = utm.term;
            merged.utm_content = utm.content;
        }

        if merged.referrer.is_none() {
            merged.referrer = referrer
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string);
        }

        if merged.landing_path.is_none() {
            merged.landing_path = landing_path
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string);
        }

        if merged.ts.is_none() {
            merged.ts = Some(now);
        }

        merged
    }
}
