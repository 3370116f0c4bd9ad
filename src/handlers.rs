use std::time::Instant;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
};
use chrono::Utc;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    attribution::{Attribution, UtmParams},
    error::{AppError, AppResult},
    models::{
        ApiMessage, ApiResponse, ContactRequest, ContactResponse, EscalationRequest,
        EscalationResponse, EscalationStatus, EscalationStatusQuery, InsertOutcome,
        NewContactMessage, NewWaitlistEntry, SubscribeRequest, SubscribeResponse, Urgency,
    },
    newsletter::SubscribeOutcome,
    state::AppState,
};

pub async fn healthcheck() -> Json<ApiResponse<ApiMessage>> {
    Json(ApiResponse {
        data: ApiMessage {
            message: "ok".to_string(),
        },
    })
}

/// Waitlist signup with duplicate suppression. Serves both `/api/waitlist`
/// and `/api/subscribe`.
pub async fn subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SubscribeRequest>,
) -> AppResult<(StatusCode, Json<SubscribeResponse>)> {
    let email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .ok_or_else(|| AppError::validation("email is required"))?;
    ensure_email_shape(email)?;
    let email = email.to_lowercase();

    let decision = state.rate_limiter.check(&client_key(&headers));
    if !decision.allowed {
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs(Instant::now()),
        });
    }

    let attribution = merge_attribution(&payload, &headers);

    // Fast path: a known email skips the newsletter call entirely.
    if state.repo.find_by_email(&email).await?.is_some() {
        info!(email, "duplicate signup, already on waitlist");
        return Ok((StatusCode::CONFLICT, Json(SubscribeResponse::duplicate())));
    }

    let newsletter_outcome = state
        .newsletter
        .subscribe(&email, Some(&attribution))
        .await
        .inspect_err(|err| error!(error = %err, "newsletter subscription failed"))?;

    // The insert runs even when the newsletter service already knows the
    // address: the database is the system of record, and this converges it
    // with the advisory signal in the same request.
    let entry = NewWaitlistEntry {
        email: email.clone(),
        attribution: Some(serde_json::to_value(&attribution).map_err(|_| AppError::Internal)?),
        referer: attribution.referrer.clone(),
    };
    let insert_outcome = match state.repo.insert(entry).await {
        Ok(outcome) => outcome,
        // A concurrent signup can win between the existence check and the
        // insert; the constraint violation is the duplicate signal then.
        Err(err) if err.is_unique_violation() => InsertOutcome::Duplicate,
        Err(err) => {
            error!(error = %err, "waitlist insert failed");
            return Err(err);
        }
    };

    match (newsletter_outcome, insert_outcome) {
        (SubscribeOutcome::Subscribed, InsertOutcome::Created(created)) => {
            info!(email = %created.email, id = %created.id, "new waitlist signup");
            Ok((StatusCode::OK, Json(SubscribeResponse::created())))
        }
        _ => {
            info!(email, "duplicate signup detected");
            Ok((StatusCode::CONFLICT, Json(SubscribeResponse::duplicate())))
        }
    }
}

pub async fn contact(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> AppResult<Json<ContactResponse>> {
    let name = required_field(payload.name.as_deref(), "name")?;
    let email = required_field(payload.email.as_deref(), "email")?;
    ensure_email_shape(&email)?;
    let message = required_field(payload.message.as_deref(), "message")?;
    let kind = payload
        .kind
        .as_deref()
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .unwrap_or("general")
        .to_string();

    let subject = format!("[{kind}] message from {name}");

    let contact = state
        .repo
        .insert_contact(NewContactMessage {
            kind: kind.clone(),
            name,
            email,
            subject: Some(subject.clone()),
            message,
        })
        .await
        .inspect_err(|err| error!(error = %err, "contact insert failed"))?;

    info!(contact_id = %contact.id, kind, "contact message received");

    Ok(Json(ContactResponse {
        message: "thanks for reaching out, we'll get back to you soon".to_string(),
        subject,
    }))
}

/// Flag a user concern for human follow-up. Logged only: actual paging and
/// durable ticketing are extension points, not implemented here.
pub async fn create_escalation(
    Json(payload): Json<EscalationRequest>,
) -> AppResult<Json<EscalationResponse>> {
    let session_id = required_field(payload.session_id.as_deref(), "sessionId")?;
    let reason = required_field(payload.reason.as_deref(), "reason")?;
    let urgency = payload
        .urgency
        .ok_or_else(|| AppError::validation("urgency is required"))?;

    let ticket_id = new_ticket_id();
    let user_message = payload.user_message.as_deref().unwrap_or_default();

    if urgency == Urgency::High {
        warn!(
            ticket_id,
            session_id,
            reason,
            user_id = payload.user_id.as_deref().unwrap_or("anonymous"),
            user_message,
            "high urgency escalation, needs immediate human review"
        );
    } else {
        info!(
            ticket_id,
            session_id,
            reason,
            user_id = payload.user_id.as_deref().unwrap_or("anonymous"),
            "escalation ticket created"
        );
    }

    Ok(Json(EscalationResponse {
        ticket_id,
        estimated_response_time: urgency.estimated_response_time().to_string(),
        status: "received".to_string(),
        message: "your concern has been flagged for human review".to_string(),
    }))
}

/// Mock status lookup. Tickets are not persisted, so every known-shaped
/// request gets the same open-ticket payload.
pub async fn escalation_status(
    Query(query): Query<EscalationStatusQuery>,
) -> AppResult<Json<EscalationStatus>> {
    let ticket_id = query
        .ticket_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::validation("ticketId query parameter is required"))?;

    Ok(Json(EscalationStatus {
        ticket_id,
        status: "open".to_string(),
        message: "a team member is reviewing this ticket".to_string(),
    }))
}

fn merge_attribution(payload: &SubscribeRequest, headers: &HeaderMap) -> Attribution {
    let page_url = payload
        .page_url
        .as_deref()
        .and_then(|raw| Url::parse(raw).ok());

    let flat = UtmParams {
        source: payload
            .utm_source
            .clone()
            .or_else(|| payload.source.clone()),
        medium: payload.utm_medium.clone(),
        campaign: payload.utm_campaign.clone(),
        term: payload.utm_term.clone(),
        content: payload.utm_content.clone(),
    };

    // Flat body fields win over whatever the page URL carries.
    let utm = if flat.is_empty() {
        page_url.as_ref().map(UtmParams::from_url).unwrap_or_default()
    } else {
        flat
    };

    let landing_path = page_url.as_ref().map(|url| url.path().to_string());
    let referrer = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok());

    Attribution::capture(
        payload.attribution.clone(),
        utm,
        referrer,
        landing_path.as_deref(),
        Utc::now(),
    )
}

/// Rate-limit key for the calling client: first hop of x-forwarded-for, then
/// x-real-ip, then a shared fallback bucket.
fn client_key(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        && let Some(first) = forwarded.split(',').next()
        && !first.trim().is_empty()
    {
        return first.trim().to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn required_field(value: Option<&str>, field: &str) -> AppResult<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::validation(format!("{field} is required")))
}

fn ensure_email_shape(email: &str) -> AppResult<()> {
    let valid = email.len() <= 254
        && !email.chars().any(char::is_whitespace)
        && email.matches('@').count() == 1
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            });

    if valid {
        Ok(())
    } else {
        Err(AppError::validation("a valid email address is required"))
    }
}

fn new_ticket_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ESC-{}-{}", Utc::now().timestamp_millis(), &suffix[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check_accepts_ordinary_addresses() {
        assert!(ensure_email_shape("alice@example.com").is_ok());
        assert!(ensure_email_shape("a.b+tag@sub.example.co").is_ok());
    }

    #[test]
    fn email_shape_check_rejects_malformed_input() {
        for bad in [
            "not-an-email",
            "@example.com",
            "alice@",
            "alice@nodot",
            "alice@.com",
            "alice @example.com",
            "alice@@example.com",
        ] {
            assert!(ensure_email_shape(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn client_key_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "10.0.0.1".parse().unwrap());
        assert_eq!(client_key(&headers), "203.0.113.7");

        let mut real_ip_only = HeaderMap::new();
        real_ip_only.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(client_key(&real_ip_only), "198.51.100.2");

        assert_eq!(client_key(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn ticket_ids_carry_prefix_and_random_suffix() {
        let a = new_ticket_id();
        let b = new_ticket_id();
        assert!(a.starts_with("ESC-"));
        assert_ne!(a, b);
    }
}
