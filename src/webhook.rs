//! Best-effort webhook notification after a successful redemption.
//!
//! The dispatcher POSTs a JSON body to the voucher's configured URL and
//! records the outcome onto the payment record's metadata. By the time a
//! webhook fires the money has already moved, so no failure here may ever
//! make the redemption look failed to the bearer: everything is caught,
//! logged and recorded, never re-raised.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::model::Voucher;
use crate::protocol::{PaymentGateway, PaymentRecord};

/// Upper bound on a single webhook request.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(40);

/// Fire-and-forget webhook dispatcher.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: Client,
    gateway: Arc<dyn PaymentGateway>,
}

impl WebhookDispatcher {
    /// Build a dispatcher. The gateway is used to persist the webhook outcome
    /// onto the payment record.
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            client: Client::new(),
            gateway,
        }
    }

    /// Run [`dispatch`](Self::dispatch) in a background task. The caller does
    /// not wait on the response path; the task itself awaits the request and
    /// records the outcome before finishing. The handle is returned so tests
    /// can join it.
    pub fn dispatch_detached(
        &self,
        voucher: Voucher,
        payment: PaymentRecord,
        payment_request: String,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher
                .dispatch(&voucher, payment, &payment_request)
                .await;
        })
    }

    /// POST the notification and record success or failure on the payment
    /// record. Infallible by design.
    pub async fn dispatch(
        &self,
        voucher: &Voucher,
        mut payment: PaymentRecord,
        payment_request: &str,
    ) {
        let Some(url) = &voucher.webhook_url else {
            return;
        };
        let body = build_body(voucher, &payment, payment_request);
        let headers = parse_headers(voucher.webhook_headers.as_deref());

        let result = self
            .client
            .post(url)
            .headers(headers)
            .json(&body)
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    tracing::warn!(
                        voucher_id = %voucher.id,
                        status = %status,
                        "Webhook answered with a non-success status"
                    );
                }
                payment
                    .extra
                    .insert("wh_success".into(), json!(status.is_success()));
                payment.extra.insert(
                    "wh_message".into(),
                    json!(status.canonical_reason().unwrap_or("")),
                );
                payment.extra.insert("wh_response".into(), json!(text));
            }
            Err(e) => {
                tracing::error!(
                    voucher_id = %voucher.id,
                    error = %e,
                    "Caught exception when dispatching webhook url"
                );
                payment.extra.insert("wh_success".into(), json!(false));
                payment
                    .extra
                    .insert("wh_message".into(), json!(e.to_string()));
            }
        }

        if let Err(e) = self.gateway.update_payment(&payment).await {
            tracing::error!(
                payment_hash = %payment.payment_hash,
                error = %e,
                "Failed to record webhook outcome on payment"
            );
        }
    }
}

/// Webhook body: payment details plus the voucher's configured payload.
fn build_body(voucher: &Voucher, payment: &PaymentRecord, payment_request: &str) -> Value {
    let configured = voucher
        .webhook_body
        .as_deref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .unwrap_or_else(|| Value::String(String::new()));
    json!({
        "payment_hash": payment.payment_hash,
        "payment_request": payment_request,
        "lnurlw": voucher.id,
        "body": configured,
    })
}

/// Parse the voucher's header JSON into a `HeaderMap`. Entries that are not
/// string-valued or not valid header names are skipped.
fn parse_headers(raw: Option<&str>) -> HeaderMap {
    let mut map = HeaderMap::new();
    let Some(raw) = raw else {
        return map;
    };
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) else {
        return map;
    };
    for (key, value) in obj {
        let Some(value) = value.as_str() else {
            continue;
        };
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.insert(name, value);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn voucher_with_webhook(body: Option<&str>, headers: Option<&str>) -> Voucher {
        Voucher {
            id: "v1".into(),
            wallet: "w1".into(),
            title: "t".into(),
            min_withdrawable: 1,
            max_withdrawable: 1,
            uses: 1,
            wait_time: 0,
            is_unique: false,
            unique_hash: "uh".into(),
            salt: "s".into(),
            open_time: 0,
            used: 0,
            secrets: vec![],
            webhook_url: Some("https://hooks.example.com/paid".into()),
            webhook_headers: headers.map(String::from),
            webhook_body: body.map(String::from),
            custom_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_body_includes_configured_payload() {
        let voucher = voucher_with_webhook(Some(r#"{"order": 7}"#), None);
        let payment = PaymentRecord {
            payment_hash: "abc".into(),
            extra: Default::default(),
        };
        let body = build_body(&voucher, &payment, "lnbc1...");
        assert_eq!(body["payment_hash"], "abc");
        assert_eq!(body["payment_request"], "lnbc1...");
        assert_eq!(body["lnurlw"], "v1");
        assert_eq!(body["body"]["order"], 7);
    }

    #[test]
    fn test_body_defaults_to_empty_string() {
        let voucher = voucher_with_webhook(None, None);
        let payment = PaymentRecord::default();
        let body = build_body(&voucher, &payment, "pr");
        assert_eq!(body["body"], "");
    }

    #[test]
    fn test_header_parsing() {
        let headers = parse_headers(Some(r#"{"X-Token": "abc", "Bad": 7}"#));
        assert_eq!(headers.get("X-Token").unwrap(), "abc");
        // non-string values are skipped
        assert!(headers.get("Bad").is_none());

        assert!(parse_headers(Some("not json")).is_empty());
        assert!(parse_headers(None).is_empty());
    }
}
