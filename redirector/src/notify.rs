use crate::metrics_defs::NOTIFY_FAILURES;
use async_trait::async_trait;
use url::Url;

/// Outbound alert channel. Best-effort: implementations swallow their own
/// delivery failures so a dead sink can never break a redirect.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Posts `{ text, type: "system_notification" }` to the backend's notify
/// endpoint. No deduplication here; every failing request re-notifies and
/// the receiving system decides what to collapse.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpNotifier {
    pub fn new(api_base_url: &Url) -> Self {
        let mut endpoint = api_base_url.clone();
        endpoint.set_path("/api/notify");
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl Notify for HttpNotifier {
    async fn notify(&self, text: &str) {
        let body = serde_json::json!({
            "text": text,
            "type": "system_notification",
        });

        match self.client.post(self.endpoint.clone()).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                shared::counter!(NOTIFY_FAILURES).increment(1);
                tracing::warn!(
                    status = response.status().as_u16(),
                    "notification sink rejected message"
                );
            }
            Ok(_) => {}
            Err(error) => {
                shared::counter!(NOTIFY_FAILURES).increment(1);
                tracing::warn!(error = %error, "failed to deliver notification");
            }
        }
    }
}

/// The broken-campaign alert line. Pipe-separated so the receiving side's
/// ancient parser keeps working.
#[allow(clippy::too_many_arguments)]
pub fn broken_campaign_message(
    tag: &str,
    redirect_link: &str,
    domain: &str,
    referrer: &str,
    query_json: &str,
    ip: &str,
    error: &str,
) -> String {
    format!(
        "Broken Campaign: {tag} | {redirect_link} | domain: {domain} | referrer: {referrer} | query: {query_json} | ip: {ip} | err: {error}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_notifier_posts_system_notification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/notify"))
            .and(body_partial_json(serde_json::json!({
                "text": "Broken Campaign: shop.com",
                "type": "system_notification"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new(&Url::parse(&server.uri()).unwrap());
        notifier.notify("Broken Campaign: shop.com").await;
    }

    #[tokio::test]
    async fn test_notifier_swallows_sink_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/notify"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new(&Url::parse(&server.uri()).unwrap());
        // Must not panic or propagate.
        notifier.notify("anything").await;
    }

    #[test]
    fn test_broken_campaign_message_format() {
        let text = broken_campaign_message(
            "shop.com",
            "https://shop.com/sale",
            "click.example.com",
            "https://t.me/channel",
            r#"{"slug":"promo1"}"#,
            "203.0.113.9",
            "campaign disabled",
        );
        assert_eq!(
            text,
            "Broken Campaign: shop.com | https://shop.com/sale | domain: click.example.com | referrer: https://t.me/channel | query: {\"slug\":\"promo1\"} | ip: 203.0.113.9 | err: campaign disabled"
        );
    }
}
