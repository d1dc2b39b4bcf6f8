//! Building wire requests from notifications.
//!
//! A [`RequestFactory`] turns a [`Notification`] into a [`RequestDescriptor`]
//! for a given [`Environment`]. The descriptor carries the notification's
//! correlation key alongside the wire data so completions can be matched back
//! without inspecting the response.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use url::Url;

use crate::error::{Result, VolleyError};
use crate::types::{Environment, Notification};

/// A fully built request, ready for authentication and submission.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Correlation key of the originating notification (never sent)
    pub correlation_key: String,
}

/// Builds request descriptors from notifications.
pub trait RequestFactory: Send + Sync {
    /// Build the request for `notification` addressed to `environment`'s gateway.
    ///
    /// # Errors
    /// Returns [`VolleyError::InvalidNotification`] if the notification cannot
    /// be expressed as a request (bad token, unencodable header value).
    fn build(
        &self,
        notification: &Notification,
        environment: Environment,
    ) -> Result<RequestDescriptor>;
}

/// Request factory for the APNs provider API (`POST /3/device/<token>`).
#[derive(Debug, Clone, Default)]
pub struct ApnsRequestFactory {
    gateway: Option<Url>,
    default_topic: Option<String>,
}

impl ApnsRequestFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send every request to `gateway` instead of the environment's gateway.
    pub fn with_gateway(mut self, gateway: Url) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Topic used when a notification does not name one.
    pub fn with_default_topic(mut self, topic: impl Into<String>) -> Self {
        self.default_topic = Some(topic.into());
        self
    }

    fn base_url(&self, environment: Environment) -> &str {
        self.gateway
            .as_ref()
            .map(Url::as_str)
            .unwrap_or_else(|| environment.gateway_url())
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        VolleyError::InvalidNotification(format!("invalid {name} header value '{value}': {e}"))
    })
}

fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(VolleyError::InvalidNotification(
            "device token is empty".to_string(),
        ));
    }
    if !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(VolleyError::InvalidNotification(format!(
            "device token '{token}' contains non-alphanumeric characters"
        )));
    }
    Ok(())
}

impl RequestFactory for ApnsRequestFactory {
    fn build(
        &self,
        notification: &Notification,
        environment: Environment,
    ) -> Result<RequestDescriptor> {
        validate_token(&notification.device_token)?;

        let url = format!(
            "{}/3/device/{}",
            self.base_url(environment).trim_end_matches('/'),
            notification.device_token
        );
        let url = Url::parse(&url)
            .map_err(|e| VolleyError::InvalidNotification(format!("invalid URL '{url}': {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let topic = notification
            .topic
            .as_deref()
            .or(self.default_topic.as_deref());
        let optional = [
            ("apns-topic", topic.map(str::to_owned)),
            (
                "apns-push-type",
                notification.push_type.map(|t| t.as_str().to_owned()),
            ),
            (
                "apns-priority",
                notification.priority.map(|p| p.as_header_value().to_owned()),
            ),
            (
                "apns-expiration",
                notification.expiration.map(|e| e.to_string()),
            ),
            ("apns-collapse-id", notification.collapse_id.clone()),
            (
                "apns-id",
                notification.apns_id.map(|id| id.hyphenated().to_string()),
            ),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                headers.insert(HeaderName::from_static(name), header_value(name, &value)?);
            }
        }

        let body = serde_json::to_vec(&notification.payload)?;

        Ok(RequestDescriptor {
            method: Method::POST,
            url,
            headers,
            body: Bytes::from(body),
            correlation_key: notification.correlation_key().to_string(),
        })
    }
}
