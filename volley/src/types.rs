use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gateway base URL for production pushes.
pub const PRODUCTION_GATEWAY: &str = "https://api.push.apple.com";

/// Gateway base URL for development (sandbox) pushes.
pub const SANDBOX_GATEWAY: &str = "https://api.sandbox.push.apple.com";

/// Which push gateway a notification is addressed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Sandbox,
}

impl Environment {
    /// Base URL of the gateway for this environment.
    pub fn gateway_url(&self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_GATEWAY,
            Environment::Sandbox => SANDBOX_GATEWAY,
        }
    }
}

/// Value of the `apns-push-type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushType {
    Alert,
    Background,
    Location,
    Voip,
    Complication,
    FileProvider,
    Mdm,
    LiveActivity,
    PushToTalk,
}

impl PushType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushType::Alert => "alert",
            PushType::Background => "background",
            PushType::Location => "location",
            PushType::Voip => "voip",
            PushType::Complication => "complication",
            PushType::FileProvider => "fileprovider",
            PushType::Mdm => "mdm",
            PushType::LiveActivity => "liveactivity",
            PushType::PushToTalk => "pushtotalk",
        }
    }
}

/// Value of the `apns-priority` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Deliver immediately (10)
    Immediate,
    /// Deliver with power considerations (5)
    Throttled,
    /// Prioritize device power over all other concerns (1)
    Low,
}

impl Priority {
    pub fn as_header_value(&self) -> &'static str {
        match self {
            Priority::Immediate => "10",
            Priority::Throttled => "5",
            Priority::Low => "1",
        }
    }
}

/// A single push notification addressed to one device.
///
/// The device token doubles as the correlation key used to match a
/// [`Response`] back to the notification that produced it. The payload is an
/// opaque JSON document serialized verbatim into the request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Recipient device token (hex string)
    pub device_token: String,

    /// JSON payload, usually an object with an `aps` dictionary
    pub payload: serde_json::Value,

    /// Bundle topic; falls back to the request factory's default topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_type: Option<PushType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    /// Unix timestamp after which the gateway may drop the notification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapse_id: Option<String>,

    /// Caller-chosen notification id echoed back in the `apns-id` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apns_id: Option<Uuid>,
}

impl Notification {
    /// Create a notification with no optional request attributes.
    pub fn new(device_token: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            device_token: device_token.into(),
            payload,
            topic: None,
            push_type: None,
            priority: None,
            expiration: None,
            collapse_id: None,
            apns_id: None,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_push_type(mut self, push_type: PushType) -> Self {
        self.push_type = Some(push_type);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_expiration(mut self, expiration: i64) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_collapse_id(mut self, collapse_id: impl Into<String>) -> Self {
        self.collapse_id = Some(collapse_id.into());
        self
    }

    pub fn with_apns_id(mut self, apns_id: Uuid) -> Self {
        self.apns_id = Some(apns_id);
        self
    }

    /// The key responses are correlated by.
    pub fn correlation_key(&self) -> &str {
        &self.device_token
    }
}

/// Identity of a request submitted to a connection multiplexer.
///
/// Assigned by the dispatcher at submission time and used to look up the
/// correlation key when the multiplexer reports the request as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle_{}", self.0)
    }
}

/// The gateway's answer to one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code, 0 if it could not be determined
    pub status: u16,
    /// Raw header block including the status line, empty if absent
    pub headers: String,
    /// Raw response body, empty if absent
    pub body: String,
    /// Correlation key of the notification this answers
    pub correlation_key: String,
}

impl Response {
    /// A response for a notification whose outcome is unknown.
    pub fn undetermined(correlation_key: impl Into<String>) -> Self {
        Self {
            status: 0,
            headers: String::new(),
            body: String::new(),
            correlation_key: correlation_key.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_undetermined(&self) -> bool {
        self.status == 0
    }

    /// Look up a header value in the raw header block (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    /// The `apns-id` the gateway assigned or echoed.
    pub fn apns_id(&self) -> Option<&str> {
        self.header("apns-id")
    }

    /// The `reason` field of a JSON error body, e.g. `BadDeviceToken`.
    pub fn reason(&self) -> Option<String> {
        let body: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        body.get("reason")?.as_str().map(str::to_owned)
    }
}
