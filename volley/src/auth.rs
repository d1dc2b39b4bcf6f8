//! Attaching credentials to requests.
//!
//! Two gateway authentication schemes are supported:
//! - provider tokens: an ES256-signed JWT sent as `authorization: bearer <jwt>`
//!   on every request ([`TokenAuthProvider`])
//! - client certificates: a TLS identity presented by the transport when it
//!   opens connections ([`CertificateAuthProvider`])

use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::Serialize;

use crate::error::{Result, VolleyError};
use crate::request::RequestDescriptor;

/// Default age after which a provider token is regenerated.
///
/// The gateway rejects tokens older than one hour.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(50 * 60);

/// Authenticates requests before they are transmitted.
pub trait AuthProvider: Send + Sync {
    /// Attach credentials to `request`. May mutate its headers.
    fn authenticate(&self, request: &mut RequestDescriptor) -> Result<()>;

    /// PEM-encoded certificate and private key the transport should present
    /// as its TLS client identity, if any.
    fn client_identity_pem(&self) -> Option<&[u8]> {
        None
    }
}

/// Leaves requests untouched. Useful behind an authenticating proxy and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn authenticate(&self, _request: &mut RequestDescriptor) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    iat: u64,
}

struct CachedToken {
    bearer: HeaderValue,
    issued_at: Instant,
}

/// Provider token authentication.
///
/// Signs `{"iss": team_id, "iat": now}` with the ES256 signing key and key id,
/// and reuses the token until it is older than the configured TTL.
pub struct TokenAuthProvider {
    key: EncodingKey,
    key_id: String,
    team_id: String,
    ttl: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthProvider")
            .field("key_id", &self.key_id)
            .field("team_id", &self.team_id)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenAuthProvider {
    /// Create a provider from a PKCS#8 PEM-encoded P-256 signing key.
    pub fn from_pem(
        pem: &[u8],
        key_id: impl Into<String>,
        team_id: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            key: EncodingKey::from_ec_pem(pem)?,
            key_id: key_id.into(),
            team_id: team_id.into(),
            ttl: DEFAULT_TOKEN_TTL,
            cached: Mutex::new(None),
        })
    }

    /// Create a provider from a `.p8` key file.
    pub fn from_file(
        path: impl AsRef<Path>,
        key_id: impl Into<String>,
        team_id: impl Into<String>,
    ) -> Result<Self> {
        let pem = std::fs::read(path)?;
        Self::from_pem(&pem, key_id, team_id)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn sign(&self) -> Result<String> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| VolleyError::Auth(format!("system clock before unix epoch: {e}")))?
            .as_secs();

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        let claims = Claims {
            iss: &self.team_id,
            iat,
        };
        Ok(jsonwebtoken::encode(&header, &claims, &self.key)?)
    }

    /// The current bearer header value, signing a fresh token if needed.
    fn bearer(&self) -> Result<HeaderValue> {
        let mut cached = self.cached.lock();

        if let Some(token) = cached.as_ref() {
            if token.issued_at.elapsed() < self.ttl {
                return Ok(token.bearer.clone());
            }
        }

        let jwt = self.sign()?;
        let bearer = HeaderValue::from_str(&format!("bearer {jwt}"))
            .map_err(|e| VolleyError::Auth(format!("token is not a valid header value: {e}")))?;

        tracing::debug!(key_id = %self.key_id, "Signed new provider token");

        *cached = Some(CachedToken {
            bearer: bearer.clone(),
            issued_at: Instant::now(),
        });
        Ok(bearer)
    }
}

impl AuthProvider for TokenAuthProvider {
    fn authenticate(&self, request: &mut RequestDescriptor) -> Result<()> {
        request.headers.insert(AUTHORIZATION, self.bearer()?);
        Ok(())
    }
}

/// Certificate-based authentication.
///
/// Requests are not modified; the transport presents the identity during the
/// TLS handshake.
#[derive(Clone)]
pub struct CertificateAuthProvider {
    identity_pem: Vec<u8>,
}

impl std::fmt::Debug for CertificateAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthProvider").finish_non_exhaustive()
    }
}

impl CertificateAuthProvider {
    /// Create a provider from PEM data holding a certificate chain and its private key.
    pub fn from_pem(identity_pem: Vec<u8>) -> Result<Self> {
        let text = String::from_utf8_lossy(&identity_pem);
        if !text.contains("CERTIFICATE-----") || !text.contains("PRIVATE KEY-----") {
            return Err(VolleyError::Auth(
                "identity PEM must contain a certificate and a private key".to_string(),
            ));
        }
        Ok(Self { identity_pem })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_pem(std::fs::read(path)?)
    }
}

impl AuthProvider for CertificateAuthProvider {
    fn authenticate(&self, _request: &mut RequestDescriptor) -> Result<()> {
        Ok(())
    }

    fn client_identity_pem(&self) -> Option<&[u8]> {
        Some(&self.identity_pem)
    }
}
