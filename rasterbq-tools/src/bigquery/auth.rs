//! Service account authentication for the BigQuery API.
//!
//! Mints an OAuth2 access token from a service account key by
//! signing a JWT assertion and exchanging it at the account's token
//! endpoint. Tokens are cached until shortly before expiry.

use anyhow::{bail, Context};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rasterbq::Result;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Environment variable naming the service account key file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

// Leeway subtracted from the reported token lifetime.
const EXPIRY_MARGIN_SECS: u64 = 60;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

enum Inner {
    Key(ServiceAccountKey),
    Fixed(String),
}

/// Source of bearer tokens for API requests.
pub struct TokenProvider {
    inner: Inner,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// Load a service account key from a JSON file.
    pub fn from_key_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading credentials {}", path.display()))?;
        let key: ServiceAccountKey = serde_json::from_str(&data)
            .with_context(|| format!("parsing credentials {}", path.display()))?;
        Ok(TokenProvider {
            inner: Inner::Key(key),
            cache: Mutex::new(None),
        })
    }

    /// Load the key file named by `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CREDENTIALS_ENV)
            .with_context(|| format!("{} is not set", CREDENTIALS_ENV))?;
        TokenProvider::from_key_file(path.as_ref())
    }

    /// A provider that always returns the given token. Used in tests
    /// against a local API stub.
    pub fn fixed(token: &str) -> Self {
        TokenProvider {
            inner: Inner::Fixed(token.into()),
            cache: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<String> {
        let cache = self.cache.lock().expect("token cache poisoned");
        cache
            .as_ref()
            .filter(|t| t.expires_at > Instant::now())
            .map(|t| t.token.clone())
    }

    /// A valid bearer token, minting a fresh one if needed.
    pub async fn token(&self, http: &reqwest::Client) -> Result<String> {
        let key = match &self.inner {
            Inner::Fixed(token) => return Ok(token.clone()),
            Inner::Key(key) => key,
        };
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let assertion = {
            let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
            let claims = Claims {
                iss: &key.client_email,
                scope: SCOPE,
                aud: &key.token_uri,
                iat: now,
                exp: now + 3600,
            };
            let signer = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
                .with_context(|| "parsing service account private key")?;
            encode(&Header::new(Algorithm::RS256), &claims, &signer)?
        };

        let resp = http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
            .send()
            .await
            .with_context(|| "requesting access token")?;
        if !resp.status().is_success() {
            bail!(
                "token endpoint returned {}: {}",
                resp.status(),
                resp.text().await.unwrap_or_default()
            );
        }
        let token: TokenResponse = resp.json().await?;

        let lifetime = token.expires_in.unwrap_or(3600);
        let expires_at =
            Instant::now() + Duration::from_secs(lifetime.saturating_sub(EXPIRY_MARGIN_SECS));
        *self.cache.lock().expect("token cache poisoned") = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_token_skips_the_network() {
        let provider = TokenProvider::fixed("abc");
        let http = reqwest::Client::new();
        assert_eq!(provider.token(&http).await.unwrap(), "abc");
    }

    #[test]
    fn key_file_defaults_token_uri() {
        let key: ServiceAccountKey = serde_json::from_str(
            r#"{"client_email": "svc@example.iam.gserviceaccount.com", "private_key": "pem"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
    }
}
