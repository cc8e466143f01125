//! JWT issuance and validation.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};

use geotrail_core::db::unix_timestamp;

use super::claims::{Claims, TokenKind};

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Refresh token expiry as a unix timestamp.
    pub refresh_expires_at: i64,
}

/// Signs and verifies HS256 tokens with a shared secret.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl JwtManager {
    pub fn new(secret: &[u8], access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    /// Mint an access token and a refresh token for `user_id`.
    pub fn issue_pair(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        let (access_token, _) = self.issue(user_id, email, TokenKind::Access)?;
        let (refresh_token, refresh_expires_at) =
            self.issue(user_id, email, TokenKind::Refresh)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl_secs,
            refresh_expires_at,
        })
    }

    /// Returns the token and its `exp`.
    fn issue(
        &self,
        user_id: &str,
        email: &str,
        kind: TokenKind,
    ) -> Result<(String, i64), jsonwebtoken::errors::Error> {
        let now = unix_timestamp();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        let claims = Claims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now,
            exp: now + ttl,
            token_type: kind,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((token, claims.exp))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }

    /// Validate and require an access token.
    pub fn validate_access(&self, token: &str) -> Option<Claims> {
        self.validate(token).ok().filter(Claims::is_access)
    }

    /// SHA-256 hex digest. Refresh tokens are stored only in this form.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
