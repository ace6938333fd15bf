//! Issuing and verification of the bearer tokens used by the API.
//!
//! Tokens are HS256 JWTs. The signing key is no process-wide state but
//! handed to the [TokenIssuer] on construction.

use std::fmt::{Display, Formatter};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

/// The fixed JWT header of every issued token
const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// The claims carried by a bearer token
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Claims {
    /// The uuid of the user the token was issued for
    pub sub: Uuid,
    /// The email of the user
    pub email: String,
    /// The names of the roles assigned to the user
    pub roles: Vec<String>,
    /// Unix timestamp the token was issued at
    pub iat: i64,
    /// Unix timestamp before which the token is invalid
    pub nbf: i64,
    /// Unix timestamp the token expires at
    pub exp: i64,
}

/// The errors that can occur while verifying a token
#[derive(Debug)]
pub enum TokenError {
    /// The token is not made up of three base64url encoded json parts
    Malformed,
    /// The signature does not match the payload
    BadSignature,
    /// The token has expired
    Expired,
    /// The token's not-before timestamp lies in the future
    NotYetValid,
}

impl Display for TokenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "Token is malformed"),
            TokenError::BadSignature => write!(f, "Token signature mismatch"),
            TokenError::Expired => write!(f, "Token has expired"),
            TokenError::NotYetValid => write!(f, "Token is not valid yet"),
        }
    }
}

/// Signs and verifies the bearer tokens of the API.
///
/// Constructed once from the configuration and shared with the server.
#[derive(Clone)]
pub struct TokenIssuer {
    key: Vec<u8>,
    lifetime: i64,
}

impl TokenIssuer {
    /// Create a new issuer from the configured secret and token lifetime
    /// in seconds
    pub fn new(secret: &str, lifetime: u64) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            lifetime: lifetime as i64,
        }
    }

    /// Issue a token for the given user
    pub fn issue(&self, user: Uuid, email: String, roles: Vec<String>) -> String {
        let now = Utc::now().timestamp();
        self.sign(&Claims {
            sub: user,
            email,
            roles,
            iat: now,
            nbf: now,
            exp: now + self.lifetime,
        })
    }

    /// Verify a token's signature and time window and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        let now = Utc::now().timestamp();
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        if now < claims.nbf {
            return Err(TokenError::NotYetValid);
        }

        Ok(claims)
    }

    fn sign(&self, claims: &Claims) -> String {
        let header = URL_SAFE_NO_PAD.encode(HEADER);
        // Claims serialization can not fail as the struct is made up of
        // plain fields
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());

        let mut mac = self.mac();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{header}.{payload}.{signature}")
    }

    fn mac(&self) -> Hmac<Sha256> {
        // Hmac accepts keys of any length
        Hmac::<Sha256>::new_from_slice(&self.key).expect("hmac keys can be of any length")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", 3600)
    }

    fn claims(nbf: i64, exp: i64) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            email: "herbert@example.com".to_string(),
            roles: vec!["user".to_string()],
            iat: Utc::now().timestamp(),
            nbf,
            exp,
        }
    }

    #[test]
    fn accepts_own_tokens() {
        let issuer = issuer();
        let uuid = Uuid::new_v4();

        let token = issuer.issue(uuid, "herbert@example.com".to_string(), vec![]);
        let claims = issuer.verify(&token).unwrap();

        assert_eq!(claims.sub, uuid);
        assert_eq!(claims.email, "herbert@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_tampered_payload() {
        let issuer = issuer();
        let token = issuer.issue(Uuid::new_v4(), "a@b.de".to_string(), vec![]);

        let mut forged = claims(0, i64::MAX);
        forged.roles = vec!["admin".to_string()];
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());

        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &payload;
        let forged_token = parts.join(".");

        assert!(matches!(
            issuer.verify(&forged_token),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn rejects_foreign_key() {
        let token = issuer().issue(Uuid::new_v4(), "a@b.de".to_string(), vec![]);
        let other = TokenIssuer::new("other-secret", 3600);

        assert!(matches!(
            other.verify(&token),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let issuer = issuer();
        let now = Utc::now().timestamp();
        let token = issuer.sign(&claims(now - 7200, now - 3600));

        assert!(matches!(issuer.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn rejects_token_from_the_future() {
        let issuer = issuer();
        let now = Utc::now().timestamp();
        let token = issuer.sign(&claims(now + 3600, now + 7200));

        assert!(matches!(
            issuer.verify(&token),
            Err(TokenError::NotYetValid)
        ));
    }

    #[test]
    fn rejects_garbage() {
        let issuer = issuer();

        assert!(matches!(issuer.verify(""), Err(TokenError::Malformed)));
        assert!(matches!(
            issuer.verify("not.a.token.at.all"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(
            issuer.verify("a.b.c"),
            Err(TokenError::Malformed)
        ));
    }
}
