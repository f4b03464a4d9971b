use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use rocket::{
    request::{FromRequest, Outcome},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::mongodb::Id;

const BEARER_PREFIX: &str = "Bearer ";

/// The authenticated voter, taken from an HS256 bearer token issued by the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoterIdentity {
    pub voter_id: Id,
}

/// Bearer token claims. `sub` holds the voter ID as a hex string.
#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(with = "ts_seconds")]
    exp: DateTime<Utc>,
}

impl VoterIdentity {
    /// Verify a bearer token's signature and expiry, and extract the voter.
    pub fn from_token(token: &str, config: &Config) -> Result<Self, Error> {
        let claims = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::new(Algorithm::HS256),
        )?
        .claims;
        let voter_id = claims
            .sub
            .parse()
            .map_err(|_| Error::Unauthorized(format!("Malformed subject: {}", claims.sub)))?;
        Ok(Self { voter_id })
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for VoterIdentity {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        match bearer_token(req).and_then(|token| Self::from_token(token, config)) {
            Ok(identity) => Outcome::Success(identity),
            Err(err) => err.guard_failure(req),
        }
    }
}

fn bearer_token<'r>(req: &'r Request<'_>) -> Result<&'r str, Error> {
    let header = req
        .headers()
        .get_one("Authorization")
        .ok_or_else(|| Error::Unauthorized("Missing bearer token".to_string()))?;
    header
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .ok_or_else(|| Error::Unauthorized("Authorization is not a bearer token".to_string()))
}

#[cfg(test)]
mod examples {
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header};

    use super::*;

    impl VoterIdentity {
        /// Issue a token the way the identity service would.
        pub fn issue(voter_id: Id, config: &Config, ttl: Duration) -> String {
            let claims = Claims {
                sub: voter_id.to_string(),
                exp: Utc::now() + ttl,
            };
            jsonwebtoken::encode(
                &Header::default(),
                &claims,
                &EncodingKey::from_secret(config.jwt_secret()),
            )
            .expect("JWT encoding is infallible with default settings")
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn token_round_trip() {
        let config = Config::example();
        let voter_id = Id::new();
        let token = VoterIdentity::issue(voter_id, &config, Duration::minutes(5));
        let identity = VoterIdentity::from_token(&token, &config).unwrap();
        assert_eq!(identity.voter_id, voter_id);
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = Config::example();
        let token = VoterIdentity::issue(Id::new(), &config, Duration::minutes(-5));
        let err = VoterIdentity::from_token(&token, &config).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let config = Config::example();
        let other = Config::with_jwt_secret("someone-else");
        let token = VoterIdentity::issue(Id::new(), &other, Duration::minutes(5));
        assert!(VoterIdentity::from_token(&token, &config).is_err());
    }
}
