use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, TokenData, Validation};
use rocket::{
    http::{Cookie, Status},
    request::{FromRequest, Outcome},
    Request, State,
};

#[cfg(test)]
use jsonwebtoken::{EncodingKey, Header};
#[cfg(test)]
use rocket::{http::SameSite, time::Duration};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::common::UserId;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a signed-in user.
///
/// Tokens are issued by the external identity provider with the shared JWT
/// secret; this server only ever verifies them. Routes that allow anonymous
/// callers take an `Option<AuthToken>` guard instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "sub")]
    pub id: UserId,
}

/// Token issuance belongs to the identity provider; these constructors
/// exist only so the verification path can be tested against real cookies.
#[cfg(test)]
impl AuthToken {
    /// Create a new [`AuthToken`] for the given user.
    pub fn new(user_id: UserId) -> Self {
        Self { id: user_id }
    }

    /// Serialize this token into a cookie, the way the provider would.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }
}

impl AuthToken {
    /// Deserialize a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie, failing with 401 if the cookie
    /// is missing, expired, or fails verification.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        let cookie = match req.cookies().get(AUTH_TOKEN_COOKIE) {
            Some(cookie) => cookie,
            None => {
                return Outcome::Failure((
                    Status::Unauthorized,
                    Error::unauthorized("No session"),
                ))
            }
        };

        match Self::from_cookie(cookie, config) {
            Ok(token) => Outcome::Success(token),
            Err(err) => Outcome::Failure((Status::Unauthorized, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::mongodb::Id;

    #[test]
    fn token_round_trips_through_a_cookie() {
        let config = Config::example();
        let user_id = Id::new();

        let cookie = AuthToken::new(user_id).into_cookie(&config);
        let token = AuthToken::from_cookie(&cookie, &config).unwrap();

        assert_eq!(token.id, user_id);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let config = Config::example();
        let mut cookie = AuthToken::new(Id::new()).into_cookie(&config);

        // Splice one character out of the signature.
        let mut forged = cookie.value().to_string();
        forged.pop();
        cookie.set_value(forged);

        assert!(AuthToken::from_cookie(&cookie, &config).is_err());
    }
}
