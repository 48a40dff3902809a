use super::HttpAppCtx;
use crate::error::{AppResult, DomainError};
use crate::models::caller::{Caller, SessionUser};
use crate::models::types::ChestId;
use crate::services::activity::Actor;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::header;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

/// JSON request body. A missing body reads as `{}`, and every failure is a 400 with a JSON error.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = DomainError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| DomainError::InvalidInput(e.body_text()))?;

        let raw: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &bytes
        };

        serde_json::from_slice(raw)
            .map(JsonBody)
            .map_err(|e| DomainError::InvalidInput(format!("invalid JSON body: {e}")))
    }
}

/// Query string, rejected as a JSON 400 like the body.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = DomainError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::try_from_uri(&parts.uri)
            .map(|Query(v)| ApiQuery(v))
            .map_err(|e| DomainError::InvalidInput(e.body_text()))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Caller holding a valid session token. No role check.
pub struct Authenticated {
    pub token: String,
    pub user: SessionUser,
}

impl Authenticated {
    pub fn actor(&self) -> Actor<'_> {
        Actor {
            id: &self.user.id,
            username: &self.user.username,
        }
    }
}

impl FromRequestParts<HttpAppCtx> for Authenticated {
    type Rejection = DomainError;

    async fn from_request_parts(parts: &mut Parts, ctx: &HttpAppCtx) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(DomainError::NotLoggedIn)?;
        let user = ctx.registry.services.auth.authenticate(token)?;

        Ok(Self {
            token: token.to_string(),
            user,
        })
    }
}

/// Session holder that also passed the required role check.
pub struct Authorized(pub Caller);

impl Authorized {
    pub fn actor(&self) -> Actor<'_> {
        Actor {
            id: &self.0.id,
            username: &self.0.username,
        }
    }
}

impl FromRequestParts<HttpAppCtx> for Authorized {
    type Rejection = DomainError;

    async fn from_request_parts(parts: &mut Parts, ctx: &HttpAppCtx) -> Result<Self, Self::Rejection> {
        let session = Authenticated::from_request_parts(parts, ctx).await?;
        let caller = ctx.registry.services.auth.authorize(&session.user).await?;
        Ok(Self(caller))
    }
}

pub fn parse_chest_id(raw: &str) -> AppResult<ChestId> {
    raw.parse()
        .map_err(|_| DomainError::InvalidInput(format!("invalid chest id {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts(auth: Option<&str>) -> Parts {
        let mut req = HttpRequest::builder().uri("/chests");
        if let Some(v) = auth {
            req = req.header(header::AUTHORIZATION, v);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_tokens() {
        assert_eq!(bearer_token(&parts(Some("Bearer bot_abc"))), Some("bot_abc"));
        assert_eq!(bearer_token(&parts(Some("Bearer   "))), None);
        assert_eq!(bearer_token(&parts(Some("Basic Zm9v"))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }

    #[test]
    fn chest_ids() {
        let id = ChestId::new();
        assert_eq!(parse_chest_id(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_chest_id("undefined"), Err(DomainError::InvalidInput(_))));
        assert!(parse_chest_id("").is_err());
    }

    #[tokio::test]
    async fn empty_body_reads_as_empty_object() {
        #[derive(serde::Deserialize)]
        struct Flags {
            #[serde(default)]
            confirmed: bool,
        }

        let req = HttpRequest::builder().body(axum::body::Body::empty()).unwrap();
        let JsonBody(body) = JsonBody::<Flags>::from_request(req, &()).await.unwrap();
        assert!(!body.confirmed);

        let req = HttpRequest::builder().body(axum::body::Body::from("{nope")).unwrap();
        assert!(matches!(
            JsonBody::<Flags>::from_request(req, &()).await,
            Err(DomainError::InvalidInput(_))
        ));
    }
}
