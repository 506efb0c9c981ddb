//! Client identity used to scope the search cooldown.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use repuestos_core::ClientKey;

/// Header a UI can set to identify its session.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Resolved from `x-client-id`, else the peer IP, else `anonymous`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub ClientKey);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(CLIENT_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(id) = header {
            return Ok(Self(ClientKey::new(id)));
        }

        let key = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(ClientKey::anonymous, |ConnectInfo(addr)| {
                ClientKey::new(addr.ip().to_string())
            });
        Ok(Self(key))
    }
}
