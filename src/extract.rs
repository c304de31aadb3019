//! Request extractors that reject with [`AppError`].
//!
//! axum's own extractors answer bad input with a `text/plain` body. These
//! wrappers keep the JSON `{error, code, status}` shape on every path.

use crate::errors::AppError;
use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

/// Query string extractor. Undecodable values are `InvalidArgument`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Query<T>(pub T);

impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Query::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Query(query)) => Ok(Query(query)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "query string rejected");
                Err(rejection.into())
            }
        }
    }
}

/// Path parameter extractor. Undecodable segments are `InvalidURI`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Path<T>(pub T);

impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Path::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Path(params)) => Ok(Path(params)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "path parameters rejected");
                Err(rejection.into())
            }
        }
    }
}

/// The whole request body as UTF-8 text. Anything else is `MalformedXML`.
#[derive(Debug, Clone, Default)]
pub struct Utf8Body(pub String);

impl<S> FromRequest<S> for Utf8Body
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await?;
        String::from_utf8(bytes.to_vec()).map(Utf8Body).map_err(|err| {
            AppError::malformed_xml(format!("request body is not valid UTF-8: {}", err))
        })
    }
}
