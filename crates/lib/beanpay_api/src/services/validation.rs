//! Extractors that parse and validate request input.

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::error::AppError;

/// Message returned when a body is not the JSON we expect.
pub const PARSE_FAILURE: &str = "Failed to parse the request body.";

/// JSON body that has passed `Validate`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                debug!(%rejection, "rejected request body");
                AppError::validation(PARSE_FAILURE)
            })?;
        value
            .validate()
            .map_err(|e| AppError::Validation(messages(&e)))?;
        Ok(ValidatedJson(value))
    }
}

/// Query string that has passed `Validate`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                debug!(%rejection, "rejected query string");
                AppError::validation("Failed to parse the query string.")
            })?;
        value
            .validate()
            .map_err(|e| AppError::Validation(messages(&e)))?;
        Ok(ValidatedQuery(value))
    }
}

/// `{id}` path segment naming a stored resource.
///
/// Anything that is not a UUID cannot name a row, so it is reported as
/// `NotFound` like any other unknown id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceId(pub Uuid);

impl<S> FromRequestParts<S> for ResourceId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                debug!(%rejection, "rejected resource id");
                AppError::NotFound
            })?;
        parse_resource_id(&raw).map(ResourceId)
    }
}

fn parse_resource_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound)
}

/// One readable message per failed rule, ordered by field name.
pub fn messages(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect()
}
