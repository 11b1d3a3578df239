//! Request and response bodies.
//!
//! Request bodies default every field so that a missing field is reported by
//! validation as a readable message instead of a parse failure.

use std::borrow::Cow;

use beanpay_core::models::bills::{BillChanges, Frequency};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Wire format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub details: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RegisterRequest {
    #[validate(email(message = "Email must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters in length"))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginRequest {
    #[validate(email(message = "Email must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is a required field"))]
    pub password: String,
}

/// Body of a successful login or refresh. The refresh token travels in a cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub access_token_expiration: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub database_connection: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CreateBillRequest {
    #[validate(length(min = 1, message = "Name is a required field"))]
    pub name: String,
    #[validate(url(message = "PaymentURL must be a valid URL"))]
    pub payment_url: String,
    #[validate(custom(function = "validate_frequency"))]
    pub frequency: String,
    #[validate(
        required(message = "EstimatedTotalDue is a required field"),
        range(min = 0.0, message = "EstimatedTotalDue must be 0 or greater")
    )]
    pub estimated_total_due: Option<f64>,
    #[validate(custom(function = "validate_date"))]
    pub first_due_date: String,
}

/// Partial bill update. Absent or empty fields leave the bill unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateBillRequest {
    #[serde(deserialize_with = "empty_as_none")]
    pub name: Option<String>,
    #[serde(deserialize_with = "empty_as_none")]
    #[validate(url(message = "PaymentURL must be a valid URL"))]
    pub payment_url: Option<String>,
    #[serde(deserialize_with = "empty_as_none")]
    #[validate(custom(function = "validate_frequency"))]
    pub frequency: Option<String>,
    #[validate(range(min = 0.0, message = "EstimatedTotalDue must be 0 or greater"))]
    pub estimated_total_due: Option<f64>,
    #[serde(deserialize_with = "empty_as_none")]
    #[validate(custom(function = "validate_date"))]
    pub first_due_date: Option<String>,
}

impl UpdateBillRequest {
    /// Convert a validated request into bill changes.
    pub fn into_changes(self) -> Result<BillChanges, ValidationError> {
        Ok(BillChanges {
            name: self.name,
            payment_url: self.payment_url,
            frequency: self.frequency.as_deref().map(parse_frequency).transpose()?,
            estimated_total_due: self.estimated_total_due,
            first_due_date: self.first_due_date.as_deref().map(parse_date).transpose()?,
        })
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CreatePaymentRequest {
    #[validate(length(min = 1, message = "BillId is a required field"))]
    pub bill_id: String,
    #[validate(custom(function = "validate_date"))]
    pub due_date: String,
    #[validate(
        required(message = "TotalPaid is a required field"),
        range(min = 0.0, message = "TotalPaid must be 0 or greater")
    )]
    pub total_paid: Option<f64>,
}

/// Query string of `GET /payments`: `from` inclusive, `to` exclusive.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct PaymentRangeQuery {
    #[validate(
        required(message = "From is a required field"),
        custom(function = "validate_date")
    )]
    pub from: Option<String>,
    #[validate(
        required(message = "To is a required field"),
        custom(function = "validate_date")
    )]
    pub to: Option<String>,
}

/// Bill ids on the wire are plain strings; anything unparseable names no bill.
pub fn parse_bill_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

pub fn parse_frequency(raw: &str) -> Result<Frequency, ValidationError> {
    raw.parse().map_err(|_| {
        invalid(
            "frequency",
            "Frequency must be one of [monthly quarterly biannually annually]",
        )
    })
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| invalid("date", "Dates must use the YYYY-MM-DD format"))
}

fn validate_frequency(raw: &str) -> Result<(), ValidationError> {
    parse_frequency(raw).map(|_| ())
}

fn validate_date(raw: &str) -> Result<(), ValidationError> {
    parse_date(raw).map(|_| ())
}
