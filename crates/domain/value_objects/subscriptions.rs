use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    entities::subscriptions::{
        InsertSubscriptionEntity, PatchSubscriptionEntity, ReplaceSubscriptionEntity,
        SubscriptionEntity,
    },
    value_objects::months::{BillingMonth, MonthParseError},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("invalid {field}: {source}")]
    DateFormat {
        field: &'static str,
        #[source]
        source: MonthParseError,
    },
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("patch body must contain at least one field")]
    EmptyPatch,
}

impl ValidationError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

fn parse_month_field(field: &'static str, raw: &str) -> Result<BillingMonth, ValidationError> {
    BillingMonth::parse(raw).map_err(|source| ValidationError::DateFormat { field, source })
}

fn price_to_storage(field: &str, price: u64) -> Result<i64, ValidationError> {
    i64::try_from(price).map_err(|_| ValidationError::invalid(field, "value is too large"))
}

// ─────────────────────────────────────────────
// Create / replace
// ─────────────────────────────────────────────

/// Wire body for create (POST) and full replace (PUT).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionPayload {
    pub service_name: Option<String>,
    pub user_id: Option<Uuid>,
    pub price: Option<u64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// A validated, month-normalized subscription without an id.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionDraft {
    pub service_name: String,
    pub user_id: Uuid,
    pub price: i64,
    pub start_date: BillingMonth,
    pub end_date: Option<BillingMonth>,
}

impl SubscriptionPayload {
    pub fn validate(self) -> Result<SubscriptionDraft, ValidationError> {
        let service_name = self
            .service_name
            .filter(|name| !name.trim().is_empty())
            .ok_or(ValidationError::MissingField("service_name"))?;

        let user_id = self
            .user_id
            .filter(|id| !id.is_nil())
            .ok_or(ValidationError::MissingField("user_id"))?;

        let price = match self.price {
            None => return Err(ValidationError::MissingField("price")),
            Some(0) => return Err(ValidationError::invalid("price", "must be greater than 0")),
            Some(price) => price_to_storage("price", price)?,
        };

        let start_date = match self.start_date.as_deref() {
            None | Some("") => return Err(ValidationError::MissingField("start_date")),
            Some(raw) => parse_month_field("start_date", raw)?,
        };

        let end_date = match self.end_date.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(parse_month_field("end_date", raw)?),
        };

        Ok(SubscriptionDraft {
            service_name,
            user_id,
            price,
            start_date,
            end_date,
        })
    }
}

impl SubscriptionDraft {
    pub fn into_insert_entity(self, id: Uuid) -> InsertSubscriptionEntity {
        InsertSubscriptionEntity {
            id,
            service_name: self.service_name,
            user_id: self.user_id,
            price: self.price,
            start_date: self.start_date.starts_at(),
            end_date: self.end_date.map(|month| month.starts_at()),
        }
    }

    pub fn into_replace_entity(self) -> ReplaceSubscriptionEntity {
        ReplaceSubscriptionEntity {
            service_name: self.service_name,
            user_id: self.user_id,
            price: self.price,
            start_date: self.start_date.starts_at(),
            end_date: self.end_date.map(|month| month.starts_at()),
        }
    }
}

// ─────────────────────────────────────────────
// Partial update
// ─────────────────────────────────────────────

/// The set of columns a PATCH may touch. Client keys only ever select one of these.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionPatch {
    pub service_name: Option<String>,
    pub user_id: Option<Uuid>,
    pub price: Option<i64>,
    pub start_date: Option<BillingMonth>,
    /// `Some(None)` clears the end date.
    pub end_date: Option<Option<BillingMonth>>,
}

impl SubscriptionPatch {
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, ValidationError> {
        if fields.is_empty() {
            return Err(ValidationError::EmptyPatch);
        }

        let mut patch = Self::default();
        for (key, value) in fields {
            match key.as_str() {
                "service_name" => {
                    let name = value
                        .as_str()
                        .filter(|name| !name.trim().is_empty())
                        .ok_or(ValidationError::MissingField("service_name"))?;
                    patch.service_name = Some(name.to_string());
                }
                "user_id" => {
                    let raw = value
                        .as_str()
                        .filter(|raw| !raw.is_empty())
                        .ok_or(ValidationError::MissingField("user_id"))?;
                    let user_id = Uuid::parse_str(raw)
                        .map_err(|_| ValidationError::invalid("user_id", "must be a valid UUID"))?;
                    if user_id.is_nil() {
                        return Err(ValidationError::MissingField("user_id"));
                    }
                    patch.user_id = Some(user_id);
                }
                "price" => {
                    let price = match &value {
                        Value::Null => return Err(ValidationError::MissingField("price")),
                        Value::String(raw) if raw.is_empty() => {
                            return Err(ValidationError::MissingField("price"));
                        }
                        other => other.as_u64().ok_or_else(|| {
                            ValidationError::invalid("price", "must be a non-negative integer")
                        })?,
                    };
                    patch.price = Some(price_to_storage("price", price)?);
                }
                "start_date" => {
                    let raw = value.as_str().ok_or_else(|| {
                        ValidationError::invalid("start_date", "must be a MM-YYYY string")
                    })?;
                    patch.start_date = Some(parse_month_field("start_date", raw)?);
                }
                "end_date" => {
                    patch.end_date = Some(match &value {
                        Value::Null => None,
                        Value::String(raw) => Some(parse_month_field("end_date", raw)?),
                        _ => {
                            return Err(ValidationError::invalid(
                                "end_date",
                                "must be a MM-YYYY string or null",
                            ));
                        }
                    });
                }
                _ => return Err(ValidationError::UnknownField(key)),
            }
        }

        Ok(patch)
    }

    pub fn into_entity(self) -> PatchSubscriptionEntity {
        PatchSubscriptionEntity {
            service_name: self.service_name,
            user_id: self.user_id,
            price: self.price,
            start_date: self.start_date.map(|month| month.starts_at()),
            end_date: self
                .end_date
                .map(|end_date| end_date.map(|month| month.starts_at())),
        }
    }
}

// ─────────────────────────────────────────────
// List / total filters
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionFilter {
    pub user_id: Option<Uuid>,
    pub service_name: Option<String>,
    pub start_date: Option<BillingMonth>,
    pub end_date: Option<BillingMonth>,
}

/// Offset pagination. A limit of 0 means no limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn unbounded() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TotalSubscriptionsQuery {
    pub user_id: Option<String>,
    pub service_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListSubscriptionsQuery {
    #[serde(flatten)]
    pub filter: TotalSubscriptionsQuery,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_count(field: &str, raw: Option<&str>) -> Result<Option<i64>, ValidationError> {
    non_empty(raw)
        .map(|raw| {
            raw.parse::<i64>()
                .ok()
                .filter(|value| *value >= 0)
                .ok_or_else(|| ValidationError::invalid(field, "must be a non-negative integer"))
        })
        .transpose()
}

impl TotalSubscriptionsQuery {
    pub fn into_filter(self) -> Result<SubscriptionFilter, ValidationError> {
        let user_id = non_empty(self.user_id.as_deref())
            .map(|raw| {
                Uuid::parse_str(raw)
                    .map_err(|_| ValidationError::invalid("user_id", "must be a valid UUID"))
            })
            .transpose()?;

        let start_date = non_empty(self.start_date.as_deref())
            .map(|raw| parse_month_field("start_date", raw))
            .transpose()?;

        let end_date = non_empty(self.end_date.as_deref())
            .map(|raw| parse_month_field("end_date", raw))
            .transpose()?;

        Ok(SubscriptionFilter {
            user_id,
            service_name: non_empty(self.service_name.as_deref()).map(str::to_string),
            start_date,
            end_date,
        })
    }
}

impl ListSubscriptionsQuery {
    /// Resolves the filter and the page actually applied; a missing limit falls back to `default_limit`.
    pub fn into_filter_and_page(
        self,
        default_limit: i64,
    ) -> Result<(SubscriptionFilter, Page), ValidationError> {
        let limit = parse_count("limit", self.limit.as_deref())?.unwrap_or(default_limit);
        let offset = parse_count("offset", self.offset.as_deref())?.unwrap_or(0);
        let filter = self.filter.into_filter()?;

        Ok((filter, Page { limit, offset }))
    }
}

// ─────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionDto {
    pub id: Uuid,
    pub service_name: String,
    pub user_id: Uuid,
    pub price: u64,
    pub start_date: BillingMonth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<BillingMonth>,
}

impl From<SubscriptionEntity> for SubscriptionDto {
    fn from(value: SubscriptionEntity) -> Self {
        Self {
            id: value.id,
            service_name: value.service_name,
            user_id: value.user_id,
            price: u64::try_from(value.price).unwrap_or_default(),
            start_date: BillingMonth::from_datetime(value.start_date),
            end_date: value.end_date.map(BillingMonth::from_datetime),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedSubscriptionDto {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionListDto {
    pub data: Vec<SubscriptionDto>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionTotalDto {
    pub total: u64,
}
