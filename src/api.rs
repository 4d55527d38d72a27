//! Client for the platform's content management AJAX endpoint
//!
//! Both operations log their own failures and hand back `None`, so callers
//! only ever check for "no result".

use crate::error::ApiError;
use serde_json::{json, Map, Value};
use url::Url;

/// One row of the loaned-items collection
///
/// Only `asin` decides whether a row is present. `lendingId` is kept as the
/// platform sent it and echoed back unchanged when returning the loan.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanedItem {
    pub item_id: String,
    pub loan_id: Option<Value>,
    pub status: Option<String>,
    pub origin_type: Option<String>,
    pub title: Option<String>,
    pub extra: Map<String, Value>,
}

impl LoanedItem {
    /// Read a row; `None` only when it carries no string `asin`
    pub fn from_row(row: &Value) -> Option<Self> {
        let fields = row.as_object()?;
        let item_id = fields.get("asin")?.as_str()?.to_string();
        let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);

        let extra = fields
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "asin" | "lendingId" | "status" | "originType" | "title"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Some(Self {
            item_id,
            loan_id: fields.get("lendingId").filter(|v| !v.is_null()).cloned(),
            status: text("status"),
            origin_type: text("originType"),
            title: text("title"),
            extra,
        })
    }
}

/// Result of one query of the loaned-items collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanSnapshot {
    pub items: Vec<LoanedItem>,
}

impl LoanSnapshot {
    /// Parse an `OwnershipData` response; a missing section means no loans
    pub fn from_response(raw: &Value) -> Self {
        let items = raw
            .get("OwnershipData")
            .and_then(|data| data.get("items"))
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        let item = LoanedItem::from_row(row);
                        if item.is_none() {
                            tracing::debug!("Skipping loan row without asin: {}", row);
                        }
                        item
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { items }
    }

    pub fn find(&self, item_id: &str) -> Option<&LoanedItem> {
        self.items.iter().find(|item| item.item_id == item_id)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.find(item_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Response to a `ReturnKULoan` command
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnResponse {
    pub success: bool,
    pub raw: Value,
}

impl ReturnResponse {
    pub fn from_response(raw: Value) -> Self {
        let success = raw
            .get("ReturnKULoan")
            .and_then(|r| r.get("success"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self { success, raw }
    }
}

/// Client bound to one page's CSRF token
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoint: Url,
    csrf_token: String,
    batch_size: u32,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, endpoint: Url, csrf_token: impl Into<String>, batch_size: u32) -> Self {
        Self {
            http,
            endpoint,
            csrf_token: csrf_token.into(),
            batch_size,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Active loan-origin items, newest first
    pub async fn fetch_loaned_items(&self) -> Option<LoanSnapshot> {
        let command = json!({
            "param": {
                "OwnershipData": {
                    "sortOrder": "DESCENDING",
                    "sortIndex": "DATE",
                    "startIndex": 0,
                    "batchSize": self.batch_size,
                    "contentType": "ALL",
                    "totalContentCount": 0,
                    "itemStatus": ["Active"],
                    "originType": ["ku"],
                }
            }
        });

        match self.post(&command).await {
            Ok(raw) => Some(LoanSnapshot::from_response(&raw)),
            Err(e) => {
                tracing::error!("fetch_loaned_items(): {}", e);
                None
            }
        }
    }

    /// Return one loan by its loan identifier, sent as the snapshot held it
    pub async fn submit_return(&self, loan_id: &Value) -> Option<ReturnResponse> {
        let command = json!({
            "param": {
                "ReturnKULoan": {
                    "returnLoanID": loan_id,
                }
            }
        });

        match self.post(&command).await {
            Ok(raw) => Some(ReturnResponse::from_response(raw)),
            Err(e) => {
                tracing::error!("submit_return(): loan={} {}", loan_id, e);
                None
            }
        }
    }

    async fn post(&self, command: &Value) -> Result<Value, ApiError> {
        let data = serde_json::to_string(command)?;
        let response = self
            .http
            .post(self.endpoint.clone())
            .form(&[("csrfToken", self.csrf_token.as_str()), ("data", data.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }

        Ok(response.json().await?)
    }
}
