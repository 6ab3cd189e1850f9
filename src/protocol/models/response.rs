use serde::{Deserialize, Serialize};

use super::Item;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    InProgress,
    Completed,
    Cancelled,
    Failed,
    Incomplete,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub status_details: Option<ResponseStatusDetails>,
    #[serde(default)]
    pub output: Option<Vec<Item>>,
}

impl Response {
    /// Output items of a finished response; empty when the endpoint sent none.
    #[must_use]
    pub fn output_items(&self) -> &[Item] {
        self.output.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseStatusDetails {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub error: Option<crate::error::ServerError>,
}
