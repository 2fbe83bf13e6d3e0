use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::selection::{Selection, MAX_SELECTION};
use super::session::ComparisonState;
use crate::products::model::ProductSummary;

#[derive(Debug, Default, Deserialize)]
pub struct OpenSessionRequest {
    /// Resume this session; a new id is issued when absent.
    pub session_id: Option<Uuid>,
    /// Server-supplied seed; invalid entries are dropped.
    #[serde(default)]
    pub initial_ids: Vec<String>,
    /// `/compare/...` path to seed from; wins over `initial_ids`.
    pub deep_link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub selection: SelectionResponse,
    /// Products named by a slug deep link, in link order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub linked_products: Vec<ProductSummary>,
}

#[derive(Debug, Deserialize)]
pub struct AddProductRequest {
    pub input: String,
}

#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub product_ids: Selection,
    pub count: usize,
    pub max: usize,
    pub is_full: bool,
}

impl From<Selection> for SelectionResponse {
    fn from(selection: Selection) -> Self {
        Self {
            count: selection.len(),
            max: MAX_SELECTION,
            is_full: selection.is_full(),
            product_ids: selection,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub product_id: String,
    pub in_comparison: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ComparisonQuery {
    /// Wait for the pending resolution instead of returning a loading state.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
pub struct ComparisonResponse {
    #[serde(flatten)]
    pub state: ComparisonState,
    /// `/compare/<canonical path>`, absent below two products.
    pub href: Option<String>,
    /// Selected ids with no resolved record.
    pub missing: usize,
}

impl ComparisonResponse {
    pub fn new(state: ComparisonState, selected: usize) -> Self {
        let href = state.canonical_path.href();
        let missing = if state.is_loading {
            0
        } else {
            selected.saturating_sub(state.records.len())
        };
        Self {
            state,
            href,
            missing,
        }
    }
}
