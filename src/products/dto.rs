use serde::{Deserialize, Serialize};

use super::model::ProductSummary;
use crate::identifiers::ProductId;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct CompareLinkResponse {
    pub product_ids: Vec<ProductId>,
    /// Filled for slug links only.
    pub products: Vec<ProductSummary>,
    /// e.g. "Whey A vs Whey B"; absent when no product was named.
    pub title: Option<String>,
}
