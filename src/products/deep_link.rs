use std::collections::HashMap;

use anyhow::Context;
use serde::Serialize;

use super::metrics::SLUG_SEPARATOR;
use super::model::ProductSummary;
use super::source::ProductSource;
use crate::comparison::selection::MAX_SELECTION;
use crate::identifiers::{parse_batch, ProductId};

/// The two ways a comparison view can be entered by URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLink {
    /// `/compare/<id>,<id>` or `/compare/<id>/<id>`; invalid tokens dropped.
    Identifiers(Vec<ProductId>),
    /// `/compare/slug1-vs-slug2[-vs-slug3[-vs-slug4]]`
    Slugs(Vec<String>),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeepLinkError {
    #[error("no comparison path provided")]
    Empty,
    #[error("too many products for comparison ({count}, max {max})")]
    TooManyProducts { count: usize, max: usize },
}

impl DeepLink {
    pub fn parse(path: &str) -> Result<Self, DeepLinkError> {
        let decoded = urlencoding::decode(path)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| path.to_string());
        let trimmed = decoded.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(DeepLinkError::Empty);
        }

        let ids: Vec<ProductId> = trimmed.split('/').flat_map(parse_batch).collect();
        if !ids.is_empty() {
            return Ok(Self::Identifiers(ids));
        }

        let slugs: Vec<String> = trimmed
            .split(SLUG_SEPARATOR)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        match slugs.len() {
            0 => Err(DeepLinkError::Empty),
            n if n > MAX_SELECTION => Err(DeepLinkError::TooManyProducts {
                count: n,
                max: MAX_SELECTION,
            }),
            _ => Ok(Self::Slugs(slugs)),
        }
    }
}

/// Identifiers a deep link points at, ready to seed a selection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedLink {
    pub product_ids: Vec<ProductId>,
    /// Filled for slug links, in slug order; used for page titles.
    pub products: Vec<ProductSummary>,
}

impl ResolvedLink {
    pub fn product_names(&self) -> Vec<&str> {
        self.products.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Turns a parsed link into identifiers. Slugs are looked up in one batch
/// and kept in link order; unknown slugs are omitted.
pub async fn resolve_deep_link(
    source: &dyn ProductSource,
    link: DeepLink,
) -> anyhow::Result<ResolvedLink> {
    match link {
        DeepLink::Identifiers(product_ids) => Ok(ResolvedLink {
            product_ids,
            products: Vec::new(),
        }),
        DeepLink::Slugs(slugs) => {
            let found = source
                .fetch_by_slugs(&slugs)
                .await
                .context("resolve comparison slugs")?;
            let mut by_slug: HashMap<String, ProductSummary> = found
                .into_iter()
                .map(|p| (p.slug.to_lowercase(), p))
                .collect();
            let products: Vec<ProductSummary> =
                slugs.iter().filter_map(|s| by_slug.remove(s)).collect();
            let product_ids = products
                .iter()
                .filter_map(|p| ProductId::parse(&p.id.to_string()))
                .collect();
            Ok(ResolvedLink {
                product_ids,
                products,
            })
        }
    }
}
