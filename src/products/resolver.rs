use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::model::ProductRecord;
use super::repo_types::AspectRows;
use super::source::ProductSource;
use crate::error::ErrorInfo;
use crate::identifiers::ProductId;

/// Settled outcome of one resolution. Never an `Err`: data-service failures
/// are carried in `error` next to whatever records were obtained.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    pub records: Vec<ProductRecord>,
    pub error: Option<ErrorInfo>,
}

/// Identifies one resolution request; only the most recent ticket is
/// allowed to publish its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Resolves identifier lists into joined product records.
#[derive(Clone)]
pub struct ProductResolver {
    source: Arc<dyn ProductSource>,
    generation: Arc<AtomicU64>,
}

impl ProductResolver {
    pub fn new(source: Arc<dyn ProductSource>) -> Self {
        Self {
            source,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Supersedes every earlier ticket.
    pub fn begin(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Fetches and joins the records for `ids`, returned in `ids` order.
    /// Ids without a backing product are omitted.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn resolve(&self, ids: &[ProductId]) -> Resolution {
        if ids.is_empty() {
            return Resolution::default();
        }
        let uuids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();

        let (records, error) = match self.source.fetch_comparison_view(&uuids).await {
            Ok(Some(records)) => (records, None),
            Ok(None) => self.resolve_by_aspect(&uuids).await,
            Err(e) => {
                warn!(error = %e, "comparison view lookup failed");
                (Vec::new(), Some(ErrorInfo::from(&e)))
            }
        };

        let records = order_by_ids(records, &uuids);
        if records.len() < ids.len() {
            debug!(requested = ids.len(), found = records.len(), "some products not found");
        }
        Resolution { records, error }
    }

    /// Base lookup first, then the aspect lookups concurrently. A failed
    /// aspect leaves its part absent and reports the first error seen.
    async fn resolve_by_aspect(&self, ids: &[Uuid]) -> (Vec<ProductRecord>, Option<ErrorInfo>) {
        let products = match self.source.fetch_products(ids).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "product lookup failed");
                return (Vec::new(), Some(ErrorInfo::from(&e)));
            }
        };
        if products.is_empty() {
            return (Vec::new(), None);
        }
        let found: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let src = &self.source;

        let (nutrition, aminos, features, dietary, sizes, flavors, compounds, certifications) = tokio::join!(
            src.fetch_nutrition(&found),
            src.fetch_amino_profiles(&found),
            src.fetch_features(&found),
            src.fetch_dietary(&found),
            src.fetch_sizes(&found),
            src.fetch_flavors(&found),
            src.fetch_compounds(&found),
            src.fetch_certifications(&found),
        );

        let mut first_error: Option<ErrorInfo> = None;
        let rows = AspectRows {
            nutrition: settle("nutrition", nutrition, &mut first_error),
            aminos: settle("amino_profiles", aminos, &mut first_error),
            features: settle("features", features, &mut first_error),
            dietary: settle("dietary", dietary, &mut first_error),
            sizes: settle("sizes", sizes, &mut first_error),
            flavors: settle("flavors", flavors, &mut first_error),
            compounds: settle("compounds", compounds, &mut first_error),
            certifications: settle("certifications", certifications, &mut first_error),
        };
        (rows.assemble(products), first_error)
    }
}

fn settle<T>(
    aspect: &str,
    result: anyhow::Result<Vec<T>>,
    first_error: &mut Option<ErrorInfo>,
) -> Vec<T> {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, aspect, "aspect lookup failed");
            first_error.get_or_insert_with(|| ErrorInfo::from(&e));
            Vec::new()
        }
    }
}

/// Reorders `records` to follow `ids`, dropping records not asked for and
/// duplicates the backend may have returned.
fn order_by_ids(records: Vec<ProductRecord>, ids: &[Uuid]) -> Vec<ProductRecord> {
    let mut by_id: HashMap<Uuid, ProductRecord> =
        records.into_iter().map(|r| (r.id, r)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}
