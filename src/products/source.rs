use async_trait::async_trait;
use uuid::Uuid;

use super::model::{ProductRecord, ProductSummary};
use super::repo_types::{
    AminoRow, CertificationRow, CompoundsRow, DietaryRow, FeaturesRow, FlavorRow, NutritionRow,
    ProductRow, SizeRow,
};

/// Read-only access to the product catalog. Every lookup is batched over the
/// whole id (or slug) list; rows come back in whatever order the backend
/// chooses.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Fully joined records from the precomposed comparison view.
    /// `Ok(None)` means the backend has no such view and the caller should
    /// fall back to the per-aspect lookups.
    async fn fetch_comparison_view(&self, ids: &[Uuid])
        -> anyhow::Result<Option<Vec<ProductRecord>>>;

    async fn fetch_products(&self, ids: &[Uuid]) -> anyhow::Result<Vec<ProductRow>>;
    async fn fetch_nutrition(&self, ids: &[Uuid]) -> anyhow::Result<Vec<NutritionRow>>;
    async fn fetch_amino_profiles(&self, ids: &[Uuid]) -> anyhow::Result<Vec<AminoRow>>;
    async fn fetch_features(&self, ids: &[Uuid]) -> anyhow::Result<Vec<FeaturesRow>>;
    async fn fetch_dietary(&self, ids: &[Uuid]) -> anyhow::Result<Vec<DietaryRow>>;
    async fn fetch_sizes(&self, ids: &[Uuid]) -> anyhow::Result<Vec<SizeRow>>;
    async fn fetch_flavors(&self, ids: &[Uuid]) -> anyhow::Result<Vec<FlavorRow>>;
    async fn fetch_compounds(&self, ids: &[Uuid]) -> anyhow::Result<Vec<CompoundsRow>>;
    async fn fetch_certifications(&self, ids: &[Uuid]) -> anyhow::Result<Vec<CertificationRow>>;

    /// Reverse lookup used by canonical comparison paths.
    async fn fetch_by_slugs(&self, slugs: &[String]) -> anyhow::Result<Vec<ProductSummary>>;

    /// Case-insensitive substring match on product name.
    async fn search_by_name(&self, query: &str, limit: i64) -> anyhow::Result<Vec<ProductSummary>>;
}
