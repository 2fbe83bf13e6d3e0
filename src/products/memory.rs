use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{ProductRecord, ProductSummary};
use super::repo_types::{
    AminoRow, AspectRows, CertificationRow, CompoundsRow, DietaryRow, FeaturesRow, FlavorRow,
    NutritionRow, ProductRow, SizeRow,
};
use super::source::ProductSource;

/// Lookups a [`MemoryProductSource`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    View,
    Products,
    Nutrition,
    Aminos,
    Features,
    Dietary,
    Sizes,
    Flavors,
    Compounds,
    Certifications,
    Slugs,
    Search,
}

#[derive(Default)]
struct Tables {
    rows: AspectRows,
    products: Vec<ProductRow>,
    failing: HashSet<Lookup>,
    latency: HashMap<Uuid, Duration>,
}

/// In-process catalog holding the same normalized tables as Postgres.
/// Rows are returned in insertion order, which callers must not rely on.
#[derive(Clone, Default)]
pub struct MemoryProductSource {
    tables: Arc<RwLock<Tables>>,
    comparison_view: bool,
}

impl MemoryProductSource {
    pub fn new(comparison_view: bool) -> Self {
        Self {
            tables: Arc::default(),
            comparison_view,
        }
    }

    pub fn insert_product(&self, row: ProductRow) {
        self.write(|t| t.products.push(row));
    }

    pub fn insert_nutrition(&self, row: NutritionRow) {
        self.write(|t| t.rows.nutrition.push(row));
    }

    pub fn insert_amino_profile(&self, row: AminoRow) {
        self.write(|t| t.rows.aminos.push(row));
    }

    pub fn insert_features(&self, row: FeaturesRow) {
        self.write(|t| t.rows.features.push(row));
    }

    pub fn insert_dietary(&self, row: DietaryRow) {
        self.write(|t| t.rows.dietary.push(row));
    }

    pub fn insert_size(&self, row: SizeRow) {
        self.write(|t| t.rows.sizes.push(row));
    }

    pub fn insert_flavor(&self, row: FlavorRow) {
        self.write(|t| t.rows.flavors.push(row));
    }

    pub fn insert_compounds(&self, row: CompoundsRow) {
        self.write(|t| t.rows.compounds.push(row));
    }

    pub fn insert_certification(&self, row: CertificationRow) {
        self.write(|t| t.rows.certifications.push(row));
    }

    /// Makes every subsequent `lookup` call fail until [`Self::recover`].
    pub fn fail(&self, lookup: Lookup) {
        self.write(|t| {
            t.failing.insert(lookup);
        });
    }

    pub fn recover(&self, lookup: Lookup) {
        self.write(|t| {
            t.failing.remove(&lookup);
        });
    }

    /// Delays any batched lookup that includes `id`.
    pub fn set_latency(&self, id: Uuid, latency: Duration) {
        self.write(|t| {
            t.latency.insert(id, latency);
        });
    }

    fn write(&self, f: impl FnOnce(&mut Tables)) {
        let mut guard = self.tables.write().unwrap_or_else(|p| p.into_inner());
        f(&mut guard);
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let guard = self.tables.read().unwrap_or_else(|p| p.into_inner());
        f(&guard)
    }

    async fn enter(&self, lookup: Lookup, ids: &[Uuid]) -> anyhow::Result<()> {
        let delay = self.read(|t| {
            ids.iter()
                .filter_map(|id| t.latency.get(id).copied())
                .max()
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.read(|t| t.failing.contains(&lookup)) {
            anyhow::bail!("{lookup:?} lookup unavailable");
        }
        Ok(())
    }

    fn select<T: Clone>(
        &self,
        ids: &[Uuid],
        pick: impl Fn(&Tables) -> &Vec<T>,
        key: impl Fn(&T) -> Uuid,
    ) -> Vec<T> {
        self.read(|t| {
            pick(t)
                .iter()
                .filter(|r| ids.contains(&key(*r)))
                .cloned()
                .collect()
        })
    }

    fn summaries(&self, keep: impl Fn(&ProductRow) -> bool) -> Vec<ProductSummary> {
        self.read(|t| {
            t.products
                .iter()
                .filter(|p| keep(*p))
                .map(|p| ProductSummary {
                    id: p.id,
                    name: p.name.clone(),
                    brand: p.brand.clone(),
                    slug: p.slug.clone(),
                    image_url: p.image_url.clone(),
                })
                .collect()
        })
    }
}

#[async_trait]
impl ProductSource for MemoryProductSource {
    async fn fetch_comparison_view(
        &self,
        ids: &[Uuid],
    ) -> anyhow::Result<Option<Vec<ProductRecord>>> {
        if !self.comparison_view {
            return Ok(None);
        }
        self.enter(Lookup::View, ids).await?;
        let products = self.select(ids, |t| &t.products, |r| r.id);
        let rows = AspectRows {
            nutrition: self.select(ids, |t| &t.rows.nutrition, |r| r.product_id),
            aminos: self.select(ids, |t| &t.rows.aminos, |r| r.product_id),
            features: self.select(ids, |t| &t.rows.features, |r| r.product_id),
            dietary: self.select(ids, |t| &t.rows.dietary, |r| r.product_id),
            sizes: self.select(ids, |t| &t.rows.sizes, |r| r.product_id),
            flavors: self.select(ids, |t| &t.rows.flavors, |r| r.product_id),
            compounds: self.select(ids, |t| &t.rows.compounds, |r| r.product_id),
            certifications: self.select(ids, |t| &t.rows.certifications, |r| r.product_id),
        };
        Ok(Some(rows.assemble(products)))
    }

    async fn fetch_products(&self, ids: &[Uuid]) -> anyhow::Result<Vec<ProductRow>> {
        self.enter(Lookup::Products, ids).await?;
        Ok(self.select(ids, |t| &t.products, |r| r.id))
    }

    async fn fetch_nutrition(&self, ids: &[Uuid]) -> anyhow::Result<Vec<NutritionRow>> {
        self.enter(Lookup::Nutrition, ids).await?;
        Ok(self.select(ids, |t| &t.rows.nutrition, |r| r.product_id))
    }

    async fn fetch_amino_profiles(&self, ids: &[Uuid]) -> anyhow::Result<Vec<AminoRow>> {
        self.enter(Lookup::Aminos, ids).await?;
        Ok(self.select(ids, |t| &t.rows.aminos, |r| r.product_id))
    }

    async fn fetch_features(&self, ids: &[Uuid]) -> anyhow::Result<Vec<FeaturesRow>> {
        self.enter(Lookup::Features, ids).await?;
        Ok(self.select(ids, |t| &t.rows.features, |r| r.product_id))
    }

    async fn fetch_dietary(&self, ids: &[Uuid]) -> anyhow::Result<Vec<DietaryRow>> {
        self.enter(Lookup::Dietary, ids).await?;
        Ok(self.select(ids, |t| &t.rows.dietary, |r| r.product_id))
    }

    async fn fetch_sizes(&self, ids: &[Uuid]) -> anyhow::Result<Vec<SizeRow>> {
        self.enter(Lookup::Sizes, ids).await?;
        Ok(self.select(ids, |t| &t.rows.sizes, |r| r.product_id))
    }

    async fn fetch_flavors(&self, ids: &[Uuid]) -> anyhow::Result<Vec<FlavorRow>> {
        self.enter(Lookup::Flavors, ids).await?;
        Ok(self.select(ids, |t| &t.rows.flavors, |r| r.product_id))
    }

    async fn fetch_compounds(&self, ids: &[Uuid]) -> anyhow::Result<Vec<CompoundsRow>> {
        self.enter(Lookup::Compounds, ids).await?;
        Ok(self.select(ids, |t| &t.rows.compounds, |r| r.product_id))
    }

    async fn fetch_certifications(&self, ids: &[Uuid]) -> anyhow::Result<Vec<CertificationRow>> {
        self.enter(Lookup::Certifications, ids).await?;
        Ok(self.select(ids, |t| &t.rows.certifications, |r| r.product_id))
    }

    async fn fetch_by_slugs(&self, slugs: &[String]) -> anyhow::Result<Vec<ProductSummary>> {
        self.enter(Lookup::Slugs, &[]).await?;
        Ok(self.summaries(|p| slugs.contains(&p.slug)))
    }

    async fn search_by_name(&self, query: &str, limit: i64) -> anyhow::Result<Vec<ProductSummary>> {
        self.enter(Lookup::Search, &[]).await?;
        let needle = query.to_lowercase();
        let mut found = self.summaries(|p| p.name.to_lowercase().contains(&needle));
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(found)
    }
}
