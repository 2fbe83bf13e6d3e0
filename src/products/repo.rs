use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::model::{ProductRecord, ProductSummary};
use super::repo_types::{
    AminoRow, CertificationRow, ComparisonViewRow, CompoundsRow, DietaryRow, FeaturesRow,
    FlavorRow, NutritionRow, ProductRow, SizeRow,
};
use super::source::ProductSource;

const UNDEFINED_TABLE: &str = "42P01";

/// Postgres-backed catalog.
#[derive(Clone)]
pub struct PgProductSource {
    db: PgPool,
    comparison_view: bool,
}

impl PgProductSource {
    pub fn new(db: PgPool, comparison_view: bool) -> Self {
        Self { db, comparison_view }
    }
}

fn is_undefined_table(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|code| code == UNDEFINED_TABLE)
}

pub async fn comparison_view_by_ids(
    db: &PgPool,
    ids: &[Uuid],
) -> Result<Vec<ComparisonViewRow>, sqlx::Error> {
    sqlx::query_as::<_, ComparisonViewRow>(
        r#"
        SELECT id, name, brand, slug, description, image_url,
               serving_size::float8 AS serving_size,
               servings_per_container::float8 AS servings_per_container,
               product_updated_at,
               calories::float8 AS calories, protein_g::float8 AS protein_g,
               carbohydrates_g::float8 AS carbohydrates_g, fats_g::float8 AS fats_g,
               saturated_fats_g::float8 AS saturated_fats_g,
               cholesterol_mg::float8 AS cholesterol_mg, sodium_mg::float8 AS sodium_mg,
               leucine_g::float8 AS leucine_g, isoleucine_g::float8 AS isoleucine_g,
               valine_g::float8 AS valine_g, histidine_g::float8 AS histidine_g,
               lysine_g::float8 AS lysine_g, methionine_g::float8 AS methionine_g,
               phenylalanine_g::float8 AS phenylalanine_g, threonine_g::float8 AS threonine_g,
               tryptophan_g::float8 AS tryptophan_g, glutamine_g::float8 AS glutamine_g,
               total_bcaas_g::float8 AS total_bcaas_g, total_eaas_g::float8 AS total_eaas_g,
               protein_source::text AS protein_source,
               filtration_process::text AS filtration_process,
               manufacturing_country, grass_fed, hormone_free, third_party_tested,
               banned_substance_tested, artificial_sweeteners, natural_sweeteners,
               artificial_flavoring,
               gluten_free, soy_free, vegetarian, vegan, keto_friendly,
               lactose_content_g::float8 AS lactose_content_g,
               allergens_list, flavors_list, additional_compounds_map,
               product_specific_certifications, product_sizes_details
          FROM v_product_comparison_details
         WHERE id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
}

pub async fn products_by_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<ProductRow>> {
    let rows = sqlx::query_as::<_, ProductRow>(
        r#"
        SELECT id, name, brand, slug, description, image_url,
               serving_size::float8 AS serving_size,
               servings_per_container::float8 AS servings_per_container,
               updated_at
          FROM products
         WHERE id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("fetch products by ids")?;
    Ok(rows)
}

pub async fn nutrition_by_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<NutritionRow>> {
    let rows = sqlx::query_as::<_, NutritionRow>(
        r#"
        SELECT product_id,
               calories::float8 AS calories, protein_g::float8 AS protein_g,
               carbohydrates_g::float8 AS carbohydrates_g, fats_g::float8 AS fats_g,
               saturated_fats_g::float8 AS saturated_fats_g,
               cholesterol_mg::float8 AS cholesterol_mg, sodium_mg::float8 AS sodium_mg
          FROM nutritional_info
         WHERE product_id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("fetch nutritional info")?;
    Ok(rows)
}

pub async fn amino_profiles_by_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<AminoRow>> {
    let rows = sqlx::query_as::<_, AminoRow>(
        r#"
        SELECT product_id,
               leucine_g::float8 AS leucine_g, isoleucine_g::float8 AS isoleucine_g,
               valine_g::float8 AS valine_g, histidine_g::float8 AS histidine_g,
               lysine_g::float8 AS lysine_g, methionine_g::float8 AS methionine_g,
               phenylalanine_g::float8 AS phenylalanine_g, threonine_g::float8 AS threonine_g,
               tryptophan_g::float8 AS tryptophan_g, glutamine_g::float8 AS glutamine_g
          FROM amino_profiles
         WHERE product_id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("fetch amino profiles")?;
    Ok(rows)
}

pub async fn features_by_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<FeaturesRow>> {
    let rows = sqlx::query_as::<_, FeaturesRow>(
        r#"
        SELECT product_id,
               protein_source::text AS protein_source,
               filtration_process::text AS filtration_process,
               manufacturing_country, grass_fed, hormone_free, third_party_tested,
               banned_substance_tested, artificial_sweeteners, natural_sweeteners,
               artificial_flavoring
          FROM product_features
         WHERE product_id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("fetch product features")?;
    Ok(rows)
}

pub async fn dietary_by_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<DietaryRow>> {
    let rows = sqlx::query_as::<_, DietaryRow>(
        r#"
        SELECT product_id, gluten_free, soy_free, vegetarian, vegan, keto_friendly,
               lactose_content_g::float8 AS lactose_content_g, allergens
          FROM dietary_info
         WHERE product_id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("fetch dietary info")?;
    Ok(rows)
}

pub async fn sizes_by_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<SizeRow>> {
    // ordered so "first variant" is stable across requests
    let rows = sqlx::query_as::<_, SizeRow>(
        r#"
        SELECT product_id, size_kg::float8 AS size_kg, price::float8 AS price,
               retailer_name, affiliate_link, is_popular
          FROM product_sizes
         WHERE product_id = ANY($1)
         ORDER BY product_id, size_kg ASC, created_at ASC
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("fetch product sizes")?;
    Ok(rows)
}

pub async fn flavors_by_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<FlavorRow>> {
    let rows = sqlx::query_as::<_, FlavorRow>(
        r#"
        SELECT product_id, flavor_name
          FROM product_flavors
         WHERE product_id = ANY($1)
         ORDER BY product_id, flavor_name
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("fetch product flavors")?;
    Ok(rows)
}

pub async fn compounds_by_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<CompoundsRow>> {
    let rows = sqlx::query_as::<_, CompoundsRow>(
        r#"
        SELECT product_id, compounds
          FROM additional_compounds
         WHERE product_id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("fetch additional compounds")?;
    Ok(rows)
}

pub async fn certifications_by_ids(
    db: &PgPool,
    ids: &[Uuid],
) -> anyhow::Result<Vec<CertificationRow>> {
    let rows = sqlx::query_as::<_, CertificationRow>(
        r#"
        SELECT pc.product_id, c.id, c.name, c.image_url
          FROM product_certifications pc
          JOIN certifications c ON c.id = pc.certification_id
         WHERE pc.product_id = ANY($1)
         ORDER BY pc.product_id, c.name
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("fetch certifications")?;
    Ok(rows)
}

pub async fn summaries_by_slugs(
    db: &PgPool,
    slugs: &[String],
) -> anyhow::Result<Vec<ProductSummary>> {
    let rows = sqlx::query_as::<_, ProductSummary>(
        r#"
        SELECT id, name, brand, slug, image_url
          FROM products
         WHERE slug = ANY($1)
        "#,
    )
    .bind(slugs)
    .fetch_all(db)
    .await
    .context("fetch products by slugs")?;
    Ok(rows)
}

/// Makes `%`, `_` and `\` in user input match literally under
/// `LIKE ... ESCAPE '\'`.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub async fn search_summaries(
    db: &PgPool,
    query: &str,
    limit: i64,
) -> anyhow::Result<Vec<ProductSummary>> {
    let rows = sqlx::query_as::<_, ProductSummary>(
        r#"
        SELECT id, name, brand, slug, image_url
          FROM products
         WHERE name ILIKE '%' || $1 || '%' ESCAPE '\'
         ORDER BY name
         LIMIT $2
        "#,
    )
    .bind(escape_like(query))
    .bind(limit)
    .fetch_all(db)
    .await
    .context("search products by name")?;
    Ok(rows)
}

#[async_trait]
impl ProductSource for PgProductSource {
    async fn fetch_comparison_view(
        &self,
        ids: &[Uuid],
    ) -> anyhow::Result<Option<Vec<ProductRecord>>> {
        if !self.comparison_view {
            return Ok(None);
        }
        match comparison_view_by_ids(&self.db, ids).await {
            Ok(rows) => Ok(Some(rows.into_iter().map(ProductRecord::from).collect())),
            Err(e) if is_undefined_table(&e) => {
                warn!(error = %e, "comparison view missing; using per-aspect lookups");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("fetch comparison view")),
        }
    }

    async fn fetch_products(&self, ids: &[Uuid]) -> anyhow::Result<Vec<ProductRow>> {
        products_by_ids(&self.db, ids).await
    }

    async fn fetch_nutrition(&self, ids: &[Uuid]) -> anyhow::Result<Vec<NutritionRow>> {
        nutrition_by_ids(&self.db, ids).await
    }

    async fn fetch_amino_profiles(&self, ids: &[Uuid]) -> anyhow::Result<Vec<AminoRow>> {
        amino_profiles_by_ids(&self.db, ids).await
    }

    async fn fetch_features(&self, ids: &[Uuid]) -> anyhow::Result<Vec<FeaturesRow>> {
        features_by_ids(&self.db, ids).await
    }

    async fn fetch_dietary(&self, ids: &[Uuid]) -> anyhow::Result<Vec<DietaryRow>> {
        dietary_by_ids(&self.db, ids).await
    }

    async fn fetch_sizes(&self, ids: &[Uuid]) -> anyhow::Result<Vec<SizeRow>> {
        sizes_by_ids(&self.db, ids).await
    }

    async fn fetch_flavors(&self, ids: &[Uuid]) -> anyhow::Result<Vec<FlavorRow>> {
        flavors_by_ids(&self.db, ids).await
    }

    async fn fetch_compounds(&self, ids: &[Uuid]) -> anyhow::Result<Vec<CompoundsRow>> {
        compounds_by_ids(&self.db, ids).await
    }

    async fn fetch_certifications(&self, ids: &[Uuid]) -> anyhow::Result<Vec<CertificationRow>> {
        certifications_by_ids(&self.db, ids).await
    }

    async fn fetch_by_slugs(&self, slugs: &[String]) -> anyhow::Result<Vec<ProductSummary>> {
        summaries_by_slugs(&self.db, slugs).await
    }

    async fn search_by_name(&self, query: &str, limit: i64) -> anyhow::Result<Vec<ProductSummary>> {
        search_summaries(&self.db, query, limit).await
    }
}
