use serde::{Serialize, Serializer};

use super::model::{ProductRecord, SizeVariant};

pub const KCAL_PER_G_PROTEIN: f64 = 4.0;
pub const KCAL_PER_G_CARBS: f64 = 4.0;
pub const KCAL_PER_G_FAT: f64 = 9.0;

/// Separator between slugs in a canonical comparison path.
pub const SLUG_SEPARATOR: &str = "-vs-";

/// Values computed from a record, never stored. `None` means "cannot be
/// computed from the data we have", which is not the same as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub protein_macro_percent: Option<f64>,
    pub carb_macro_percent: Option<f64>,
    pub fat_macro_percent: Option<f64>,
    pub price_per_serving: Option<f64>,
    pub price_per_gram_protein: Option<f64>,
}

/// A resolved record with its derived metrics, as shown in the comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparedProduct {
    #[serde(flatten)]
    pub record: ProductRecord,
    #[serde(flatten)]
    pub metrics: DerivedMetrics,
}

impl From<ProductRecord> for ComparedProduct {
    fn from(record: ProductRecord) -> Self {
        let metrics = derive_metrics(&record);
        Self { record, metrics }
    }
}

pub fn derive_metrics(record: &ProductRecord) -> DerivedMetrics {
    let nutrition = record.nutrition.as_ref();
    let calories = nutrition
        .and_then(|n| n.calories)
        .filter(|c| c.is_finite() && *c > 0.0);
    let protein_g = nutrition.and_then(|n| n.protein_g);

    let macro_percent = |grams: Option<f64>, kcal_per_g: f64| -> Option<f64> {
        let calories = calories?;
        let grams = grams.filter(|g| g.is_finite())?;
        Some(round_to(
            (grams * kcal_per_g / calories * 100.0).clamp(0.0, 100.0),
            1,
        ))
    };

    let (price_per_serving, price_per_gram_protein) =
        match representative_size(&record.sizes) {
            Some(size) => price_metrics(size, record.serving_size_g, protein_g),
            None => (None, None),
        };

    DerivedMetrics {
        protein_macro_percent: macro_percent(protein_g, KCAL_PER_G_PROTEIN),
        carb_macro_percent: macro_percent(
            nutrition.and_then(|n| n.carbohydrates_g),
            KCAL_PER_G_CARBS,
        ),
        fat_macro_percent: macro_percent(nutrition.and_then(|n| n.fats_g), KCAL_PER_G_FAT),
        price_per_serving,
        price_per_gram_protein,
    }
}

/// The size flagged popular, else the first listed one.
pub fn representative_size(sizes: &[SizeVariant]) -> Option<&SizeVariant> {
    sizes.iter().find(|s| s.is_popular).or_else(|| sizes.first())
}

fn price_metrics(
    size: &SizeVariant,
    serving_size_g: f64,
    protein_g: Option<f64>,
) -> (Option<f64>, Option<f64>) {
    if serving_size_g.is_nan() || serving_size_g <= 0.0 {
        return (None, None);
    }
    let servings = size.size_kg * 1000.0 / serving_size_g;
    if !servings.is_finite() || servings <= 0.0 || !size.price.is_finite() {
        return (None, None);
    }
    let per_serving = round_to(size.price / servings, 2);
    let per_gram_protein = protein_g
        .filter(|p| p.is_finite() && *p > 0.0)
        .map(|p| round_to(size.price / (servings * p), 2));
    (Some(per_serving), per_gram_protein)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Shareable path segment naming a set of compared products, independent of
/// the order they were selected in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ComparisonPath {
    Available(String),
    /// Fewer than two products; links depending on it must be disabled.
    #[default]
    Unavailable,
}

impl ComparisonPath {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Available(path) => Some(path),
            Self::Unavailable => None,
        }
    }

    /// Route for the comparison page, e.g. `/compare/a-vs-b`.
    pub fn href(&self) -> Option<String> {
        self.as_str().map(|p| format!("/compare/{p}"))
    }
}

impl Serialize for ComparisonPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_str().serialize(serializer)
    }
}

/// Lowercases, sorts and joins the slugs with [`SLUG_SEPARATOR`].
/// Blank slugs are ignored.
pub fn canonical_comparison_path<'a, I>(slugs: I) -> ComparisonPath
where
    I: IntoIterator<Item = &'a str>,
{
    let mut slugs: Vec<String> = slugs
        .into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if slugs.len() < 2 {
        return ComparisonPath::Unavailable;
    }
    slugs.sort();
    ComparisonPath::Available(slugs.join(SLUG_SEPARATOR))
}

pub fn canonical_path_for<'a, I>(records: I) -> ComparisonPath
where
    I: IntoIterator<Item = &'a ProductRecord>,
{
    canonical_comparison_path(records.into_iter().map(|r| r.slug.as_str()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use uuid::Uuid;

    use super::*;
    use crate::products::model::NutritionFacts;

    fn record(slug: &str, calories: Option<f64>, protein: Option<f64>) -> ProductRecord {
        ProductRecord {
            id: Uuid::new_v4(),
            name: slug.into(),
            brand: "Brand".into(),
            slug: slug.into(),
            description: None,
            image_url: None,
            serving_size_g: 30.0,
            servings_per_container: 33.0,
            nutrition: Some(NutritionFacts {
                calories,
                protein_g: protein,
                carbohydrates_g: Some(3.0),
                fats_g: Some(2.0),
                ..Default::default()
            }),
            amino_profile: None,
            dietary: None,
            features: None,
            sizes: Vec::new(),
            flavors: Vec::new(),
            additional_compounds: BTreeMap::new(),
            certifications: Vec::new(),
            updated_at: None,
        }
    }

    fn size(size_kg: f64, price: f64, is_popular: bool) -> SizeVariant {
        SizeVariant {
            size_kg,
            price,
            retailer_name: None,
            affiliate_link: None,
            is_popular,
        }
    }

    #[test]
    fn macro_percentages_from_calories() {
        let m = derive_metrics(&record("whey-a", Some(120.0), Some(25.0)));
        assert_eq!(m.protein_macro_percent, Some(83.3));
        assert_eq!(m.carb_macro_percent, Some(10.0));
        assert_eq!(m.fat_macro_percent, Some(15.0));
    }

    #[test]
    fn zero_calories_leaves_macros_undefined() {
        let m = derive_metrics(&record("whey-a", Some(0.0), Some(25.0)));
        assert_eq!(m.protein_macro_percent, None);
        assert_eq!(m.carb_macro_percent, None);
        assert_eq!(m.fat_macro_percent, None);

        let m = derive_metrics(&record("whey-a", None, Some(25.0)));
        assert_eq!(m.protein_macro_percent, None);
    }

    #[test]
    fn macro_percent_is_clamped() {
        // label error: protein alone exceeds declared calories
        let m = derive_metrics(&record("whey-a", Some(50.0), Some(30.0)));
        assert_eq!(m.protein_macro_percent, Some(100.0));
    }

    #[test]
    fn price_uses_popular_size() {
        let mut r = record("whey-a", Some(120.0), Some(25.0));
        r.sizes = vec![size(1.0, 3000.0, false), size(2.0, 4800.0, true)];
        let m = derive_metrics(&r);
        // 2kg / 30g = 66.67 servings
        assert_eq!(m.price_per_serving, Some(72.0));
        assert_eq!(m.price_per_gram_protein, Some(2.88));
    }

    #[test]
    fn price_falls_back_to_first_size() {
        let mut r = record("whey-a", Some(120.0), Some(25.0));
        r.sizes = vec![size(1.0, 3000.0, false), size(2.0, 4800.0, false)];
        let m = derive_metrics(&r);
        assert_eq!(m.price_per_serving, Some(90.0));
        assert_eq!(m.price_per_gram_protein, Some(3.6));
    }

    #[test]
    fn no_sizes_means_no_price_metrics() {
        let m = derive_metrics(&record("whey-a", Some(120.0), Some(25.0)));
        assert_eq!(m.price_per_serving, None);
        assert_eq!(m.price_per_gram_protein, None);
    }

    #[test]
    fn missing_protein_only_drops_protein_price() {
        let mut r = record("whey-a", Some(120.0), None);
        r.sizes = vec![size(1.0, 3000.0, true)];
        let m = derive_metrics(&r);
        assert_eq!(m.price_per_serving, Some(90.0));
        assert_eq!(m.price_per_gram_protein, None);
    }

    #[test]
    fn canonical_path_ignores_selection_order() {
        let x = record("Whey-B", None, None);
        let y = record("whey-a", None, None);
        let forward = canonical_path_for([&x, &y]);
        let backward = canonical_path_for([&y, &x]);
        assert_eq!(forward, backward);
        assert_eq!(forward.as_str(), Some("whey-a-vs-whey-b"));
        assert_eq!(forward.href().as_deref(), Some("/compare/whey-a-vs-whey-b"));
    }

    #[test]
    fn canonical_path_needs_two_products() {
        assert_eq!(canonical_comparison_path(["whey-a"]), ComparisonPath::Unavailable);
        assert_eq!(canonical_comparison_path(["whey-a", "  "]), ComparisonPath::Unavailable);
        assert_eq!(
            serde_json::to_value(ComparisonPath::Unavailable).unwrap(),
            serde_json::Value::Null
        );
    }

    #[test]
    fn compared_product_flattens_metrics() {
        let compared = ComparedProduct::from(record("whey-a", Some(120.0), Some(25.0)));
        let json = serde_json::to_value(&compared).unwrap();
        assert_eq!(json["slug"], "whey-a");
        assert_eq!(json["protein_macro_percent"], 83.3);
        assert!(json["price_per_serving"].is_null());
    }
}
