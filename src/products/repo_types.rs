use std::collections::{BTreeMap, HashMap};

use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{
    AminoProfile, Certification, DietaryInfo, FiltrationProcess, NutritionFacts, ProductFeatures,
    ProductRecord, ProteinSource, SizeVariant,
};

// Rows of the normalized catalog, one struct per table.

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub serving_size: f64,
    pub servings_per_container: f64,
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct NutritionRow {
    pub product_id: Uuid,
    pub calories: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbohydrates_g: Option<f64>,
    pub fats_g: Option<f64>,
    pub saturated_fats_g: Option<f64>,
    pub cholesterol_mg: Option<f64>,
    pub sodium_mg: Option<f64>,
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct AminoRow {
    pub product_id: Uuid,
    pub leucine_g: Option<f64>,
    pub isoleucine_g: Option<f64>,
    pub valine_g: Option<f64>,
    pub histidine_g: Option<f64>,
    pub lysine_g: Option<f64>,
    pub methionine_g: Option<f64>,
    pub phenylalanine_g: Option<f64>,
    pub threonine_g: Option<f64>,
    pub tryptophan_g: Option<f64>,
    pub glutamine_g: Option<f64>,
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct FeaturesRow {
    pub product_id: Uuid,
    pub protein_source: Option<String>,
    pub filtration_process: Option<String>,
    pub manufacturing_country: Option<String>,
    pub grass_fed: Option<bool>,
    pub hormone_free: Option<bool>,
    pub third_party_tested: Option<bool>,
    pub banned_substance_tested: Option<bool>,
    pub artificial_sweeteners: Option<bool>,
    pub natural_sweeteners: Option<bool>,
    pub artificial_flavoring: Option<bool>,
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct DietaryRow {
    pub product_id: Uuid,
    pub gluten_free: Option<bool>,
    pub soy_free: Option<bool>,
    pub vegetarian: Option<bool>,
    pub vegan: Option<bool>,
    pub keto_friendly: Option<bool>,
    pub lactose_content_g: Option<f64>,
    pub allergens: Option<Vec<String>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SizeRow {
    pub product_id: Uuid,
    pub size_kg: f64,
    pub price: f64,
    pub retailer_name: Option<String>,
    pub affiliate_link: Option<String>,
    pub is_popular: Option<bool>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FlavorRow {
    pub product_id: Uuid,
    pub flavor_name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompoundsRow {
    pub product_id: Uuid,
    pub compounds: Option<Json<serde_json::Value>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CertificationRow {
    pub product_id: Uuid,
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
}

/// One row of the precomposed `v_product_comparison_details` view.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct ComparisonViewRow {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub serving_size: f64,
    pub servings_per_container: f64,
    pub product_updated_at: Option<OffsetDateTime>,
    pub calories: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbohydrates_g: Option<f64>,
    pub fats_g: Option<f64>,
    pub saturated_fats_g: Option<f64>,
    pub cholesterol_mg: Option<f64>,
    pub sodium_mg: Option<f64>,
    pub leucine_g: Option<f64>,
    pub isoleucine_g: Option<f64>,
    pub valine_g: Option<f64>,
    pub histidine_g: Option<f64>,
    pub lysine_g: Option<f64>,
    pub methionine_g: Option<f64>,
    pub phenylalanine_g: Option<f64>,
    pub threonine_g: Option<f64>,
    pub tryptophan_g: Option<f64>,
    pub glutamine_g: Option<f64>,
    pub total_bcaas_g: Option<f64>,
    pub total_eaas_g: Option<f64>,
    pub protein_source: Option<String>,
    pub filtration_process: Option<String>,
    pub manufacturing_country: Option<String>,
    pub grass_fed: Option<bool>,
    pub hormone_free: Option<bool>,
    pub third_party_tested: Option<bool>,
    pub banned_substance_tested: Option<bool>,
    pub artificial_sweeteners: Option<bool>,
    pub natural_sweeteners: Option<bool>,
    pub artificial_flavoring: Option<bool>,
    pub gluten_free: Option<bool>,
    pub soy_free: Option<bool>,
    pub vegetarian: Option<bool>,
    pub vegan: Option<bool>,
    pub keto_friendly: Option<bool>,
    pub lactose_content_g: Option<f64>,
    pub allergens_list: Option<Vec<String>>,
    pub flavors_list: Option<Vec<String>>,
    pub additional_compounds_map: Option<Json<serde_json::Value>>,
    pub product_specific_certifications: Option<Json<Vec<Certification>>>,
    pub product_sizes_details: Option<Json<Vec<SizeVariant>>>,
}

/// `None` when every field is at its default, i.e. the left-joined
/// sub-source had no row for this product.
fn present<T: Default + PartialEq>(value: T) -> Option<T> {
    if value == T::default() {
        None
    } else {
        Some(value)
    }
}

/// Compound amounts arrive as numbers or strings; both are kept as text.
fn compounds_map(raw: Option<serde_json::Value>) -> BTreeMap<String, String> {
    let Some(serde_json::Value::Object(obj)) = raw else {
        return BTreeMap::new();
    };
    obj.into_iter()
        .filter_map(|(name, amount)| match amount {
            serde_json::Value::String(s) => Some((name, s)),
            serde_json::Value::Number(n) => Some((name, n.to_string())),
            serde_json::Value::Null => None,
            other => Some((name, other.to_string())),
        })
        .collect()
}

/// Smallest size first; ties keep their source order.
fn sorted_sizes(mut sizes: Vec<SizeVariant>) -> Vec<SizeVariant> {
    sizes.sort_by(|a, b| a.size_kg.total_cmp(&b.size_kg));
    sizes
}

impl From<NutritionRow> for NutritionFacts {
    fn from(r: NutritionRow) -> Self {
        Self {
            calories: r.calories,
            protein_g: r.protein_g,
            carbohydrates_g: r.carbohydrates_g,
            fats_g: r.fats_g,
            saturated_fats_g: r.saturated_fats_g,
            cholesterol_mg: r.cholesterol_mg,
            sodium_mg: r.sodium_mg,
        }
    }
}

impl From<AminoRow> for AminoProfile {
    fn from(r: AminoRow) -> Self {
        Self {
            leucine_g: r.leucine_g,
            isoleucine_g: r.isoleucine_g,
            valine_g: r.valine_g,
            histidine_g: r.histidine_g,
            lysine_g: r.lysine_g,
            methionine_g: r.methionine_g,
            phenylalanine_g: r.phenylalanine_g,
            threonine_g: r.threonine_g,
            tryptophan_g: r.tryptophan_g,
            glutamine_g: r.glutamine_g,
            total_bcaas_g: None,
            total_eaas_g: None,
        }
        .with_derived_totals()
    }
}

impl From<FeaturesRow> for ProductFeatures {
    fn from(r: FeaturesRow) -> Self {
        Self {
            protein_source: r.protein_source.as_deref().map(ProteinSource::from_db),
            filtration_process: r.filtration_process.as_deref().map(FiltrationProcess::from_db),
            manufacturing_country: r.manufacturing_country,
            grass_fed: r.grass_fed,
            hormone_free: r.hormone_free,
            third_party_tested: r.third_party_tested,
            banned_substance_tested: r.banned_substance_tested,
            artificial_sweeteners: r.artificial_sweeteners,
            natural_sweeteners: r.natural_sweeteners,
            artificial_flavoring: r.artificial_flavoring,
        }
    }
}

impl From<DietaryRow> for DietaryInfo {
    fn from(r: DietaryRow) -> Self {
        Self {
            gluten_free: r.gluten_free,
            soy_free: r.soy_free,
            vegetarian: r.vegetarian,
            vegan: r.vegan,
            keto_friendly: r.keto_friendly,
            lactose_content_g: r.lactose_content_g,
            allergens: r.allergens.unwrap_or_default(),
        }
    }
}

impl From<SizeRow> for SizeVariant {
    fn from(r: SizeRow) -> Self {
        Self {
            size_kg: r.size_kg,
            price: r.price,
            retailer_name: r.retailer_name,
            affiliate_link: r.affiliate_link,
            is_popular: r.is_popular.unwrap_or(false),
        }
    }
}

impl From<ComparisonViewRow> for ProductRecord {
    fn from(r: ComparisonViewRow) -> Self {
        let nutrition = present(NutritionFacts {
            calories: r.calories,
            protein_g: r.protein_g,
            carbohydrates_g: r.carbohydrates_g,
            fats_g: r.fats_g,
            saturated_fats_g: r.saturated_fats_g,
            cholesterol_mg: r.cholesterol_mg,
            sodium_mg: r.sodium_mg,
        });
        let amino_profile = present(AminoProfile {
            leucine_g: r.leucine_g,
            isoleucine_g: r.isoleucine_g,
            valine_g: r.valine_g,
            histidine_g: r.histidine_g,
            lysine_g: r.lysine_g,
            methionine_g: r.methionine_g,
            phenylalanine_g: r.phenylalanine_g,
            threonine_g: r.threonine_g,
            tryptophan_g: r.tryptophan_g,
            glutamine_g: r.glutamine_g,
            total_bcaas_g: r.total_bcaas_g,
            total_eaas_g: r.total_eaas_g,
        })
        .map(AminoProfile::with_derived_totals);
        let features = present(ProductFeatures::from(FeaturesRow {
            product_id: r.id,
            protein_source: r.protein_source,
            filtration_process: r.filtration_process,
            manufacturing_country: r.manufacturing_country,
            grass_fed: r.grass_fed,
            hormone_free: r.hormone_free,
            third_party_tested: r.third_party_tested,
            banned_substance_tested: r.banned_substance_tested,
            artificial_sweeteners: r.artificial_sweeteners,
            natural_sweeteners: r.natural_sweeteners,
            artificial_flavoring: r.artificial_flavoring,
        }));
        let dietary = present(DietaryInfo {
            gluten_free: r.gluten_free,
            soy_free: r.soy_free,
            vegetarian: r.vegetarian,
            vegan: r.vegan,
            keto_friendly: r.keto_friendly,
            lactose_content_g: r.lactose_content_g,
            allergens: r.allergens_list.unwrap_or_default(),
        });

        Self {
            id: r.id,
            name: r.name,
            brand: r.brand,
            slug: r.slug,
            description: r.description,
            image_url: r.image_url,
            serving_size_g: r.serving_size,
            servings_per_container: r.servings_per_container,
            nutrition,
            amino_profile,
            dietary,
            features,
            sizes: sorted_sizes(r.product_sizes_details.map(|j| j.0).unwrap_or_default()),
            flavors: r.flavors_list.unwrap_or_default(),
            additional_compounds: compounds_map(r.additional_compounds_map.map(|j| j.0)),
            certifications: r
                .product_specific_certifications
                .map(|j| j.0)
                .unwrap_or_default(),
            updated_at: r.product_updated_at,
        }
    }
}

/// Results of the per-aspect batched lookups, merged in memory by product id.
#[derive(Debug, Default)]
pub struct AspectRows {
    pub nutrition: Vec<NutritionRow>,
    pub aminos: Vec<AminoRow>,
    pub features: Vec<FeaturesRow>,
    pub dietary: Vec<DietaryRow>,
    pub sizes: Vec<SizeRow>,
    pub flavors: Vec<FlavorRow>,
    pub compounds: Vec<CompoundsRow>,
    pub certifications: Vec<CertificationRow>,
}

impl AspectRows {
    /// Joins the aspect rows onto the base rows. Output follows `products`
    /// order; rows whose product is not in `products` are ignored.
    pub fn assemble(self, products: Vec<ProductRow>) -> Vec<ProductRecord> {
        let mut nutrition: HashMap<Uuid, NutritionRow> =
            self.nutrition.into_iter().map(|r| (r.product_id, r)).collect();
        let mut aminos: HashMap<Uuid, AminoRow> =
            self.aminos.into_iter().map(|r| (r.product_id, r)).collect();
        let mut features: HashMap<Uuid, FeaturesRow> =
            self.features.into_iter().map(|r| (r.product_id, r)).collect();
        let mut dietary: HashMap<Uuid, DietaryRow> =
            self.dietary.into_iter().map(|r| (r.product_id, r)).collect();
        let mut compounds: HashMap<Uuid, CompoundsRow> =
            self.compounds.into_iter().map(|r| (r.product_id, r)).collect();

        let mut sizes: HashMap<Uuid, Vec<SizeVariant>> = HashMap::new();
        for r in self.sizes {
            sizes.entry(r.product_id).or_default().push(r.into());
        }
        let mut flavors: HashMap<Uuid, Vec<String>> = HashMap::new();
        for r in self.flavors {
            flavors.entry(r.product_id).or_default().push(r.flavor_name);
        }
        let mut certifications: HashMap<Uuid, Vec<Certification>> = HashMap::new();
        for r in self.certifications {
            certifications.entry(r.product_id).or_default().push(Certification {
                id: r.id,
                name: r.name,
                image_url: r.image_url,
            });
        }

        products
            .into_iter()
            .map(|p| ProductRecord {
                id: p.id,
                nutrition: nutrition.remove(&p.id).map(Into::into),
                amino_profile: aminos.remove(&p.id).map(Into::into),
                features: features.remove(&p.id).map(Into::into),
                dietary: dietary.remove(&p.id).map(Into::into),
                sizes: sorted_sizes(sizes.remove(&p.id).unwrap_or_default()),
                flavors: flavors.remove(&p.id).unwrap_or_default(),
                additional_compounds: compounds_map(
                    compounds.remove(&p.id).and_then(|c| c.compounds).map(|j| j.0),
                ),
                certifications: certifications.remove(&p.id).unwrap_or_default(),
                name: p.name,
                brand: p.brand,
                slug: p.slug,
                description: p.description,
                image_url: p.image_url,
                serving_size_g: p.serving_size,
                servings_per_container: p.servings_per_container,
                updated_at: p.updated_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: Uuid, slug: &str) -> ProductRow {
        ProductRow {
            id,
            name: slug.to_uppercase(),
            brand: "Brand".into(),
            slug: slug.into(),
            description: None,
            image_url: None,
            serving_size: 30.0,
            servings_per_container: 33.0,
            updated_at: None,
        }
    }

    #[test]
    fn assemble_leaves_missing_aspects_absent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let rows = AspectRows {
            nutrition: vec![NutritionRow {
                product_id: a,
                calories: Some(120.0),
                protein_g: Some(25.0),
                ..Default::default()
            }],
            sizes: vec![
                SizeRow {
                    product_id: b,
                    size_kg: 1.0,
                    price: 2000.0,
                    retailer_name: None,
                    affiliate_link: None,
                    is_popular: None,
                },
                SizeRow {
                    product_id: b,
                    size_kg: 2.0,
                    price: 3800.0,
                    retailer_name: Some("Shop".into()),
                    affiliate_link: None,
                    is_popular: Some(true),
                },
            ],
            flavors: vec![FlavorRow { product_id: a, flavor_name: "Chocolate".into() }],
            ..Default::default()
        };

        let records = rows.assemble(vec![product(a, "whey-a"), product(b, "whey-b")]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].nutrition.as_ref().unwrap().calories, Some(120.0));
        assert!(records[0].sizes.is_empty());
        assert_eq!(records[0].flavors, vec!["Chocolate".to_string()]);
        assert!(records[1].nutrition.is_none());
        assert!(records[1].dietary.is_none());
        assert_eq!(records[1].sizes.len(), 2);
        assert!(!records[1].sizes[0].is_popular);
        assert!(records[1].sizes[1].is_popular);
    }

    #[test]
    fn compounds_are_kept_as_text() {
        let map = compounds_map(Some(serde_json::json!({
            "creatine": 3,
            "digestive enzymes": "50mg",
            "unknown": null
        })));
        assert_eq!(map.get("creatine").map(String::as_str), Some("3"));
        assert_eq!(map.get("digestive enzymes").map(String::as_str), Some("50mg"));
        assert!(!map.contains_key("unknown"));
    }

    #[test]
    fn present_detects_empty_left_join() {
        assert!(present(NutritionFacts::default()).is_none());
        assert!(present(NutritionFacts { calories: Some(0.0), ..Default::default() }).is_some());
    }

    fn size(size_kg: f64, price: f64) -> SizeVariant {
        SizeVariant {
            size_kg,
            price,
            retailer_name: None,
            affiliate_link: None,
            is_popular: false,
        }
    }

    #[test]
    fn view_row_maps_present_aspects_only() {
        let cert = Certification {
            id: Uuid::new_v4(),
            name: "Informed Sport".into(),
            image_url: None,
        };
        let row = ComparisonViewRow {
            id: Uuid::new_v4(),
            name: "Whey A".into(),
            brand: "Brand".into(),
            slug: "whey-a".into(),
            serving_size: 30.0,
            servings_per_container: 33.0,
            leucine_g: Some(2.5),
            isoleucine_g: Some(1.5),
            valine_g: Some(1.0),
            protein_source: Some("WHEY_ISOLATE".into()),
            filtration_process: Some("something new".into()),
            third_party_tested: Some(true),
            allergens_list: Some(vec!["milk".into()]),
            flavors_list: Some(vec!["Vanilla".into(), "Chocolate".into()]),
            additional_compounds_map: Some(Json(serde_json::json!({ "creatine": 3 }))),
            product_specific_certifications: Some(Json(vec![cert.clone()])),
            product_sizes_details: Some(Json(vec![
                size(2.0, 3800.0),
                size(0.5, 1200.0),
                size(1.0, 2000.0),
                size(1.0, 2100.0),
            ])),
            ..Default::default()
        };

        let record = ProductRecord::from(row);
        assert!(record.nutrition.is_none());

        let amino = record.amino_profile.unwrap();
        assert_eq!(amino.total_bcaas_g, Some(5.0));
        assert_eq!(amino.total_eaas_g, None);

        let features = record.features.unwrap();
        assert_eq!(features.protein_source, Some(ProteinSource::WheyIsolate));
        assert_eq!(features.filtration_process, Some(FiltrationProcess::Other));
        assert_eq!(features.third_party_tested, Some(true));

        let dietary = record.dietary.unwrap();
        assert_eq!(dietary.allergens, vec!["milk".to_string()]);
        assert_eq!(dietary.vegan, None);

        let sizes: Vec<(f64, f64)> = record.sizes.iter().map(|s| (s.size_kg, s.price)).collect();
        assert_eq!(
            sizes,
            vec![(0.5, 1200.0), (1.0, 2000.0), (1.0, 2100.0), (2.0, 3800.0)]
        );
        assert_eq!(record.flavors, vec!["Vanilla".to_string(), "Chocolate".to_string()]);
        assert_eq!(record.certifications, vec![cert]);
        assert_eq!(
            record.additional_compounds.get("creatine").map(String::as_str),
            Some("3")
        );
    }

    #[test]
    fn empty_view_row_has_no_aspects() {
        let record = ProductRecord::from(ComparisonViewRow {
            id: Uuid::new_v4(),
            slug: "bare".into(),
            ..Default::default()
        });
        assert!(record.nutrition.is_none());
        assert!(record.amino_profile.is_none());
        assert!(record.features.is_none());
        assert!(record.dietary.is_none());
        assert!(record.sizes.is_empty());
        assert!(record.certifications.is_empty());
        assert!(record.additional_compounds.is_empty());
    }

    #[test]
    fn per_aspect_sizes_come_out_smallest_first() {
        let a = Uuid::new_v4();
        let row = |size_kg: f64| SizeRow {
            product_id: a,
            size_kg,
            price: size_kg * 2000.0,
            retailer_name: None,
            affiliate_link: None,
            is_popular: None,
        };
        let rows = AspectRows {
            sizes: vec![row(2.0), row(0.9), row(1.0)],
            ..Default::default()
        };
        let records = rows.assemble(vec![product(a, "whey-a")]);
        let kg: Vec<f64> = records[0].sizes.iter().map(|s| s.size_kg).collect();
        assert_eq!(kg, vec![0.9, 1.0, 2.0]);
    }
}
