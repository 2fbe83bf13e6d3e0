use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Fully joined product, assembled from the normalized catalog.
/// Sub-sources that have no row for the product leave their part `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub serving_size_g: f64,
    pub servings_per_container: f64,
    pub nutrition: Option<NutritionFacts>,
    pub amino_profile: Option<AminoProfile>,
    pub dietary: Option<DietaryInfo>,
    pub features: Option<ProductFeatures>,
    pub sizes: Vec<SizeVariant>,
    pub flavors: Vec<String>,
    pub additional_compounds: BTreeMap<String, String>,
    pub certifications: Vec<Certification>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Per-serving nutrition facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionFacts {
    pub calories: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbohydrates_g: Option<f64>,
    pub fats_g: Option<f64>,
    pub saturated_fats_g: Option<f64>,
    pub cholesterol_mg: Option<f64>,
    pub sodium_mg: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AminoProfile {
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
}

impl AminoProfile {
    /// Fills BCAA/EAA totals the source did not provide, summing the
    /// component amino acids when every one of them is present.
    pub fn with_derived_totals(mut self) -> Self {
        if self.total_bcaas_g.is_none() {
            self.total_bcaas_g = sum_all(&[self.leucine_g, self.isoleucine_g, self.valine_g]);
        }
        if self.total_eaas_g.is_none() {
            self.total_eaas_g = sum_all(&[
                self.histidine_g,
                self.isoleucine_g,
                self.leucine_g,
                self.lysine_g,
                self.methionine_g,
                self.phenylalanine_g,
                self.threonine_g,
                self.tryptophan_g,
                self.valine_g,
            ]);
        }
        self
    }
}

fn sum_all(parts: &[Option<f64>]) -> Option<f64> {
    parts.iter().try_fold(0.0, |acc, p| p.map(|v| acc + v))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DietaryInfo {
    pub gluten_free: Option<bool>,
    pub soy_free: Option<bool>,
    pub vegetarian: Option<bool>,
    pub vegan: Option<bool>,
    pub keto_friendly: Option<bool>,
    pub lactose_content_g: Option<f64>,
    #[serde(default)]
    pub allergens: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProteinSource {
    WheyConcentrate,
    WheyIsolate,
    WheyHydrolysate,
    Casein,
    Egg,
    Soy,
    Pea,
    Rice,
    Hemp,
    MixedPlant,
    Collagen,
    #[serde(other)]
    Other,
}

impl ProteinSource {
    pub fn from_db(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "whey_concentrate" => Self::WheyConcentrate,
            "whey_isolate" => Self::WheyIsolate,
            "whey_hydrolysate" => Self::WheyHydrolysate,
            "casein" => Self::Casein,
            "egg" => Self::Egg,
            "soy" => Self::Soy,
            "pea" => Self::Pea,
            "rice" => Self::Rice,
            "hemp" => Self::Hemp,
            "mixed_plant" => Self::MixedPlant,
            "collagen" => Self::Collagen,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiltrationProcess {
    MicroFiltration,
    UltraFiltration,
    CrossFlowFiltration,
    IonExchange,
    ColdProcessed,
    NotSpecified,
    #[serde(other)]
    Other,
}

impl FiltrationProcess {
    pub fn from_db(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "micro_filtration" => Self::MicroFiltration,
            "ultra_filtration" => Self::UltraFiltration,
            "cross_flow_filtration" => Self::CrossFlowFiltration,
            "ion_exchange" => Self::IonExchange,
            "cold_processed" => Self::ColdProcessed,
            "not_specified" => Self::NotSpecified,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFeatures {
    pub protein_source: Option<ProteinSource>,
    pub filtration_process: Option<FiltrationProcess>,
    pub manufacturing_country: Option<String>,
    pub grass_fed: Option<bool>,
    pub hormone_free: Option<bool>,
    pub third_party_tested: Option<bool>,
    pub banned_substance_tested: Option<bool>,
    pub artificial_sweeteners: Option<bool>,
    pub natural_sweeteners: Option<bool>,
    pub artificial_flavoring: Option<bool>,
}

/// One purchasable size of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeVariant {
    pub size_kg: f64,
    pub price: f64,
    pub retailer_name: Option<String>,
    pub affiliate_link: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_popular: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
}

/// Lightweight product identity used by slug lookups and search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    pub slug: String,
    pub image_url: Option<String>,
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_amino_totals_only_when_complete() {
        let profile = AminoProfile {
            leucine_g: Some(2.5),
            isoleucine_g: Some(1.25),
            valine_g: Some(1.25),
            ..Default::default()
        }
        .with_derived_totals();
        assert_eq!(profile.total_bcaas_g, Some(5.0));
        assert_eq!(profile.total_eaas_g, None);
    }

    #[test]
    fn keeps_source_totals() {
        let profile = AminoProfile {
            leucine_g: Some(2.0),
            isoleucine_g: Some(1.0),
            valine_g: Some(1.0),
            total_bcaas_g: Some(5.5),
            ..Default::default()
        }
        .with_derived_totals();
        assert_eq!(profile.total_bcaas_g, Some(5.5));
    }

    #[test]
    fn size_variant_null_popular_is_false() {
        let v: SizeVariant = serde_json::from_str(
            r#"{"size_kg":1.0,"price":2499.0,"retailer_name":null,"affiliate_link":null,"is_popular":null}"#,
        )
        .unwrap();
        assert!(!v.is_popular);
    }

    #[test]
    fn unknown_enum_values_map_to_other() {
        assert_eq!(ProteinSource::from_db("WHEY_ISOLATE"), ProteinSource::WheyIsolate);
        assert_eq!(ProteinSource::from_db("cricket"), ProteinSource::Other);
        assert_eq!(FiltrationProcess::from_db("ion_exchange"), FiltrationProcess::IonExchange);
        let p: ProteinSource = serde_json::from_str("\"lentil\"").unwrap();
        assert_eq!(p, ProteinSource::Other);
    }
}
