use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::{debug, instrument};

use super::deep_link::{resolve_deep_link, DeepLink};
use super::dto::{CompareLinkResponse, SearchQuery};
use super::model::ProductSummary;
use crate::error::AppError;
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/products/search", get(search_products))
        .route("/compare/*path", get(resolve_compare_path))
}

/// GET /products/search?q=
#[instrument(skip(state))]
pub async fn search_products(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<ProductSummary>>, AppError> {
    let query = q.q.trim();
    if query.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let found = state
        .products
        .search_by_name(query, state.config.search_limit)
        .await?;
    debug!(count = found.len(), "search results");
    Ok(Json(found))
}

/// GET /compare/*path: ids or a canonical slug path, to identifiers.
#[instrument(skip(state))]
pub async fn resolve_compare_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<CompareLinkResponse>, AppError> {
    let link = DeepLink::parse(&path).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let resolved = resolve_deep_link(state.products.as_ref(), link).await?;
    let names = resolved.product_names();
    let title = (!names.is_empty()).then(|| names.join(" vs "));
    Ok(Json(CompareLinkResponse {
        product_ids: resolved.product_ids,
        products: resolved.products,
        title,
    }))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::products::memory::{Lookup, MemoryProductSource};
    use crate::products::repo_types::ProductRow;

    fn catalog(names: &[(&str, &str)]) -> MemoryProductSource {
        let source = MemoryProductSource::new(true);
        for (name, slug) in names {
            source.insert_product(ProductRow {
                id: Uuid::new_v4(),
                name: (*name).into(),
                brand: "Brand".into(),
                slug: (*slug).into(),
                description: None,
                image_url: None,
                serving_size: 30.0,
                servings_per_container: 33.0,
                updated_at: None,
            });
        }
        source
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_limited() {
        let names: Vec<(String, String)> = (0..7)
            .map(|i| (format!("Gold Whey {i}"), format!("gold-whey-{i}")))
            .collect();
        let pairs: Vec<(&str, &str)> = names.iter().map(|(n, s)| (n.as_str(), s.as_str())).collect();
        let state = AppState::fake(catalog(&pairs));

        let Json(found) = search_products(
            State(state.clone()),
            Query(SearchQuery { q: "gold WHEY".into() }),
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 5);

        let Json(none) = search_products(State(state), Query(SearchQuery { q: "  ".into() }))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn search_failure_is_internal_error() {
        let source = catalog(&[("Whey", "whey")]);
        source.fail(Lookup::Search);
        let err = search_products(State(AppState::fake(source)), Query(SearchQuery { q: "whey".into() }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn compare_path_resolves_slugs_with_title() {
        let state = AppState::fake(catalog(&[("Whey A", "whey-a"), ("Whey B", "whey-b")]));
        let Json(res) = resolve_compare_path(State(state), Path("whey-a-vs-whey-b".into()))
            .await
            .unwrap();
        assert_eq!(res.product_ids.len(), 2);
        assert_eq!(res.title.as_deref(), Some("Whey A vs Whey B"));
    }

    #[tokio::test]
    async fn compare_path_passes_ids_through() {
        let state = AppState::fake(catalog(&[]));
        let a = "0f8fad5b-d9cb-469f-a165-70867728950e";
        let Json(res) = resolve_compare_path(State(state), Path(format!("{a},junk")))
            .await
            .unwrap();
        assert_eq!(res.product_ids.len(), 1);
        assert!(res.title.is_none());
    }
}
