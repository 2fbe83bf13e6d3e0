use serde::Serialize;

use crate::identifiers::{parse_batch, ProductId};

/// Hard cap on compared products; extra adds are dropped.
pub const MAX_SELECTION: usize = 4;

/// Immutable snapshot of the selected identifiers: insertion ordered,
/// unique, at most [`MAX_SELECTION`] long. Every mutation returns a new
/// snapshot and leaves `self` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Selection {
    ids: Vec<ProductId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a selection from an externally supplied list, applying the
    /// same rules as repeated [`Selection::add_one`].
    pub fn seeded<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = ProductId>,
    {
        ids.into_iter().fold(Self::new(), |sel, id| sel.add_one(id))
    }

    /// No-op if `id` is already present or the selection is full.
    pub fn add_one(&self, id: ProductId) -> Self {
        if self.ids.contains(&id) || self.is_full() {
            return self.clone();
        }
        let mut ids = self.ids.clone();
        ids.push(id);
        Self { ids }
    }

    /// Accepts one identifier or a comma separated, possibly URL-encoded
    /// list. Invalid tokens are skipped individually.
    pub fn add_many(&self, raw: &str) -> Self {
        parse_batch(raw)
            .into_iter()
            .fold(self.clone(), |sel, id| sel.add_one(id))
    }

    pub fn remove(&self, id: &ProductId) -> Self {
        Self {
            ids: self.ids.iter().copied().filter(|x| x != id).collect(),
        }
    }

    pub fn clear(&self) -> Self {
        Self::new()
    }

    /// Unparseable input is never contained.
    pub fn contains(&self, raw: &str) -> bool {
        ProductId::parse(raw.trim()).is_some_and(|id| self.ids.contains(&id))
    }

    pub fn ids(&self) -> &[ProductId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ids.len() >= MAX_SELECTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDS: [&str; 5] = [
        "0f8fad5b-d9cb-469f-a165-70867728950e",
        "7c9e6679-7425-40de-944b-e07fc1f90ae7",
        "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
        "6fa459ea-ee8a-3ca4-894e-db77e160355e",
        "886313e1-3b8a-5372-9b90-0c9aee199e5d",
    ];

    fn id(i: usize) -> ProductId {
        ProductId::parse(IDS[i]).unwrap()
    }

    #[test]
    fn add_is_idempotent() {
        let once = Selection::new().add_one(id(0));
        let twice = once.add_one(id(0));
        assert_eq!(once, twice);
        assert_eq!(twice.ids(), &[id(0)]);
    }

    #[test]
    fn fifth_product_is_dropped() {
        let full = Selection::seeded((0..4).map(id));
        assert!(full.is_full());
        let after = full.add_one(id(4));
        assert_eq!(after, full);
        assert_eq!(full.add_many(IDS[4]), full);
    }

    #[test]
    fn insertion_order_survives_removal() {
        let sel = Selection::new().add_one(id(0)).add_one(id(1)).add_one(id(2));
        assert_eq!(sel.ids(), &[id(0), id(1), id(2)]);
        let sel = sel.remove(&id(1));
        assert_eq!(sel.ids(), &[id(0), id(2)]);
        // removing an absent id changes nothing
        assert_eq!(sel.remove(&id(3)), sel);
    }

    #[test]
    fn batch_skips_invalid_tokens() {
        let sel = Selection::new().add_many(&format!("{},not-a-uuid,{}", IDS[0], IDS[1]));
        assert_eq!(sel.ids(), &[id(0), id(1)]);
    }

    #[test]
    fn batch_accepts_encoded_lists_and_appends() {
        let sel = Selection::new()
            .add_one(id(2))
            .add_many(&format!("{}%2C{}", IDS[0], IDS[2]));
        assert_eq!(sel.ids(), &[id(2), id(0)]);
    }

    #[test]
    fn mutations_leave_snapshot_untouched() {
        let before = Selection::new().add_one(id(0));
        let _ = before.add_one(id(1));
        let _ = before.clear();
        assert_eq!(before.ids(), &[id(0)]);
    }

    #[test]
    fn contains_checks_by_value() {
        let sel = Selection::new().add_one(id(0));
        assert!(sel.contains(IDS[0]));
        assert!(sel.contains(&IDS[0].to_uppercase()));
        assert!(!sel.contains(IDS[1]));
        assert!(!sel.contains("garbage"));
        assert!(!sel.clear().contains(IDS[0]));
    }

    #[test]
    fn seeded_dedupes_and_caps() {
        let sel = Selection::seeded([id(0), id(0), id(1), id(2), id(3), id(4)]);
        assert_eq!(sel.ids(), &[id(0), id(1), id(2), id(3)]);
    }

    #[test]
    fn serializes_as_plain_array() {
        let sel = Selection::new().add_one(id(1));
        assert_eq!(
            serde_json::to_value(&sel).unwrap(),
            serde_json::json!([IDS[1]])
        );
    }
}
