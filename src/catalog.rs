//! Menu browsing: item groups, item lists, search and variant resolution.

use alloc::sync::Arc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::client::Backend;
use crate::error::Result;
use crate::models::{CatalogItem, GroupId, ItemCode, ItemGroup, ProfileId, Variant, VariantFilter, VariantSet};

/// Read-through view of the backend catalog.
///
/// Keeps the last fetched item list for [`search`](Self::search) and the
/// last resolved template for [`filter_variants`](Self::filter_variants).
/// Empty listings are normal results, never errors.
#[derive(Debug)]
pub struct CatalogResolver<B> {
    /// Backend the catalog is read from.
    backend: Arc<B>,
    /// Items of the last `list_items` call.
    loaded: Mutex<Vec<CatalogItem>>,
    /// Last resolved template.
    variants: Mutex<Option<VariantSet>>,
}

impl<B: Backend> CatalogResolver<B> {
    /// Creates a resolver with nothing loaded.
    #[inline]
    #[must_use]
    pub const fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            loaded: Mutex::new(Vec::new()),
            variants: Mutex::new(None),
        }
    }

    /// Lists the item groups of a profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[inline]
    #[tracing::instrument(skip_all, fields(profile = %profile))]
    pub async fn list_groups(&self, profile: &ProfileId) -> Result<Vec<ItemGroup>> {
        let groups = self.backend.item_groups(profile).await?;
        tracing::debug!(count = groups.len(), "item groups loaded");
        Ok(groups)
    }

    /// Lists items of a profile, optionally restricted to one group, and
    /// makes them the search scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails. The previous search
    /// scope is kept in that case.
    #[inline]
    #[tracing::instrument(skip_all, fields(profile = %profile))]
    pub async fn list_items(
        &self,
        profile: &ProfileId,
        group: Option<&GroupId>,
    ) -> Result<Vec<CatalogItem>> {
        let items = self.backend.items(profile, group).await?;
        tracing::debug!(count = items.len(), "items loaded");
        self.loaded().clone_from(&items);
        Ok(items)
    }

    /// Items of the last successful [`list_items`](Self::list_items) call.
    #[inline]
    #[must_use]
    pub fn items(&self) -> Vec<CatalogItem> {
        self.loaded().clone()
    }

    /// Case-insensitive substring search over the loaded items' codes and
    /// names. A blank term returns everything loaded.
    #[inline]
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<CatalogItem> {
        let needle = term.trim().to_lowercase();
        let loaded = self.loaded();
        if needle.is_empty() {
            return loaded.clone();
        }
        loaded
            .iter()
            .filter(|item| item.matches_term(&needle))
            .cloned()
            .collect()
    }

    /// Fetches the variants of a template item.
    ///
    /// Asking again for the template resolved last is served from memory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SelfOrderError::NoVariants`] if the
    /// template has none, or a transport error.
    #[inline]
    #[tracing::instrument(skip_all, fields(template = %template))]
    pub async fn resolve_variants(&self, template: &ItemCode) -> Result<VariantSet> {
        if let Some(cached) = self.cached().as_ref().filter(|set| &set.template == template) {
            return Ok(cached.clone());
        }
        let set = self.backend.item_variants(template).await?;
        tracing::debug!(count = set.variants.len(), "variants resolved");
        *self.cached() = Some(set.clone());
        Ok(set)
    }

    /// Variants of the last resolved template that match `filter`.
    ///
    /// Empty until a template has been resolved.
    #[inline]
    #[must_use]
    pub fn filter_variants(&self, filter: &VariantFilter) -> Vec<Variant> {
        self.cached()
            .as_ref()
            .map(|set| set.filter(filter).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Locks the loaded item list.
    fn loaded(&self) -> MutexGuard<'_, Vec<CatalogItem>> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the variant cache.
    fn cached(&self) -> MutexGuard<'_, Option<VariantSet>> {
        self.variants.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::*;
    use crate::error::SelfOrderError;
    use crate::testing::{FakeBackend, catalog_item};

    fn latte_variant(code: &str, size: &str, milk: &str, price: i64) -> Variant {
        Variant {
            item: catalog_item(code, price),
            attributes: BTreeMap::from([
                ("Size".to_owned(), size.to_owned()),
                ("Milk".to_owned(), milk.to_owned()),
            ]),
        }
    }

    fn latte_set() -> VariantSet {
        VariantSet {
            template: ItemCode::from("LATTE"),
            variants: vec![
                latte_variant("LATTE-S-OAT", "Small", "Oat", 30_000),
                latte_variant("LATTE-L-OAT", "Large", "Oat", 38_000),
                latte_variant("LATTE-L-COW", "Large", "Cow", 35_000),
            ],
            attributes: BTreeMap::from([
                ("Size".to_owned(), vec!["Small".to_owned(), "Large".to_owned()]),
                ("Milk".to_owned(), vec!["Oat".to_owned(), "Cow".to_owned()]),
            ]),
        }
    }

    fn stocked_backend() -> Arc<FakeBackend> {
        let backend = Arc::new(FakeBackend::new());
        backend.script(|script| {
            let mut coffee = catalog_item("COFFEE", 15_000);
            coffee.item_name = "Black Coffee".to_owned();
            coffee.item_group = Some(GroupId::from("Drinks"));
            let mut cake = catalog_item("CAKE", 25_000);
            cake.item_group = Some(GroupId::from("Desserts"));
            let mut iced = catalog_item("ICED-TEA", 12_000);
            iced.item_group = Some(GroupId::from("Drinks"));
            script.items = vec![coffee, cake, iced];
            script.groups = vec![ItemGroup {
                name: GroupId::from("Drinks"),
                image: None,
            }];
            let _previous = script.variants.insert(ItemCode::from("LATTE"), latte_set());
        });
        backend
    }

    #[tokio::test]
    async fn empty_catalog_is_not_an_error() {
        let resolver = CatalogResolver::new(Arc::new(FakeBackend::new()));
        let profile = ProfileId::from("Main");
        assert!(resolver.list_groups(&profile).await.unwrap().is_empty());
        assert!(resolver.list_items(&profile, None).await.unwrap().is_empty());
        assert!(resolver.search("coffee").is_empty());
    }

    #[tokio::test]
    async fn search_scope_is_the_last_loaded_group() {
        let resolver = CatalogResolver::new(stocked_backend());
        let profile = ProfileId::from("Main");
        let drinks = resolver
            .list_items(&profile, Some(&GroupId::from("Drinks")))
            .await
            .unwrap();
        assert_eq!(drinks.len(), 2);

        let hits = resolver.search("  COFFEE ");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits.first().unwrap().item_code, ItemCode::from("COFFEE"));
        assert_eq!(resolver.search("black").len(), 1);
        assert!(resolver.search("cake").is_empty());
        assert_eq!(resolver.search("").len(), 2);
    }

    #[tokio::test]
    async fn variants_are_cached_and_filtered() {
        let backend = stocked_backend();
        let resolver = CatalogResolver::new(Arc::clone(&backend));
        assert!(resolver.filter_variants(&VariantFilter::new()).is_empty());

        let set = resolver.resolve_variants(&ItemCode::from("LATTE")).await.unwrap();
        assert_eq!(set.variants.len(), 3);

        backend.script(|script| script.variants.clear());
        let again = resolver.resolve_variants(&ItemCode::from("LATTE")).await.unwrap();
        assert_eq!(again, set);

        let large = resolver.filter_variants(&VariantFilter::new().select("Size", "Large"));
        assert_eq!(large.len(), 2);
        let large_oat =
            resolver.filter_variants(&VariantFilter::new().select("Size", "Large").select("Milk", "Oat"));
        assert_eq!(large_oat.len(), 1);
        assert_eq!(large_oat.first().unwrap().item.price, Decimal::from(38_000));
    }

    #[tokio::test]
    async fn unknown_template_has_no_variants() {
        let resolver = CatalogResolver::new(stocked_backend());
        let err = resolver.resolve_variants(&ItemCode::from("SOUP")).await.unwrap_err();
        assert!(matches!(err, SelfOrderError::NoVariants(_)));
    }
}
