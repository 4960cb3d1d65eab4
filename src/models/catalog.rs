//! Read-only catalog projections: item groups, items and variants.

use alloc::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::loose;
use super::{CartItem, GroupId, ItemCode};
use crate::error::{Result, SelfOrderError};

/// A menu section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemGroup {
    /// Group name.
    pub name: GroupId,
    /// Optional image.
    #[serde(default)]
    pub image: Option<String>,
}

/// A sellable item as listed on the menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Item code.
    pub item_code: ItemCode,
    /// Display name.
    pub item_name: String,
    /// Whether this item is a template that expands into variants.
    pub has_variants: bool,
    /// Selling price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Optional image.
    pub image: Option<String>,
    /// Menu section.
    pub item_group: Option<GroupId>,
}

impl CatalogItem {
    /// Builds a typed item from a raw record.
    ///
    /// Missing display names fall back to the item code, missing or
    /// negative prices to zero.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::MalformedPayload`] if the record has no
    /// item code.
    #[inline]
    pub fn from_record(record: CatalogItemRecord) -> Result<Self> {
        let code = record
            .item_code
            .filter(|code| !code.trim().is_empty())
            .ok_or_else(|| SelfOrderError::MalformedPayload("catalog item without item_code".to_owned()))?;
        let item_name = record
            .item_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| code.clone());
        let price = record.price.unwrap_or_default().max(Decimal::ZERO);
        if record.price.is_some_and(|raw| raw < Decimal::ZERO) {
            tracing::warn!(item = %code, "negative price clamped to zero");
        }
        Ok(Self {
            item_code: ItemCode::new(code),
            item_name,
            has_variants: record.has_variants.unwrap_or(false),
            price,
            image: record.image.filter(|image| !image.is_empty()),
            item_group: record.item_group.filter(|group| !group.is_empty()).map(GroupId::new),
        })
    }

    /// Turns the item into a cart line.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::TemplateNotAddable`] for template items;
    /// resolve a [`Variant`] first.
    #[inline]
    pub fn to_cart_item(&self) -> Result<CartItem> {
        if self.has_variants {
            return Err(SelfOrderError::TemplateNotAddable(self.item_code.clone()));
        }
        Ok(CartItem::new(
            self.item_code.clone(),
            self.item_name.clone(),
            self.price,
        ))
    }

    /// Case-insensitive substring match against code or name.
    pub(crate) fn matches_term(&self, needle_lower: &str) -> bool {
        self.item_code.as_inner().to_lowercase().contains(needle_lower)
            || self.item_name.to_lowercase().contains(needle_lower)
    }
}

/// Raw catalog item as emitted by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CatalogItemRecord {
    /// Item code.
    #[serde(default)]
    pub item_code: Option<String>,
    /// Display name.
    #[serde(default)]
    pub item_name: Option<String>,
    /// Template flag.
    #[serde(default, deserialize_with = "loose::flag")]
    pub has_variants: Option<bool>,
    /// Selling price.
    #[serde(default, deserialize_with = "loose::decimal")]
    pub price: Option<Decimal>,
    /// Image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Item group.
    #[serde(default)]
    pub item_group: Option<String>,
    /// Variant attributes (only on variant records).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// A concrete purchasable variant of a template item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// The variant as a sellable item.
    pub item: CatalogItem,
    /// Attribute name → value (e.g. `"Size" → "Large"`).
    pub attributes: BTreeMap<String, String>,
}

impl Variant {
    /// Builds a variant from a raw record.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::MalformedPayload`] if the record has no
    /// item code.
    #[inline]
    pub fn from_record(mut record: CatalogItemRecord) -> Result<Self> {
        let attributes = core::mem::take(&mut record.attributes);
        let mut item = CatalogItem::from_record(record)?;
        item.has_variants = false;
        Ok(Self { item, attributes })
    }
}

/// Variants of one template plus the distinct values seen per attribute,
/// used to build filter controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSet {
    /// Template the variants belong to.
    pub template: ItemCode,
    /// Concrete variants.
    pub variants: Vec<Variant>,
    /// Attribute name → distinct values in first-seen order.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl VariantSet {
    /// Builds the set from raw variant records and the attribute value
    /// lists the backend advertised.
    ///
    /// Values observed on variants but missing from the advertised lists
    /// are appended, so every variant stays reachable through the filters.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::NoVariants`] if no usable variant is
    /// present.
    #[inline]
    pub fn from_record(template: ItemCode, record: VariantsRecord) -> Result<Self> {
        let variants: Vec<Variant> = record
            .variants
            .into_iter()
            .filter_map(|raw| match Variant::from_record(raw) {
                Ok(variant) => Some(variant),
                Err(err) => {
                    tracing::warn!(template = %template, error = %err, "skipping malformed variant");
                    None
                }
            })
            .collect();
        if variants.is_empty() {
            return Err(SelfOrderError::NoVariants(template));
        }

        let mut attributes = record.attributes;
        for variant in &variants {
            for (name, value) in &variant.attributes {
                let values = attributes.entry(name.clone()).or_default();
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }

        Ok(Self {
            template,
            variants,
            attributes,
        })
    }

    /// Variants matching every constraint in `filter`.
    #[inline]
    #[must_use]
    pub fn filter<'set>(&'set self, filter: &VariantFilter) -> Vec<&'set Variant> {
        self.variants
            .iter()
            .filter(|variant| filter.matches(variant))
            .collect()
    }
}

/// Raw variants response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariantsRecord {
    /// Variant items.
    #[serde(default)]
    pub variants: Vec<CatalogItemRecord>,
    /// Advertised attribute value lists.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// Attribute selection narrowing a [`VariantSet`].
///
/// A variant matches when, for every selected attribute, its value equals
/// the selection. Unselected attributes are ignored.
///
/// # Examples
///
/// ```
/// use selforder_rs::models::VariantFilter;
///
/// let filter = VariantFilter::new().select("Size", "Large").select("Milk", "Oat");
/// assert_eq!(filter.len(), 2);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VariantFilter {
    /// Attribute name → required value.
    selected: BTreeMap<String, String>,
}

impl VariantFilter {
    /// Creates an empty filter that matches every variant.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `attribute` to equal `value`, replacing any earlier
    /// selection for the same attribute.
    #[inline]
    #[must_use]
    pub fn select<N: Into<String>, V: Into<String>>(mut self, attribute: N, value: V) -> Self {
        let _previous = self.selected.insert(attribute.into(), value.into());
        self
    }

    /// Drops the constraint on `attribute`.
    #[inline]
    #[must_use]
    pub fn clear(mut self, attribute: &str) -> Self {
        let _previous = self.selected.remove(attribute);
        self
    }

    /// Number of constrained attributes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Returns `true` when nothing is constrained.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Returns `true` if `variant` satisfies all constraints.
    #[inline]
    #[must_use]
    pub fn matches(&self, variant: &Variant) -> bool {
        self.selected
            .iter()
            .all(|(name, value)| variant.attributes.get(name) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants_json() -> VariantsRecord {
        serde_json::from_str(
            r#"{
                "variants": [
                    {"item_code": "LATTE-S-OAT", "item_name": "Latte S Oat", "price": 30000,
                     "attributes": {"Size": "Small", "Milk": "Oat"}},
                    {"item_code": "LATTE-L-OAT", "item_name": "Latte L Oat", "price": 38000,
                     "attributes": {"Size": "Large", "Milk": "Oat"}},
                    {"item_code": "LATTE-L-COW", "item_name": "Latte L", "price": "35000.00",
                     "attributes": {"Size": "Large", "Milk": "Cow"}},
                    {"item_name": "broken"}
                ],
                "attributes": {"Size": ["Small", "Large"]}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn item_record_defaults() {
        let record: CatalogItemRecord =
            serde_json::from_str(r#"{"item_code": "TEA", "has_variants": 0}"#).unwrap();
        let item = CatalogItem::from_record(record).unwrap();
        assert_eq!(item.item_name, "TEA");
        assert_eq!(item.price, Decimal::ZERO);
        assert!(!item.has_variants);
        assert!(item.item_group.is_none());
    }

    #[test]
    fn item_record_without_code_is_malformed() {
        let err = CatalogItem::from_record(CatalogItemRecord::default()).unwrap_err();
        assert!(matches!(err, SelfOrderError::MalformedPayload(_)));
    }

    #[test]
    fn templates_are_not_addable() {
        let record: CatalogItemRecord =
            serde_json::from_str(r#"{"item_code": "LATTE", "has_variants": 1, "price": 30000}"#)
                .unwrap();
        let item = CatalogItem::from_record(record).unwrap();
        let err = item.to_cart_item().unwrap_err();
        assert!(matches!(err, SelfOrderError::TemplateNotAddable(_)));
    }

    #[test]
    fn variant_set_merges_observed_attribute_values() {
        let set = VariantSet::from_record(ItemCode::from("LATTE"), variants_json()).unwrap();
        assert_eq!(set.variants.len(), 3);
        assert_eq!(set.attributes["Size"], vec!["Small", "Large"]);
        assert_eq!(set.attributes["Milk"], vec!["Oat", "Cow"]);
        assert_eq!(set.variants[2].item.price, Decimal::from(35_000));
    }

    #[test]
    fn empty_variant_set_is_no_variants() {
        let err =
            VariantSet::from_record(ItemCode::from("LATTE"), VariantsRecord::default()).unwrap_err();
        assert!(matches!(err, SelfOrderError::NoVariants(_)));
    }

    #[test]
    fn filter_intersects_selected_attributes_only() {
        let set = VariantSet::from_record(ItemCode::from("LATTE"), variants_json()).unwrap();
        assert_eq!(set.filter(&VariantFilter::new()).len(), 3);

        let large = VariantFilter::new().select("Size", "Large");
        assert_eq!(set.filter(&large).len(), 2);

        let large_oat = large.clone().select("Milk", "Oat");
        let matched = set.filter(&large_oat);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].item.item_code, ItemCode::from("LATTE-L-OAT"));

        let relaxed = large_oat.clear("Size");
        assert_eq!(set.filter(&relaxed).len(), 2);

        let unknown = VariantFilter::new().select("Syrup", "Vanilla");
        assert!(set.filter(&unknown).is_empty());
    }
}
