//! Cart line model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ItemCode, SessionId};

/// One line in the guest's cart.
///
/// The line amount is never stored; [`CartItem::amount`] always derives
/// it from quantity and unit rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Sellable item code.
    item_code: ItemCode,
    /// Display name.
    item_name: String,
    /// Quantity, at least one.
    qty: u32,
    /// Unit rate, never negative.
    #[serde(with = "rust_decimal::serde::float")]
    rate: Decimal,
    /// Free-text kitchen note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

impl CartItem {
    /// Creates a single-quantity line without a note.
    ///
    /// Negative rates are clamped to zero.
    #[inline]
    #[must_use]
    pub fn new<T: Into<String>>(item_code: ItemCode, item_name: T, rate: Decimal) -> Self {
        Self {
            item_code,
            item_name: item_name.into(),
            qty: 1,
            rate: rate.max(Decimal::ZERO),
            note: None,
        }
    }

    /// Attaches a note. Blank notes are treated as no note.
    #[inline]
    #[must_use]
    pub fn with_note<T: AsRef<str>>(mut self, note: T) -> Self {
        self.note = normalize_note(note.as_ref());
        self
    }

    /// Item code.
    #[inline]
    #[must_use]
    pub const fn item_code(&self) -> &ItemCode {
        &self.item_code
    }

    /// Display name.
    #[inline]
    #[must_use]
    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    /// Quantity.
    #[inline]
    #[must_use]
    pub const fn qty(&self) -> u32 {
        self.qty
    }

    /// Unit rate.
    #[inline]
    #[must_use]
    pub const fn rate(&self) -> Decimal {
        self.rate
    }

    /// Kitchen note, if any.
    #[inline]
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Line amount: quantity × rate.
    #[inline]
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.rate * Decimal::from(self.qty)
    }

    /// Returns `true` if an add of `other` should bump this line's
    /// quantity instead of appending a new line: same item and neither
    /// line carries a note.
    #[inline]
    #[must_use]
    pub fn merges_with(&self, other: &Self) -> bool {
        self.item_code == other.item_code && self.note.is_none() && other.note.is_none()
    }

    /// Sets the quantity. Callers guarantee `qty >= 1`.
    pub(crate) const fn set_qty(&mut self, qty: u32) {
        self.qty = qty;
    }

    /// Replaces the note.
    pub(crate) fn set_note(&mut self, note: &str) {
        self.note = normalize_note(note);
    }

    /// Wire representation with the derived amount filled in.
    #[inline]
    #[must_use]
    pub fn to_line(&self) -> CartLine {
        CartLine {
            item_code: self.item_code.clone(),
            item_name: self.item_name.clone(),
            qty: self.qty,
            rate: self.rate,
            amount: self.amount(),
            note: self.note.clone(),
        }
    }
}

/// Trims a note and maps blank text to `None`.
fn normalize_note(note: &str) -> Option<String> {
    let trimmed = note.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Cart line as sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Item code.
    pub item_code: ItemCode,
    /// Display name.
    pub item_name: String,
    /// Quantity.
    pub qty: u32,
    /// Unit rate.
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
    /// Quantity × rate.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Kitchen note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Cart persisted in client storage, tagged with the session it belongs to
/// so a stale cart never leaks into a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCart {
    /// Owning session.
    pub session: SessionId,
    /// Lines in insertion order.
    pub lines: Vec<CartItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coffee() -> CartItem {
        CartItem::new(ItemCode::from("COFFEE"), "Coffee", Decimal::from(15_000))
    }

    #[test]
    fn amount_is_qty_times_rate() {
        let mut item = coffee();
        item.set_qty(3);
        assert_eq!(item.amount(), Decimal::from(45_000));
    }

    #[test]
    fn blank_note_is_no_note() {
        let item = coffee().with_note("   ");
        assert!(item.note().is_none());
        let noted = coffee().with_note("  well done ");
        assert_eq!(noted.note(), Some("well done"));
    }

    #[test]
    fn noted_lines_never_merge() {
        let plain = coffee();
        let noted = coffee().with_note("no sugar");
        assert!(plain.merges_with(&coffee()));
        assert!(!plain.merges_with(&noted));
        assert!(!noted.merges_with(&noted.clone()));
    }

    #[test]
    fn negative_rate_is_clamped() {
        let item = CartItem::new(ItemCode::from("X"), "X", Decimal::from(-5));
        assert_eq!(item.rate(), Decimal::ZERO);
    }

    #[test]
    fn wire_line_carries_amount_as_number() {
        let mut item = coffee();
        item.set_qty(2);
        let json = serde_json::to_value(item.to_line()).unwrap();
        assert_eq!(json["amount"], 30_000.0);
        assert_eq!(json["item_code"], "COFFEE");
        assert!(json.get("note").is_none());
    }
}
