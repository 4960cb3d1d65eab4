//! Cart model and the engine that persists it.
//!
//! [`Cart`] is a pure in-memory list of lines. [`CartEngine`] applies
//! guest actions to the active session's cart, writes the result to client
//! storage synchronously, then fires a best-effort save-through to the
//! backend without waiting for it.

use alloc::sync::Arc;

use rust_decimal::Decimal;

use crate::client::Backend;
use crate::error::{Result, SelfOrderError};
use crate::models::{CartItem, CartLine, CatalogItem, Notice, StoredCart, Variant};
use crate::session::SessionCore;
use crate::storage::Storage;

/// Ordered list of cart lines.
///
/// Invariants: every line has a quantity of at least one, and two lines
/// for the same item without notes never coexist; adding such an item
/// again bumps the existing line.
///
/// # Examples
///
/// ```
/// use rust_decimal::Decimal;
/// use selforder_rs::cart::Cart;
/// use selforder_rs::models::{CartItem, ItemCode};
///
/// let coffee = CartItem::new(ItemCode::from("COFFEE"), "Coffee", Decimal::from(15_000));
/// let mut cart = Cart::new();
/// cart.add_item(coffee.clone(), 1).unwrap();
/// cart.add_item(coffee, 1).unwrap();
/// assert_eq!(cart.len(), 1);
/// assert_eq!(cart.total(), Decimal::from(30_000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    /// Lines in insertion order.
    lines: Vec<CartItem>,
}

impl Cart {
    /// Creates an empty cart.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Rebuilds a cart from stored lines, dropping any without quantity.
    #[inline]
    #[must_use]
    pub fn from_lines(lines: Vec<CartItem>) -> Self {
        Self {
            lines: lines.into_iter().filter(|line| line.qty() >= 1).collect(),
        }
    }

    /// Lines in insertion order.
    #[inline]
    #[must_use]
    pub fn lines(&self) -> &[CartItem] {
        &self.lines
    }

    /// Number of lines.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` if the cart has no lines.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of quantities over all lines.
    #[inline]
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.qty())).sum()
    }

    /// Sum of all line amounts.
    #[inline]
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartItem::amount).sum()
    }

    /// Adds `quantity` of `item`.
    ///
    /// Bumps the existing line when the item matches one without a note
    /// and `item` has no note either; otherwise appends a new line.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidQuantity`] if `quantity` is below
    /// one or the line would overflow.
    #[inline]
    pub fn add_item(&mut self, mut item: CartItem, quantity: i64) -> Result<()> {
        let added = positive_quantity(quantity)?;
        if let Some(line) = self.lines.iter_mut().find(|line| line.merges_with(&item)) {
            let merged = line
                .qty()
                .checked_add(added)
                .ok_or(SelfOrderError::InvalidQuantity(quantity))?;
            line.set_qty(merged);
            return Ok(());
        }
        item.set_qty(added);
        self.lines.push(item);
        Ok(())
    }

    /// Sets the quantity of a line. A quantity below one removes it.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::LineNotFound`] for an unknown line and
    /// [`SelfOrderError::InvalidQuantity`] for quantities beyond `u32`.
    #[inline]
    pub fn update_quantity(&mut self, line: usize, quantity: i64) -> Result<()> {
        if quantity < 1 {
            let _removed = self.remove_item(line)?;
            return Ok(());
        }
        let qty = positive_quantity(quantity)?;
        self.line_mut(line)?.set_qty(qty);
        Ok(())
    }

    /// Adds one to a line's quantity.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::LineNotFound`] for an unknown line.
    #[inline]
    pub fn increment(&mut self, line: usize) -> Result<()> {
        let current = self.line_mut(line)?.qty();
        self.update_quantity(line, i64::from(current) + 1)
    }

    /// Takes one off a line's quantity, removing the line at zero.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::LineNotFound`] for an unknown line.
    #[inline]
    pub fn decrement(&mut self, line: usize) -> Result<()> {
        let current = self.line_mut(line)?.qty();
        self.update_quantity(line, i64::from(current) - 1)
    }

    /// Removes a line and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::LineNotFound`] for an unknown line.
    #[inline]
    pub fn remove_item(&mut self, line: usize) -> Result<CartItem> {
        if line >= self.lines.len() {
            return Err(SelfOrderError::LineNotFound(line));
        }
        Ok(self.lines.remove(line))
    }

    /// Replaces a line's note. Blank text clears it.
    ///
    /// A line left without a note folds into an existing noteless line for
    /// the same item, so later line indices shift down by one.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::LineNotFound`] for an unknown line and
    /// [`SelfOrderError::InvalidQuantity`] if folding would overflow.
    #[inline]
    pub fn set_note(&mut self, line: usize, text: &str) -> Result<()> {
        let mut edited = self.line_mut(line)?.clone();
        edited.set_note(text);
        let twin = self
            .lines
            .iter()
            .enumerate()
            .find(|&(index, other)| index != line && other.merges_with(&edited))
            .map(|(index, _)| index);
        if let Some(other) = twin {
            let target = self.line_mut(other)?;
            let merged = target
                .qty()
                .checked_add(edited.qty())
                .ok_or_else(|| SelfOrderError::InvalidQuantity(i64::from(edited.qty())))?;
            target.set_qty(merged);
            let _folded = self.lines.remove(line);
        } else {
            *self.line_mut(line)? = edited;
        }
        Ok(())
    }

    /// Removes every line.
    #[inline]
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Mutable access to a line.
    fn line_mut(&mut self, line: usize) -> Result<&mut CartItem> {
        self.lines
            .get_mut(line)
            .ok_or(SelfOrderError::LineNotFound(line))
    }
}

/// Converts a requested quantity to a line quantity.
fn positive_quantity(quantity: i64) -> Result<u32> {
    u32::try_from(quantity)
        .ok()
        .filter(|qty| *qty >= 1)
        .ok_or(SelfOrderError::InvalidQuantity(quantity))
}

/// Applies guest actions to the active session's cart.
///
/// Every mutation is applied in memory and written to client storage
/// before the call returns; the backend save-through runs in the
/// background and its failure only produces a
/// [`Notice::CartSaveFailed`]. Mutations are refused once the session has
/// expired.
#[derive(Debug)]
pub struct CartEngine<B, S> {
    /// Shared session state.
    core: Arc<SessionCore<B, S>>,
}

impl<B, S> Clone for CartEngine<B, S> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<B: Backend + 'static, S: Storage + 'static> CartEngine<B, S> {
    /// Creates an engine over the shared session state.
    pub(crate) const fn new(core: Arc<SessionCore<B, S>>) -> Self {
        Self { core }
    }

    /// Adds `quantity` of `item`.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::InvalidQuantity`] for quantities below
    /// one and [`SelfOrderError::SessionExpired`] once the session ended.
    #[inline]
    pub fn add_item(&self, item: CartItem, quantity: i64) -> Result<()> {
        self.mutate(|cart| cart.add_item(item, quantity))
    }

    /// Adds a plain catalog item.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::TemplateNotAddable`] for template items,
    /// plus the errors of [`Self::add_item`].
    #[inline]
    pub fn add_catalog_item(&self, item: &CatalogItem, quantity: i64) -> Result<()> {
        self.add_item(item.to_cart_item()?, quantity)
    }

    /// Adds a resolved variant.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add_catalog_item`].
    #[inline]
    pub fn add_variant(&self, variant: &Variant, quantity: i64) -> Result<()> {
        self.add_catalog_item(&variant.item, quantity)
    }

    /// Sets a line's quantity; below one removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::LineNotFound`] for an unknown line.
    #[inline]
    pub fn update_quantity(&self, line: usize, quantity: i64) -> Result<()> {
        self.mutate(|cart| cart.update_quantity(line, quantity))
    }

    /// The `+` control.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::LineNotFound`] for an unknown line.
    #[inline]
    pub fn increment(&self, line: usize) -> Result<()> {
        self.mutate(|cart| cart.increment(line))
    }

    /// The `-` control; removes the line below one.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::LineNotFound`] for an unknown line.
    #[inline]
    pub fn decrement(&self, line: usize) -> Result<()> {
        self.mutate(|cart| cart.decrement(line))
    }

    /// Removes a line.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::LineNotFound`] for an unknown line.
    #[inline]
    pub fn remove_item(&self, line: usize) -> Result<CartItem> {
        self.mutate(|cart| cart.remove_item(line))
    }

    /// Edits a line's note.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::LineNotFound`] for an unknown line.
    #[inline]
    pub fn set_note(&self, line: usize, text: &str) -> Result<()> {
        self.mutate(|cart| cart.set_note(line, text))
    }

    /// Empties the cart. Allowed in every session state.
    #[inline]
    pub fn clear(&self) {
        let snapshot = {
            let mut ctx = self.core.context();
            ctx.cart.clear();
            let active = ctx.active().ok().map(|session| session.id.clone());
            match active {
                Some(session) => {
                    let snapshot = StoredCart {
                        session,
                        lines: Vec::new(),
                    };
                    self.store(&snapshot);
                    Some(snapshot)
                }
                None => {
                    if let Err(err) = self.core.storage.clear_cart() {
                        tracing::warn!(error = %err, "could not clear stored cart");
                    }
                    None
                }
            }
        };
        if let Some(cleared) = snapshot {
            self.save_through(cleared);
        }
    }

    /// Copy of the current cart.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Cart {
        self.core.context().cart.clone()
    }

    /// Copy of the current lines.
    #[inline]
    #[must_use]
    pub fn lines(&self) -> Vec<CartItem> {
        self.core.context().cart.lines().to_vec()
    }

    /// Sum of all line amounts.
    #[inline]
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.core.context().cart.total()
    }

    /// Sum of quantities.
    #[inline]
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.core.context().cart.item_count()
    }

    /// Returns `true` if the cart has no lines.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.context().cart.is_empty()
    }

    /// Applies `op` to the active cart, then persists the result.
    ///
    /// The context stays locked through the storage write so snapshots
    /// reach storage in mutation order.
    fn mutate<R, F: FnOnce(&mut Cart) -> Result<R>>(&self, op: F) -> Result<R> {
        let (outcome, snapshot) = {
            let mut ctx = self.core.context();
            let session = ctx.active()?.id.clone();
            let outcome = op(&mut ctx.cart)?;
            let snapshot = StoredCart {
                session,
                lines: ctx.cart.lines().to_vec(),
            };
            self.store(&snapshot);
            (outcome, snapshot)
        };
        self.save_through(snapshot);
        Ok(outcome)
    }

    /// Writes the snapshot to client storage. Failures are logged only.
    fn store(&self, snapshot: &StoredCart) {
        if let Err(err) = self.core.storage.set_cart(snapshot) {
            tracing::warn!(error = %err, "could not persist cart");
        }
    }

    /// Fire-and-forget save of the snapshot to the backend.
    fn save_through(&self, snapshot: StoredCart) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime, cart save-through skipped");
            return;
        };
        let core = Arc::clone(&self.core);
        let _task = runtime.spawn(async move {
            let lines: Vec<CartLine> = snapshot.lines.iter().map(CartItem::to_line).collect();
            if let Err(err) = core.backend.save_cart(&snapshot.session, &lines).await {
                let failure = SelfOrderError::BackendSaveFailed {
                    source: Box::new(err),
                };
                tracing::warn!(error = %failure, "cart save-through failed");
                core.notify(Notice::CartSaveFailed {
                    message: failure.to_string(),
                });
            }
        });
    }
}
