//! Guest ordering session engine for QR-code restaurant self ordering.
//!
//! A guest scans a table (dine-in) or shop (takeaway) code, browses the
//! menu, builds a cart and submits the order, optionally paying through an
//! external payment request first. This crate holds the session, cart and
//! checkout logic of that flow; pricing, inventory and access control stay
//! behind the [`client::Backend`] collaborator.
//!
//! Start with [`self_order::SelfOrder`], which wires the
//! [`session::SessionManager`], [`cart::CartEngine`],
//! [`catalog::CatalogResolver`] and [`checkout::CheckoutOrchestrator`]
//! around one backend and one [`storage::Storage`].

extern crate alloc;

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod payment;
pub mod self_order;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;
