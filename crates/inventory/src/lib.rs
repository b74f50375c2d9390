//! Inventory ledger.
//!
//! Owns product stock quantities and the rules for reading and mutating them,
//! implemented purely as deterministic domain logic (no IO, no storage).

pub mod ledger;
pub mod product;

pub use ledger::{check_availability, classify, decrement, list_critical, restock, StockLevel};
pub use product::{NewProduct, Product, ProductPatch, DEFAULT_STOCK_MINIMO, DEFAULT_UNIT};
