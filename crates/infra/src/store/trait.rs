use serde::{Deserialize, Serialize};
use thiserror::Error;

use atelier_auth::User;
use atelier_core::{DomainError, ExpectedVersion, OrderId, ProductId, UserId};
use atelier_inventory::Product;
use atelier_orders::{Order, StockMovement};

use std::sync::Arc;

/// Storage operation error.
///
/// These are infrastructure errors as opposed to domain errors. The service
/// treats `Concurrency` as "re-read and re-plan"; everything else is final.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row changed since it was read, or a write no longer fits current rows.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("row not found: {0}")]
    NotFound(String),

    /// The change set is malformed (e.g. touches the same row twice).
    #[error("store invariant violated: {0}")]
    Invariant(String),

    #[error("store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => DomainError::Conflict(msg),
            StoreError::NotFound(_) => DomainError::NotFound,
            StoreError::Invariant(msg) => DomainError::InvariantViolation(msg),
            StoreError::Poisoned => DomainError::invariant("store lock poisoned"),
        }
    }
}

/// User rows carry no version; writes are last-writer-wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserWrite {
    Put(User),
    Delete(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductWrite {
    /// Insert or replace. The stored version is bumped past the current one.
    Put {
        product: Product,
        expected: ExpectedVersion,
    },
    Delete {
        id: ProductId,
        expected: ExpectedVersion,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderWrite {
    /// Insert or replace. The stored version is bumped past the current one.
    Put {
        order: Order,
        expected: ExpectedVersion,
    },
    Delete {
        id: OrderId,
        expected: ExpectedVersion,
    },
}

impl ProductWrite {
    pub fn insert(product: Product) -> Self {
        ProductWrite::Put {
            product,
            expected: ExpectedVersion::NoRow,
        }
    }

    /// Replace `product`, which must still be at the version it carries.
    pub fn update(product: Product) -> Self {
        let expected = ExpectedVersion::of(&product);
        ProductWrite::Put { product, expected }
    }
}

impl OrderWrite {
    pub fn insert(order: Order) -> Self {
        OrderWrite::Put {
            order,
            expected: ExpectedVersion::NoRow,
        }
    }

    /// Replace `order`, which must still be at the version it carries.
    pub fn update(order: Order) -> Self {
        let expected = ExpectedVersion::of(&order);
        OrderWrite::Put { order, expected }
    }
}

/// A unit of work committed atomically.
///
/// Each row may appear at most once per table, and a product touched by a
/// stock movement may not also be written in the same set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub users: Vec<UserWrite>,
    pub products: Vec<ProductWrite>,
    pub orders: Vec<OrderWrite>,
    pub stock: Vec<StockMovement>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.products.is_empty()
            && self.orders.is_empty()
            && self.stock.is_empty()
    }

    pub fn with_user(mut self, write: UserWrite) -> Self {
        self.users.push(write);
        self
    }

    pub fn with_product(mut self, write: ProductWrite) -> Self {
        self.products.push(write);
        self
    }

    pub fn with_order(mut self, write: OrderWrite) -> Self {
        self.orders.push(write);
        self
    }

    pub fn with_stock<I>(mut self, movements: I) -> Self
    where
        I: IntoIterator<Item = StockMovement>,
    {
        self.stock.extend(movements);
        self
    }
}

/// Whole-store export, also used to seed a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkshopSnapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub orders: Vec<Order>,
}

/// Row store for users, products and orders.
///
/// Implementations must:
/// - apply a `ChangeSet` atomically (all writes or none, never partially visible)
/// - check every `ExpectedVersion` and stock movement version under one lock
/// - refuse any movement that would take `stock_actual` below zero
/// - keep SKUs unique and keep order lines pointing at existing products
pub trait WorkshopStore: Send + Sync {
    fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    fn list_users(&self) -> Result<Vec<User>, StoreError>;

    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;
    fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;
    fn list_orders(&self) -> Result<Vec<Order>, StoreError>;

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;

    /// Every table as of one point between commits.
    fn snapshot(&self) -> Result<WorkshopSnapshot, StoreError>;
}

impl<S> WorkshopStore for Arc<S>
where
    S: WorkshopStore + ?Sized,
{
    fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).get_user(id)
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        (**self).list_users()
    }

    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id)
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        (**self).list_products()
    }

    fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).get_order(id)
    }

    fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        (**self).list_orders()
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        (**self).commit(changes)
    }

    fn snapshot(&self) -> Result<WorkshopSnapshot, StoreError> {
        (**self).snapshot()
    }
}
