use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use atelier_auth::User;
use atelier_core::{ExpectedVersion, OrderId, ProductId, UserId};
use atelier_inventory::{decrement, restock, Product};
use atelier_orders::{Order, StockMovement};

use super::r#trait::{
    ChangeSet, OrderWrite, ProductWrite, StoreError, UserWrite, WorkshopSnapshot, WorkshopStore,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
}

impl Tables {
    fn sorted_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    fn sorted_products(&self) -> Vec<Product> {
        let mut products: Vec<Product> = self.products.values().cloned().collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        products
    }

    fn sorted_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }
}

/// Rows a change set will write; `None` marks a deletion.
#[derive(Debug, Default)]
struct Staged {
    users: HashMap<UserId, Option<User>>,
    products: HashMap<ProductId, Option<Product>>,
    orders: HashMap<OrderId, Option<Order>>,
}

impl Staged {
    fn product_exists(&self, tables: &Tables, id: ProductId) -> bool {
        match self.products.get(&id) {
            Some(row) => row.is_some(),
            None => tables.products.contains_key(&id),
        }
    }

    /// Orders as they will look after the commit.
    fn orders_after<'a>(&'a self, tables: &'a Tables) -> impl Iterator<Item = &'a Order> + 'a {
        tables
            .orders
            .values()
            .filter(move |o| !self.orders.contains_key(&o.id))
            .chain(self.orders.values().flatten())
    }

    /// Products as they will look after the commit.
    fn products_after<'a>(&'a self, tables: &'a Tables) -> impl Iterator<Item = &'a Product> + 'a {
        tables
            .products
            .values()
            .filter(move |p| !self.products.contains_key(&p.id))
            .chain(self.products.values().flatten())
    }
}

/// In-memory workshop store.
///
/// Intended for tests/dev and the report tool. One `RwLock` guards all tables,
/// so a commit is trivially atomic with respect to readers.
#[derive(Debug, Default)]
pub struct InMemoryWorkshopStore {
    tables: RwLock<Tables>,
}

impl InMemoryWorkshopStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from an exported snapshot, keeping row versions.
    pub fn from_snapshot(snapshot: WorkshopSnapshot) -> Result<Self, StoreError> {
        let mut tables = Tables::default();

        for user in snapshot.users {
            let id = user.id;
            if tables.users.insert(id, user).is_some() {
                return Err(StoreError::Invariant(format!("duplicate user {id}")));
            }
        }

        let mut skus = HashSet::new();
        for product in snapshot.products {
            if !skus.insert(product.sku.clone()) {
                return Err(StoreError::Invariant(format!(
                    "duplicate sku '{}'",
                    product.sku
                )));
            }
            let id = product.id;
            if tables.products.insert(id, product).is_some() {
                return Err(StoreError::Invariant(format!("duplicate product {id}")));
            }
        }

        for order in snapshot.orders {
            if let Some(missing) = missing_product(&order, |id| tables.products.contains_key(&id)) {
                return Err(StoreError::Invariant(format!(
                    "order {} references unknown product {missing}",
                    order.id
                )));
            }
            let id = order.id;
            if tables.orders.insert(id, order).is_some() {
                return Err(StoreError::Invariant(format!("duplicate order {id}")));
            }
        }

        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }
}

fn missing_product(order: &Order, exists: impl Fn(ProductId) -> bool) -> Option<ProductId> {
    order
        .lines
        .iter()
        .map(|l| l.product_id)
        .chain(order.reserved.iter().map(|r| r.product_id))
        .find(|id| !exists(*id))
}

fn check_version(
    what: &str,
    expected: ExpectedVersion,
    actual: Option<u64>,
) -> Result<(), StoreError> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(StoreError::Concurrency(format!(
            "{what}: expected {expected:?}, found {actual:?}"
        )))
    }
}

fn next_version(current: Option<u64>) -> u64 {
    current.map_or(0, |v| v + 1)
}

fn apply_movement(product: &mut Product, movement: &StockMovement) -> Result<(), StoreError> {
    if movement.delta == 0 {
        return Ok(());
    }
    let qty = u32::try_from(movement.delta.unsigned_abs()).map_err(|_| {
        StoreError::Invariant(format!("stock delta {} out of range", movement.delta))
    })?;
    let applied = if movement.delta < 0 {
        decrement(product, qty)
    } else {
        restock(product, qty)
    };
    applied.map_err(|e| StoreError::Invariant(e.to_string()))?;
    product.version += 1;
    Ok(())
}

fn stage(tables: &Tables, changes: ChangeSet) -> Result<Staged, StoreError> {
    let mut staged = Staged::default();

    for write in changes.users {
        let (id, row) = match write {
            UserWrite::Put(user) => (user.id, Some(user)),
            UserWrite::Delete(id) => {
                if !tables.users.contains_key(&id) {
                    return Err(StoreError::NotFound(format!("user {id}")));
                }
                (id, None)
            }
        };
        if staged.users.insert(id, row).is_some() {
            return Err(StoreError::Invariant(format!("user {id} written twice")));
        }
    }

    for write in changes.products {
        let (id, row) = match write {
            ProductWrite::Put {
                mut product,
                expected,
            } => {
                let current = tables.products.get(&product.id).map(|p| p.version);
                check_version(&format!("product {}", product.id), expected, current)?;
                product.version = next_version(current);
                (product.id, Some(product))
            }
            ProductWrite::Delete { id, expected } => {
                let current = tables.products.get(&id).map(|p| p.version);
                check_version(&format!("product {id}"), expected, current)?;
                if current.is_none() {
                    return Err(StoreError::NotFound(format!("product {id}")));
                }
                (id, None)
            }
        };
        if staged.products.insert(id, row).is_some() {
            return Err(StoreError::Invariant(format!("product {id} written twice")));
        }
    }

    for movement in &changes.stock {
        let id = movement.product_id;
        if staged.products.contains_key(&id) {
            return Err(StoreError::Invariant(format!(
                "product {id} both written and moved"
            )));
        }
        let mut product = tables
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::Concurrency(format!("product {id} no longer exists")))?;
        check_version(
            &format!("product {id}"),
            ExpectedVersion::Exact(movement.expected_version),
            Some(product.version),
        )?;
        apply_movement(&mut product, movement)?;
        staged.products.insert(id, Some(product));
    }

    for write in changes.orders {
        let (id, row) = match write {
            OrderWrite::Put { mut order, expected } => {
                let current = tables.orders.get(&order.id).map(|o| o.version);
                check_version(&format!("order {}", order.id), expected, current)?;
                order.version = next_version(current);
                (order.id, Some(order))
            }
            OrderWrite::Delete { id, expected } => {
                let current = tables.orders.get(&id).map(|o| o.version);
                check_version(&format!("order {id}"), expected, current)?;
                if current.is_none() {
                    return Err(StoreError::NotFound(format!("order {id}")));
                }
                (id, None)
            }
        };
        if staged.orders.insert(id, row).is_some() {
            return Err(StoreError::Invariant(format!("order {id} written twice")));
        }
    }

    // Cross-row rules are checked against the post-commit view. A violation
    // here means another writer got in first, so it is a concurrency error.
    for order in staged.orders.values().flatten() {
        if let Some(missing) = missing_product(order, |id| staged.product_exists(tables, id)) {
            return Err(StoreError::Concurrency(format!(
                "order {} references missing product {missing}",
                order.id
            )));
        }
    }

    for (id, row) in &staged.products {
        match row {
            None => {
                if staged.orders_after(tables).any(|o| o.references_product(*id)) {
                    return Err(StoreError::Concurrency(format!(
                        "product {id} is referenced by an order"
                    )));
                }
            }
            Some(product) => {
                let taken = staged
                    .products_after(tables)
                    .any(|other| other.id != product.id && other.sku == product.sku);
                if taken {
                    return Err(StoreError::Concurrency(format!(
                        "sku '{}' is already in use",
                        product.sku
                    )));
                }
            }
        }
    }

    Ok(staged)
}

impl WorkshopStore for InMemoryWorkshopStore {
    fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.read()?.sorted_users())
    }

    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.read()?.sorted_products())
    }

    fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.read()?.orders.get(&id).cloned())
    }

    fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.read()?.sorted_orders())
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        let staged = stage(&tables, changes)?;

        for (id, row) in staged.users {
            match row {
                Some(user) => tables.users.insert(id, user),
                None => tables.users.remove(&id),
            };
        }
        for (id, row) in staged.products {
            match row {
                Some(product) => tables.products.insert(id, product),
                None => tables.products.remove(&id),
            };
        }
        for (id, row) in staged.orders {
            match row {
                Some(order) => tables.orders.insert(id, order),
                None => tables.orders.remove(&id),
            };
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<WorkshopSnapshot, StoreError> {
        // One guard for all three tables; no commit may land in between.
        let tables = self.read()?;
        Ok(WorkshopSnapshot {
            users: tables.sorted_users(),
            products: tables.sorted_products(),
            orders: tables.sorted_orders(),
        })
    }
}
