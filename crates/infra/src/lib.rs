//! Infrastructure layer: storage, configuration, the workshop service.

pub mod config;
pub mod reporting;
pub mod service;
pub mod store;


pub use config::{ConfigError, WorkshopConfig};
pub use reporting::DashboardMetrics;
pub use service::Workshop;
pub use store::{
    ChangeSet, InMemoryWorkshopStore, OrderWrite, ProductWrite, StoreError, UserWrite,
    WorkshopSnapshot, WorkshopStore,
};
