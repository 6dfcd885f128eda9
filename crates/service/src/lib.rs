//! Process wiring for the depot: configuration, the shared context, and
//! order ingestion. Transport layers (HTTP, chatbot, GUI) sit on top of
//! [`DepotContext`] and stay out of this workspace.

pub mod config;
pub mod context;
pub mod orders;

pub use config::{BackendConfig, CatalogueItem, DepotConfig, RetryConfig};
pub use context::{DepotContext, DeviceFrameOutcome};
pub use orders::{ORDER_SOURCE, OrderFailure, OrderLine, OrderReport, apply_order};

pub use depot_observability::init as init_tracing;
