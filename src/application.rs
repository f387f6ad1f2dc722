//! Application layer
//!
//! Use cases built on top of the domain types and the automation engine:
//! result mapping, badge classification, event publishing and the batch run itself.

pub mod badge_classifier;
pub mod batch_orchestrator;
pub mod event_bus;
pub mod result_mapper;

pub use badge_classifier::BadgeClassifier;
pub use batch_orchestrator::{BatchError, BatchOrchestrator};
pub use event_bus::EventBus;
pub use result_mapper::{ResultMapper, map_cells_to_result};
