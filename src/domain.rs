//! Domain module - Core value types for NSIS status lookups
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod badges;
pub mod code;
pub mod events;
pub mod results;

pub use badges::{Badge, BadgeStats};
pub use code::{Code, CodeError};
pub use events::{BatchEvent, BatchSummary, LogLevel, RunState};
pub use results::{FetchResult, FieldKey, LayoutVersion, ProcessingResult};
