//! Shared model for health-combine: errors, configuration descriptors, the
//! tagged table model, stage events, key normalization and CLI settings.

pub mod config;
pub mod error;
pub mod events;
pub mod settings;
pub mod table;
pub mod time_utils;

pub use config::{CombinationConfig, CombinationDescriptor, OutputStructure, SourceDescriptor};
pub use error::{CombineError, Result};
pub use events::{CombinationEvent, CombinationStage, EventSink};
pub use table::{Cell, Column, KeyedTable, OutputTable, Table};
pub use time_utils::KeyGranularity;
