//! Merge Instagram export bundles into a Who's On First style repository of
//! GeoJSON feature records, plus the backfill and audit tools around it.

pub mod backfill;
pub mod batch;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod identity;
pub mod logging;
pub mod lookup;
pub mod media;
pub mod publish;
pub mod secret;
pub mod store;

pub use error::{PublishError, Result};
