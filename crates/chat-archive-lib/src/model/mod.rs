//! Typed views over the records returned by the remote collection.

pub mod date_range;
pub mod record;
