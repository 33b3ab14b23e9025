//! ROOT object deserialization.

mod stream;
mod ttree;

pub(crate) use ttree::read_ttree;
