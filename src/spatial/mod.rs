pub mod index;
pub mod polyline;

pub use index::{AreaStats, SpatialIndex};
