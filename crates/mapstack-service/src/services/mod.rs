//! The three service drivers.

pub mod geocoding;
pub mod routing;
pub mod tiling;

pub use geocoding::{GeocodingService, GeocodingSettings};
pub use routing::{RoutingService, RoutingSettings};
pub use tiling::{TilingService, TilingSettings};
