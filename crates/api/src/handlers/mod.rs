pub mod artifacts;
pub mod conversions;
