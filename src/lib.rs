mod converter;
pub use converter::*;
pub mod structs;
