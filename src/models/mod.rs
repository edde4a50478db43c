pub mod error;

pub use unisaver_core::models::{media, settings};
