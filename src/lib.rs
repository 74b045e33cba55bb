//! Shrink a PDF towards a target size by re-encoding its raster images as
//! JPEG at decreasing quality until the saved document fits.

pub mod config;
pub mod error;
pub mod file_ops;
pub mod recompress;
pub mod reducer;
pub mod scan;
pub mod wasm;

pub use config::{ReduceConfig, TargetSize};
pub use error::{ConfigError, ReduceError, UnsupportedImage};
pub use recompress::{recompress, recompress_resource, ImageResource, Recompression};
pub use reducer::{reduce, Attempt, Reduction};
