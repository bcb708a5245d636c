//! Place tables for the mercator geocoder.
//!
//! This crate owns the data side: row types as written by an import, planar geometry
//! helpers, text normalization shared with the query analyzer, and [`PlaceDatabase`], an
//! immutable in-memory store with spatial (R-tree) and token indexes.
//!
//! ```rust
//! use mercator_data::{Point, TestDataConfig, create_test_database};
//!
//! let db = create_test_database(&TestDataConfig::minimal())?;
//! let cells: Vec<_> = db.country_grid_at(Point::new(-0.1276, 51.5034)).collect();
//! assert_eq!(cells[0].country_code, "gb");
//! # Ok::<(), mercator_data::DataError>(())
//! ```

mod database;
mod error;
mod geometry;
mod loader;
mod normalize;
mod rows;
pub mod test_data;

pub use database::{DatabaseBuilder, PlaceDatabase};
pub use error::{DataError, Result};
pub use geometry::{Bbox, Geometry, Point};
pub use loader::{load_from_path, load_from_str};
pub use normalize::{normalize_postcode, normalize_text, split_words};
pub use rows::{
    AddressLineRow, Category, CountryGridRow, CountryNameRow, InterpolationRow, OsmType, PlaceId,
    PlaceRow, PostcodeRow, SearchNameRow, Tags, TokenId, WordInfo, WordKind, WordRow,
};
pub use test_data::{TestDataConfig, create_test_database};
