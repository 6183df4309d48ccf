//! Raw experimental data: declarative schemas, the built-in catalog and the filter.

pub mod catalog;
pub mod filter;
pub mod schema;
pub mod symmetrize;

pub use catalog::*;
pub use filter::*;
pub use schema::*;
pub use symmetrize::*;
