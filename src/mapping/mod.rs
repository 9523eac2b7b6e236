//! Path-addressed schema mapping engine
//!
//! - [`path`]: get/set values in nested records by `name[0].given[0]` paths
//! - [`transforms`]: built-in value transforms and the transform signature
//! - [`mapper`]: [`SchemaMapper`] applying ordered field-mapping rules
//! - [`bidirectional`]: [`BidirectionalMapper`] with derived reverse rules

pub mod bidirectional;
pub mod mapper;
pub mod path;
pub mod transforms;

pub use bidirectional::BidirectionalMapper;
pub use mapper::{
    generate_reverse_mappings, LookupTables, RowErrors, SchemaMapper, TransformContext,
};
pub use transforms::TransformFn;
