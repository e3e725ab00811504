//! OData Query Module
//!
//! Typed query paths, a fluent builder, page parsing and the pagination
//! state machine used by the client to walk collection responses.

pub mod builder;
pub mod pagination;
pub mod params;
pub mod result;

pub use builder::{QueryBuilder, aggregate_expression, entity_key_path};
pub use pagination::{PageState, Paginator, StopReason, continuation_path};
pub use params::ODataPath;
pub use result::{ODataPage, Record, record_from_slice};
