//! # Query Helpers
//!
//! Store-independent pieces of listing queries. The SQL itself lives with the
//! Postgres store; this module only owns page arithmetic and the pagination
//! block every listing returns.

pub mod pagination;

pub use pagination::{Pagination, PaginationInfo};
