//! Query subsystem: structured filters, hash joins, and the query builder.

pub mod builder;
pub mod filter;
pub mod join;
