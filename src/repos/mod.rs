//! Repository layer: per-entity append and read access.
//!
//! Repositories are the only code that speaks SQL for their entity group.
//! They expose `create`/`read`/`list` plus entity-specific appends; there is
//! no update and no delete. Complex attributes cross this boundary through
//! the symmetric codec in `core::serialize`, so nested metadata survives a
//! round trip intact.

pub mod audit;
pub mod corpus;
pub mod export;
pub mod job;
pub mod session;
