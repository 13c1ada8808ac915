//! Order book reconstruction
//!
//! Merges an initial snapshot with a sequence of diffs into a consistent,
//! queryable book per instrument.

mod book;
mod manager;

pub use book::Book;
pub use manager::{BookManager, BookStream};
