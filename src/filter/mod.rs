//! Filter Engine
//!
//! Filters are immutable, hashable, structurally comparable predicates over
//! named columns. They are pushed down the measure DAG (a Filtrator ANDs its
//! own filter in, an Unfiltrator strips columns out) and finally handed to the
//! table connector.
//!
//! - **ast**: `Filter`, `Matcher` and the normalizing constructors
//! - **parser**: textual filter syntax
//!
//! # Filter Syntax
//!
//! ```text
//! country = 'FR' and (size >= 3 or not color in ('red', 'blue'))
//! name like 'A%' and note is null
//! ```

mod ast;
mod error;
mod parser;

pub use ast::{CompareOp, Filter, LikePattern, Matcher};
pub use error::{FilterError, FilterResult};
pub use parser::parse_filter;
