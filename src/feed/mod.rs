//! Product records and the rules applied to them
//!
//! - `source`: the parser contract vendor adapters implement
//! - `item`: the normalized record and its construction
//! - `merge`: price-list backfill
//! - `validate`: the QA pass run before persisting in development
//! - `text`: string cleanup shared by all of the above

pub mod item;
pub mod merge;
pub mod selector_parser;
pub mod source;
pub mod text;
pub mod validate;

pub use item::{ProductRecord, DEFAULT_PRODUCT_NAME};
pub use merge::{load_price_list, merge, merge_record, Blank};
pub use selector_parser::SelectorParser;
pub use source::{build_record, HtmlDocument, ParseContext, ParseError, ParserAdapter, ProductSource};
pub use validate::{error_log_path, FeedValidator, ValidationReport};
