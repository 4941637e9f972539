pub mod codec;
pub mod grid;
pub mod keys;
pub mod registry;
pub mod relation;
pub mod tracker;

pub use codec::{decode, decode_bounded, encode, initial_row, DecodeError, RUN_THRESHOLD};
pub use grid::{Grid, GridIssue, Suggestion, SuggestionConflict, SuggestionReport};
pub use keys::{compare_keys, is_within, normalize_path, order_keys, parent_path, validate_key};
pub use registry::{KeyInfo, KeyRegistry};
pub use relation::Relation;
pub use tracker::Tracker;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum GridError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}
