//! Structured record decoder (§4.2): turns the on-disk `.yaml` metadata
//! documents into the flat [`tokenizer::Entry`] stream and then into typed
//! records (see [`crate::records`]).

pub mod decode;
pub mod tokenizer;

pub use decode::{
    coerce_bool, coerce_f32, coerce_f64, coerce_f64_vec, coerce_i32, coerce_i32_vec, coerce_i64,
    coerce_i64_vec, coerce_string, expect_block, find_next_class, read_block, sequence_items,
    unescape, Block,
};
pub use tokenizer::{tokenize, Entry, Value};
