//! String algebra over FHIRPath-like path expressions.
//!
//! These helpers never evaluate an expression. They only look at its shape:
//! balanced parentheses, `.where(...)` clauses, casts and dotted segments.

mod cast;
mod path;
mod scan;

pub use cast::{
    is_polymorphic, polymorphic_base_id, polymorphic_choice_id, replace_polymorphic_with_cast,
    strip_cast, strip_trailing_cast, to_cql_cast, to_operator_cast,
};
pub use path::{
    attribute_key_code, common_path_prefix_len, insert_first_after_extension_where,
    resource_type_of, shorten_path, split_alternatives, strip_enclosing_parens,
    strip_resource_type, strip_slice_names, sub_path_equals,
};
pub use scan::{
    extract_where_clause, find_balanced_parentheses, is_balanced, last_top_level_dot,
    matching_close, matching_open, split_top_level, WhereClause,
};
