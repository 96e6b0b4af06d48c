#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_wraps,
    dead_code
)]

use clap::Subcommand;
use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod config;
pub mod events;
pub mod fulfillment;
pub mod gateway;
pub mod health;
pub mod observability;
pub mod rag;
pub mod sessions;

pub use config::Config;

/// Session memory subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionCommands {
    /// List user ids that have recorded interactions
    List,
    /// Print the recorded interactions for one user as JSON
    #[command(long_about = "\
Print the recorded interactions for one user.

Entries are printed oldest first as a JSON array, in the same shape \
they are stored in the session file.

Examples:
  easly sessions show u1
  easly sessions show projects-shop-session-abc")]
    Show {
        /// User id as recorded by the fulfillment webhook
        user_id: String,
    },
}
