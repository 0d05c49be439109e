//! Canned keyword replies for messages that are not commands.
//!
//! Rules are checked in order against the lowercased body; the first rule
//! with a matching substring produces the only reply.

pub mod keywords;

pub use keywords::{KeywordRule, RULES, ReplyContext, auto_reply, match_rule};
