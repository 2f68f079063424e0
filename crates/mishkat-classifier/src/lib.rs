// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message classification for the Mishkat chat core.
//!
//! This crate provides:
//! - [`KeywordClassifier`]: ordered keyword rules deciding whether a message
//!   needs a human operator, with the repeated-confusion fallback
//! - [`ReplyCategorizer`]: the coarser taxonomy used to pick a reply template
//!
//! Both are zero-latency heuristics. The escalation side sits behind the
//! [`Classifier`](mishkat_core::Classifier) trait so it can be replaced.

pub mod category;
pub mod escalation;

pub use category::ReplyCategorizer;
pub use escalation::{match_rules, KeywordClassifier};
