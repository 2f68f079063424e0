// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply template categorization.
//!
//! A coarser taxonomy than the escalation rules, used only to pick the shape
//! of the automated reply.

use mishkat_core::ReplyCategory;

/// Asks for a person or a ruling the assistant must not give.
const ESCALATION_TERMS: &[&str] = &[
    "admin",
    "human",
    "real person",
    "fatwa",
    "scholar",
    "imam",
    "talk to someone",
];

/// Account, billing, and app failures.
const TECHNICAL_TERMS: &[&str] = &[
    "payment",
    "subscription",
    "billing",
    "refund",
    "error",
    "bug",
    "crash",
    "login",
    "log in",
    "sign in",
    "password",
    "not working",
    "broken",
    "failed",
];

const HADITH_TERMS: &[&str] = &[
    "hadith",
    "narrat",
    "sunnah",
    "bukhari",
    "sahih",
    "prophet",
    "isnad",
];

const APP_TERMS: &[&str] = &[
    "how do i",
    "how to",
    "where can i",
    "bookmark",
    "save",
    "favorite",
    "search",
    "share",
    "app",
    "feature",
    "settings",
];

const GENERAL_TERMS: &[&str] = &[
    "prayer", "pray", "salah", "quran", "islam", "ramadan", "fasting", "zakat", "hajj", "dua",
    "allah",
];

/// Ordered category table; first match wins, `Clarification` otherwise.
const CATEGORIES: &[(ReplyCategory, &[&str])] = &[
    (ReplyCategory::Escalation, ESCALATION_TERMS),
    (ReplyCategory::TechnicalHelp, TECHNICAL_TERMS),
    (ReplyCategory::HadithExplanation, HADITH_TERMS),
    (ReplyCategory::AppGuidance, APP_TERMS),
    (ReplyCategory::GeneralIslamic, GENERAL_TERMS),
];

/// Keyword categorizer for reply template selection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplyCategorizer;

impl ReplyCategorizer {
    pub fn new() -> Self {
        Self
    }

    pub fn categorize(&self, text: &str) -> ReplyCategory {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return ReplyCategory::Clarification;
        }
        CATEGORIES
            .iter()
            .find(|(_, terms)| terms.iter().any(|t| lower.contains(t)))
            .map(|(category, _)| *category)
            .unwrap_or(ReplyCategory::Clarification)
    }
}
