//! Expense categories
//!
//! The category set is fixed at compile time. Lookups are case-insensitive
//! and anything unknown renders with the `other` style, so old rows with
//! unexpected category strings still display.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// A display entry in the category registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Category {
    /// Stored identifier (lowercase)
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// Emoji icon
    pub icon: &'static str,
    /// CSS colour
    pub color: &'static str,
}

/// Identifier of the fallback category.
pub const FALLBACK_CATEGORY: &str = "other";

/// Every known category, in display order.
pub const CATEGORIES: &[Category] = &[
    Category { id: "food", name: "Food", icon: "🍽️", color: "#60a5fa" },
    Category { id: "transport", name: "Transport", icon: "🚌", color: "#a78bfa" },
    Category { id: "entertainment", name: "Entertainment", icon: "🎮", color: "#f472b6" },
    Category { id: "utilities", name: "Utilities", icon: "💡", color: "#fbbf24" },
    Category { id: "housing", name: "Housing", icon: "🏠", color: "#818cf8" },
    Category { id: "gifts", name: "Gifts", icon: "🎁", color: "#fb7185" },
    Category { id: "other", name: "Other", icon: "📦", color: "#94a3b8" },
];

static INDEX: Lazy<HashMap<&'static str, &'static Category>> =
    Lazy::new(|| CATEGORIES.iter().map(|c| (c.id, c)).collect());

static FALLBACK: Lazy<&'static Category> = Lazy::new(|| {
    INDEX
        .get(FALLBACK_CATEGORY)
        .copied()
        .unwrap_or(&CATEGORIES[CATEGORIES.len() - 1])
});

/// Find a category by identifier, ignoring case and surrounding whitespace.
pub fn find_category(key: &str) -> Option<&'static Category> {
    let key = key.trim().to_lowercase();
    INDEX.get(key.as_str()).copied()
}

/// Look up a category for display, falling back to `other`.
pub fn category_style(key: &str) -> &'static Category {
    find_category(key).unwrap_or(*FALLBACK)
}
