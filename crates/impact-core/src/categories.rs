//! Category display names
//!
//! Static two-way table between the category keys used on the wire and the
//! labels shown on charts. Keys missing from the table display as themselves.

/// (key, display name)
pub const CATEGORY_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("stocks", "Stocks"),
    ("bonds", "Bonds"),
    ("commodities", "Commodities"),
    ("currencies", "Currencies"),
    ("crypto", "Crypto"),
    ("real_estate", "Real Estate"),
    ("etfs", "ETFs"),
    ("indices", "Indices"),
    ("futures", "Futures"),
    ("options", "Options"),
    ("private_equity", "Private Equity"),
];

/// Display label for a category key
pub fn display_name(key: &str) -> &str {
    CATEGORY_DISPLAY_NAMES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, name)| *name)
        .unwrap_or(key)
}

/// Category key for a chart label.
///
/// Accepts either the key itself or its display name (case-insensitive);
/// anything else is assumed to already be a key.
pub fn key_for_label(label: &str) -> &str {
    let trimmed = label.trim();
    CATEGORY_DISPLAY_NAMES
        .iter()
        .find(|(key, name)| {
            key.eq_ignore_ascii_case(trimmed) || name.eq_ignore_ascii_case(trimmed)
        })
        .map(|(key, _)| *key)
        .unwrap_or(trimmed)
}
