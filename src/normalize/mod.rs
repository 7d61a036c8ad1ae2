//! Removal of invisible characters that destabilize line comparison.

use std::borrow::Cow;

const ZERO_WIDTH_SPACE: char = '\u{200B}';

/// True for code points in the Unicode private-use category (Co) and U+200B.
pub fn is_artifact(c: char) -> bool {
    c == ZERO_WIDTH_SPACE
        || matches!(
            c,
            '\u{E000}'..='\u{F8FF}' | '\u{F0000}'..='\u{FFFFD}' | '\u{100000}'..='\u{10FFFD}'
        )
}

/// Strips private-use code points and zero-width spaces. Nothing else is touched.
pub fn normalize(text: &str) -> Cow<'_, str> {
    if !text.chars().any(is_artifact) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.chars().filter(|c| !is_artifact(*c)).collect())
}
