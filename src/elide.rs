//! Bounded rendering of long diagnostic strings.

use std::borrow::Cow;

/// Strings longer than this many characters are shortened before logging.
pub const ELIDE_THRESHOLD: usize = 30_000;
/// Characters kept from each end of an elided string.
pub const ELIDE_KEEP: usize = 1_000;

/// Shorten `text` to head + elision marker + tail when it exceeds the threshold.
///
/// Counts characters rather than bytes so multi-byte text is never split.
pub fn elide(text: &str) -> Cow<'_, str> {
    let total = text.chars().count();
    if total <= ELIDE_THRESHOLD {
        return Cow::Borrowed(text);
    }
    let omitted = total - 2 * ELIDE_KEEP;
    let head: String = text.chars().take(ELIDE_KEEP).collect();
    let tail: String = text.chars().skip(total - ELIDE_KEEP).collect();
    Cow::Owned(format!("{head}[ ...{omitted} characters elided... ]{tail}"))
}
