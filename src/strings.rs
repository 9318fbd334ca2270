//! Small formatting helpers shared by the header encoders.

use std::fmt::{self, Write};

/// Joins the display form of every item with `separator`.
///
/// Works for anything printable, so the same helper covers condition names,
/// header names and numeric status codes:
///
/// ```
/// use layered_http_client::strings::join;
///
/// assert_eq!(join([503u16, 429], ","), "503,429");
/// assert_eq!(join(["a", "b", "c"], ","), "a,b,c");
/// ```
pub fn join<I>(items: I, separator: &str) -> String
where
    I: IntoIterator,
    I::Item: fmt::Display,
{
    let mut joined = String::new();
    for (index, item) in items.into_iter().enumerate() {
        if index > 0 {
            joined.push_str(separator);
        }
        // Writing into a String cannot fail.
        let _ = write!(joined, "{item}");
    }
    joined
}
