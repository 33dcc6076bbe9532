//! Local file name derivation from URLs.

/// Characters that are replaced with `_` in derived file names.
const FORBIDDEN: &[char] = &['?', '&', '#', '(', ')', '=', '/', '\\', ':'];

/// Name used when a URL has no usable trailing path segment.
pub const INDEX_FALLBACK: &str = "Index.html";

/// Derives a filesystem-safe file name from a URL.
///
/// The name is the last path segment of the URL. For directory URLs (ending
/// in `/`) the segment before the trailing slash is used instead, and a bare
/// site root such as `http://host/` falls back to [`INDEX_FALLBACK`]. The
/// characters `? & # ( ) = / \ :` are replaced with `_`.
///
/// ```
/// use logged_dl::derive_file_name;
///
/// assert_eq!(derive_file_name("http://x/a/b.txt"), "b.txt");
/// assert_eq!(derive_file_name("http://x/a/"), "a");
/// assert_eq!(derive_file_name("http://x/"), "Index.html");
/// assert_eq!(derive_file_name("http://x/a?b=1"), "a_b_1");
/// ```
#[must_use]
pub fn derive_file_name(url: &str) -> String {
    let candidate = match url.rfind('/') {
        None => url,
        Some(last) if last + 1 == url.len() => {
            let head = &url[..last];
            match head.rfind('/') {
                // The slash of "://" means there is no path segment, only the host.
                Some(prev) if !head[..=prev].ends_with("://") => &url[prev + 1..last],
                _ => "",
            }
        }
        Some(last) => &url[last + 1..],
    };

    if candidate.is_empty() {
        return INDEX_FALLBACK.to_string();
    }
    candidate.replace(FORBIDDEN, "_")
}
