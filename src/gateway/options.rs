//! Transform option parsing for signed request paths
//!
//! The options path segment is either `full` (store the size-capped
//! original, no resize) or `{height}x{width}` where each dimension must
//! come from the configured allow-list. Dimensions are translated into
//! the `h:`/`w:` options the reverse proxy hands to imgproxy.

/// Parse the options segment into imgproxy options.
///
/// Returns `None` for anything malformed or entirely disallowed. An
/// empty vector means "no resize" (the `full` variant).
pub fn parse_options(params: &str, allowed_sizes: &[String]) -> Option<Vec<String>> {
    if params == "full" {
        return Some(Vec::new());
    }

    let (height, width) = params.split_once('x')?;

    let mut opts = Vec::new();
    if !width.is_empty() && allowed_sizes.iter().any(|s| s == width) {
        opts.push(format!("w:{width}"));
    }
    if !height.is_empty() && allowed_sizes.iter().any(|s| s == height) {
        opts.push(format!("h:{height}"));
    }

    // a resize request where no dimension survived the allow-list is
    // a client error, not a full-size fetch
    if opts.is_empty() {
        return None;
    }
    Some(opts)
}
