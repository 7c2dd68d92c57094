/*!
 * VFS URLs
 * `<protocol>://<path>` parsing, normalization, and composition
 */

use super::types::{VfsError, VfsResult};

/// Separator between protocol and path
pub const PROTOCOL_SEPARATOR: &str = "://";

/// Standard protocols
pub mod protocols {
    /// Host filesystem
    pub const FILE: &str = "file";

    /// In-memory scratch filesystem
    pub const TEMP: &str = "temp";
}

/// Split a URL into protocol and normalized path
///
/// A URL without `://` is a plain `file` path.
pub fn parse(url: &str) -> VfsResult<(&str, String)> {
    match url.find(PROTOCOL_SEPARATOR) {
        Some(0) => Err(VfsError::InvalidArgument(format!("missing protocol: {}", url))),
        Some(idx) => {
            let protocol = &url[..idx];
            if !protocol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '+' || c == '.')
            {
                return Err(VfsError::InvalidArgument(format!(
                    "invalid protocol in url: {}",
                    url
                )));
            }
            let path = &url[idx + PROTOCOL_SEPARATOR.len()..];
            Ok((protocol, normalize_path(path)))
        }
        None => Ok((protocols::FILE, normalize_path(url))),
    }
}

/// Normalized form of a URL
pub fn normalize(url: &str) -> VfsResult<String> {
    let (protocol, path) = parse(url)?;
    Ok(compose(protocol, &path))
}

/// Build a URL from a protocol and an absolute path
pub fn compose(protocol: &str, path: &str) -> String {
    let mut url = String::with_capacity(protocol.len() + PROTOCOL_SEPARATOR.len() + path.len());
    url.push_str(protocol);
    url.push_str(PROTOCOL_SEPARATOR);
    url.push_str(path);
    url
}

/// Normalize a path: absolute, `/`-separated, no `.`/`..`/empty segments,
/// no trailing separator except for the root
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = if unified.starts_with('/') {
        unified
    } else {
        format!("/{}", unified)
    };
    let cleaned = path_clean::clean(&absolute);
    let cleaned = cleaned.to_string_lossy();
    // path_clean keeps a leading `/..`; the root has no parent
    let mut out = String::with_capacity(cleaned.len());
    for segment in cleaned.split('/').filter(|s| !s.is_empty() && *s != "..") {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Path segments of a normalized path
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Last path segment (empty for the root)
pub fn file_name(url: &str) -> &str {
    let path = match url.find(PROTOCOL_SEPARATOR) {
        Some(idx) => &url[idx + PROTOCOL_SEPARATOR.len()..],
        None => url,
    };
    path.rsplit('/').next().unwrap_or("")
}

/// Parent URL, `None` for a root URL
pub fn parent(url: &str) -> Option<String> {
    let (protocol, path) = parse(url).ok()?;
    if path == "/" {
        return None;
    }
    let cut = path.rfind('/')?;
    let parent = if cut == 0 { "/" } else { &path[..cut] };
    Some(compose(protocol, parent))
}

/// Child URL of `url`
pub fn join(url: &str, name: &str) -> String {
    if url.ends_with('/') {
        format!("{}{}", url, name)
    } else {
        format!("{}/{}", url, name)
    }
}

/// Human-readable form: `file` URLs show their path only
pub fn presentable(url: &str) -> String {
    match parse(url) {
        Ok((protocols::FILE, path)) => path,
        _ => url.to_string(),
    }
}
