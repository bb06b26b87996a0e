//! Utility functions for URL joining, filenames and save paths

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use url::Url;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Append a path to a base URL by concatenation
///
/// Unlike [`Url::join`], a base with a path prefix keeps it:
/// `http://host/api` + `/download/x.zip` is `http://host/api/download/x.zip`.
/// A `reference` that already is an absolute URL is returned unchanged.
///
/// ```
/// use playlist_dl::utils::join_base;
/// use url::Url;
///
/// let base = Url::parse("http://localhost:8000").unwrap();
/// let url = join_base(&base, "/download/Mix.zip").unwrap();
/// assert_eq!(url.as_str(), "http://localhost:8000/download/Mix.zip");
/// ```
pub fn join_base(base: &Url, reference: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(reference)
        && matches!(absolute.scheme(), "http" | "https")
    {
        return Ok(absolute);
    }
    let base = base.as_str().trim_end_matches('/');
    let reference = reference.trim_start_matches('/');
    Ok(Url::parse(&format!("{base}/{reference}"))?)
}

/// Get a path that does not exist yet, adding ` (1)`, ` (2)`, ... before the extension
///
/// ```
/// use playlist_dl::utils::get_unique_path;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/does-not-exist-playlist.zip");
/// assert_eq!(get_unique_path(path).unwrap(), path);
/// ```
pub fn get_unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Other(format!("cannot extract file stem of {}", path.display())))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(Error::Other(format!(
        "could not find unique filename for {} after {} attempts",
        path.display(),
        MAX_RENAME_ATTEMPTS
    )))
}

/// Extract the filename to save a response under
///
/// Tries the Content-Disposition header first (`filename=` and RFC 5987
/// `filename*=`), then the last URL path segment, then `fallback`. The result
/// is reduced to a bare file name so it can never escape the save directory.
pub fn extract_filename_from_response(
    response: &reqwest::Response,
    url: &Url,
    fallback: &str,
) -> String {
    let from_header = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition);

    let from_url = || {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| segment.to_string())
            })
    };

    from_header
        .or_else(from_url)
        .and_then(|name| sanitize_file_name(&name))
        .unwrap_or_else(|| fallback.to_string())
}

/// Parse a Content-Disposition value
///
/// Format: `attachment; filename="file.zip"` or `filename*=UTF-8''file.zip`
fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';') {
        let part = part.trim();
        if let Some(encoded) = part.strip_prefix("filename*=") {
            // charset'lang'encoded-filename
            let encoded = encoded.rsplit('\'').next()?;
            if let Ok(decoded) = urlencoding::decode(encoded) {
                return Some(decoded.into_owned());
            }
        } else if let Some(name) = part.strip_prefix("filename=") {
            plain = Some(name.trim_matches('"').to_string());
        }
    }
    plain
}

/// Reduce a name to its final path component, rejecting empty and dot names
fn sanitize_file_name(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn join_base_keeps_prefix_and_handles_slashes() {
        let base = Url::parse("http://host:8000/api/").unwrap();
        assert_eq!(
            join_base(&base, "/download/x.zip").unwrap().as_str(),
            "http://host:8000/api/download/x.zip"
        );
        assert_eq!(
            join_base(&base, "download/x.zip").unwrap().as_str(),
            "http://host:8000/api/download/x.zip"
        );
    }

    #[test]
    fn join_base_passes_absolute_urls_through() {
        let base = Url::parse("http://localhost:8000").unwrap();
        assert_eq!(
            join_base(&base, "https://cdn.example.com/x.zip").unwrap().as_str(),
            "https://cdn.example.com/x.zip"
        );
    }

    #[test]
    fn unique_path_appends_counter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Mix.zip");
        assert_eq!(get_unique_path(&path).unwrap(), path);

        std::fs::write(&path, b"1").unwrap();
        let second = get_unique_path(&path).unwrap();
        assert_eq!(second, dir.path().join("Mix (1).zip"));

        std::fs::write(&second, b"2").unwrap();
        assert_eq!(get_unique_path(&path).unwrap(), dir.path().join("Mix (2).zip"));
    }

    #[test]
    fn disposition_parsing() {
        assert_eq!(
            filename_from_disposition("attachment; filename=\"Mix.zip\"").as_deref(),
            Some("Mix.zip")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=a.zip; filename*=UTF-8''M%C3%BCsik.zip")
                .as_deref(),
            Some("Müsik.zip")
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("dir\\x.zip").as_deref(), Some("x.zip"));
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("  "), None);
    }
}
