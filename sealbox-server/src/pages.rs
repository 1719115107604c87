//! HTML pages for the browser flow.
//!
//! Pages are embedded in the binary; a configured templates directory can
//! override any of them by file name. Rendering is plain placeholder
//! substitution, which is all these four small pages need.

use std::path::Path;

use axum::response::Html;

use crate::error::{Result, ServerError};

const INDEX_TPL: &str = include_str!("templates/index.html");
const RESULT_TPL: &str = include_str!("templates/result.html");
const DOWNLOAD_TPL: &str = include_str!("templates/download.html");
const ERROR_TPL: &str = include_str!("templates/error.html");

#[derive(Clone)]
pub struct Pages {
    index: String,
    result: String,
    download: String,
    error: String,
}

impl Pages {
    /// Embedded pages, with per-file overrides from `dir` when present.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let read = |name: &str, fallback: &str| -> Result<String> {
            match dir {
                Some(dir) => {
                    let path = dir.join(name);
                    if path.is_file() {
                        std::fs::read_to_string(&path).map_err(|e| {
                            ServerError::Internal(format!("template {}: {e}", path.display()))
                        })
                    } else {
                        Ok(fallback.to_string())
                    }
                }
                None => Ok(fallback.to_string()),
            }
        };
        Ok(Self {
            index: read("index.html", INDEX_TPL)?,
            result: read("result.html", RESULT_TPL)?,
            download: read("download.html", DOWNLOAD_TPL)?,
            error: read("error.html", ERROR_TPL)?,
        })
    }

    pub fn index(&self, max_size_megabytes: u64, error: Option<&str>) -> Html<String> {
        let error_block = match error {
            Some(msg) => format!(r#"<p class="error">{}</p>"#, escape(msg)),
            None => String::new(),
        };
        Html(
            self.index
                .replace("{{max_size}}", &max_size_megabytes.to_string())
                .replace("{{error}}", &error_block),
        )
    }

    pub fn result(&self, url: &str, password: &str, auto_password: bool) -> Html<String> {
        let password_note = if auto_password {
            format!("Generated password: <code>{}</code>", escape(password))
        } else {
            "Your own password applies.".to_string()
        };
        Html(
            self.result
                .replace("{{url}}", &escape(url))
                .replace("{{password_note}}", &password_note),
        )
    }

    pub fn download(&self, key: &str, has_text: bool, has_file: bool) -> Html<String> {
        let contents = match (has_text, has_file) {
            (true, true) => "a note and a file",
            (true, false) => "a note",
            (false, true) => "a file",
            (false, false) => "nothing",
        };
        Html(
            self.download
                .replace("{{key}}", &escape(key))
                .replace("{{contents}}", contents),
        )
    }

    pub fn error(&self, code: u16, message: &str) -> Html<String> {
        Html(
            self.error
                .replace("{{code}}", &code.to_string())
                .replace("{{message}}", &escape(message)),
        )
    }
}

/// Minimal HTML escaping for values substituted into pages.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_pages_render() {
        let pages = Pages::load(None).unwrap();

        let index = pages.index(50, None).0;
        assert!(index.contains("50"));
        assert!(!index.contains("{{"));

        let with_error = pages.index(50, Some("bad <ttl>")).0;
        assert!(with_error.contains("bad &lt;ttl&gt;"));

        let result = pages.result("http://h/abc", "Secret9", true).0;
        assert!(result.contains("http://h/abc"));
        assert!(result.contains("Secret9"));

        let masked = pages.result("http://h/abc", "********", false).0;
        assert!(!masked.contains("********"));

        let download = pages.download("some-key", true, false).0;
        assert!(download.contains("a note"));

        let error = pages.error(404, "not found").0;
        assert!(error.contains("404"));
    }

    #[test]
    fn test_override_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("error.html"), "custom {{code}}").unwrap();

        let pages = Pages::load(Some(dir.path())).unwrap();
        assert_eq!(pages.error(500, "x").0, "custom 500");
        // files not present in the directory fall back to the embedded page
        assert!(pages.index(1, None).0.contains("form"));
    }
}
