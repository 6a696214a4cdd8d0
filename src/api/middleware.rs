/// Request helpers for tokens and multipart uploads
use crate::{
    context::AppContext,
    error::{HubError, HubResult},
};
use axum::{extract::Multipart, http::HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Access token from the `accessToken` cookie, falling back to the bearer header
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| extract_bearer_token(headers))
}

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/")
        .build()
}

/// Set both token cookies
pub fn with_token_cookies(jar: CookieJar, access_token: &str, refresh_token: &str) -> CookieJar {
    jar.add(session_cookie(ACCESS_TOKEN_COOKIE, access_token.to_string()))
        .add(session_cookie(REFRESH_TOKEN_COOKIE, refresh_token.to_string()))
}

/// Expire both token cookies
pub fn without_token_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_TOKEN_COOKIE).path("/"))
}

/// Multipart form with file parts spooled to the temp directory
#[derive(Debug, Default)]
pub struct SpooledForm {
    fields: HashMap<String, String>,
    files: HashMap<String, PathBuf>,
}

impl SpooledForm {
    /// Read the whole form, writing file parts to `media.temp_directory`
    pub async fn read(ctx: &AppContext, mut multipart: Multipart) -> HubResult<Self> {
        let mut form = SpooledForm::default();
        let limit = ctx.config.media.max_upload_bytes;

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    form.discard().await;
                    return Err(HubError::InvalidInput(format!("Malformed multipart body: {}", e)));
                }
            };

            let name = field.name().unwrap_or_default().to_string();

            if field.file_name().is_none() {
                match field.text().await {
                    Ok(text) => {
                        form.fields.insert(name, text);
                    }
                    Err(e) => {
                        form.discard().await;
                        return Err(HubError::InvalidInput(format!("Unreadable form field: {}", e)));
                    }
                }
                continue;
            }

            let extension = field
                .file_name()
                .and_then(|f| std::path::Path::new(f).extension())
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e))
                .unwrap_or_default();
            let path = ctx
                .config
                .media
                .temp_directory
                .join(format!("{}{}", Uuid::new_v4(), extension));

            // Replacing an earlier part of the same name: drop the old spool file
            if let Some(previous) = form.files.insert(name, path.clone()) {
                let _ = tokio::fs::remove_file(previous).await;
            }

            if let Err(e) = spool_field(field, &path, limit).await {
                form.discard().await;
                return Err(e);
            }
        }

        Ok(form)
    }

    /// Text field value
    pub fn field(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    /// Whether a file was sent under `name`
    pub fn has_file(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Take ownership of a spooled file
    pub fn take_file(&mut self, name: &str) -> Option<PathBuf> {
        self.files.remove(name)
    }

    /// Delete any spooled files that were not taken
    pub async fn discard(&mut self) {
        for (_, path) in self.files.drain() {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}

async fn spool_field(
    mut field: axum::extract::multipart::Field<'_>,
    path: &std::path::Path,
    limit: usize,
) -> HubResult<()> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0usize;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => return Err(HubError::InvalidInput(format!("Upload interrupted: {}", e))),
        };

        written += chunk.len();
        if written > limit {
            return Err(HubError::InvalidInput(format!(
                "File exceeds the {} byte upload limit",
                limit
            )));
        }

        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123token"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123token".to_string()));

        headers.insert("authorization", HeaderValue::from_static("abc123token"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_cookie_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_access_token(&headers), Some("from-header".to_string()));

        headers.insert("cookie", HeaderValue::from_static("accessToken=from-cookie; other=1"));
        assert_eq!(extract_access_token(&headers), Some("from-cookie".to_string()));
    }

    #[test]
    fn test_token_cookies_are_http_only() {
        let jar = with_token_cookies(CookieJar::new(), "a", "r");
        let access = jar.get(ACCESS_TOKEN_COOKIE).unwrap();
        assert_eq!(access.value(), "a");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));
        assert_eq!(jar.get(REFRESH_TOKEN_COOKIE).unwrap().value(), "r");
    }
}
