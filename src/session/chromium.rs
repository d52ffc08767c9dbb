// Copyright 2026 Handelsregister CLI Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-backed session driver using chromiumoxide.
//!
//! Form interaction happens through small JS snippets evaluated in the
//! page context; partial-update posts go through an in-page `fetch` so
//! cookies and hidden view-state fields stay inside the browser session.
//! All user-derived values are sanitized before injection into JS string
//! literals.

use super::SessionDriver;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Desktop user agent the portal is served to.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Poll interval for bounded selector waits.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. HANDELSREGISTER_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("HANDELSREGISTER_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.handelsregister/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".handelsregister/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".handelsregister/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".handelsregister/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".handelsregister/chromium/chrome-linux64/chrome"),
                home.join(".handelsregister/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-backed implementation of [`SessionDriver`].
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
}

impl ChromiumDriver {
    /// Launch a headless Chromium instance with a fresh page.
    pub async fn launch() -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Install Chrome or set HANDELSREGISTER_CHROMIUM_PATH.")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--lang=de-DE")
            .arg(format!("--user-agent={USER_AGENT}"))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drain CDP events for the lifetime of the browser.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;

        Ok(Self { browser, page })
    }

    async fn eval_bool(&self, script: String) -> Result<bool> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS evaluation failed")?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }
}

#[async_trait]
impl SessionDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()> {
        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn wait_for_selector(&mut self, css: &str, timeout_ms: u64) -> Result<bool> {
        let script = format!(
            "document.querySelector('{}') !== null",
            sanitize_js_string(css)
        );
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.eval_bool(script.clone()).await.unwrap_or(false) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                tracing::debug!(css, "selector wait timed out");
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn fill_field(&mut self, name: &str, value: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                const el = document.getElementsByName('{}')[0];
                if (!el) return false;
                el.value = '{}';
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sanitize_js_string(name),
            sanitize_js_string(value)
        );
        self.eval_bool(script).await
    }

    async fn select_option(&mut self, name: &str, value: &str) -> Result<bool> {
        // Select widgets keep their value in a named input/select element;
        // setting the value and firing change covers both plain selects
        // and the portal's decorated ones.
        self.fill_field(name, value).await
    }

    async fn submit_form(&mut self, form: &str, hidden: &[(String, String)]) -> Result<()> {
        let mut inject = String::new();
        for (name, value) in hidden {
            inject.push_str(&format!(
                r#"
                {{
                    const input = document.createElement('input');
                    input.type = 'hidden';
                    input.name = '{}';
                    input.value = '{}';
                    form.appendChild(input);
                }}"#,
                sanitize_js_string(name),
                sanitize_js_string(value)
            ));
        }

        let script = format!(
            r#"(() => {{
                const form = document.forms['{}'];
                if (!form) return false;
                {inject}
                form.submit();
                return true;
            }})()"#,
            sanitize_js_string(form)
        );

        if !self.eval_bool(script).await? {
            bail!("form '{form}' not found on current page");
        }
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn click(&mut self, element_id: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                const el = document.getElementById('{}');
                if (!el) return false;
                el.click();
                return true;
            }})()"#,
            sanitize_js_string(element_id)
        );
        self.eval_bool(script).await
    }

    async fn page_html(&mut self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to get HTML")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert HTML result: {e:?}"))
    }

    async fn current_url(&mut self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn post_partial(&mut self, form: &str, fields: &[(String, String)]) -> Result<String> {
        let mut overrides = String::new();
        for (name, value) in fields {
            overrides.push_str(&format!(
                "params.set('{}', '{}');\n",
                sanitize_js_string(name),
                sanitize_js_string(value)
            ));
        }

        let script = format!(
            r#"(async () => {{
                const form = document.forms['{}'];
                if (!form) return null;
                const params = new URLSearchParams(new FormData(form));
                {overrides}
                const resp = await fetch(form.action, {{
                    method: 'POST',
                    headers: {{
                        'Content-Type': 'application/x-www-form-urlencoded; charset=UTF-8',
                        'Faces-Request': 'partial/ajax',
                        'X-Requested-With': 'XMLHttpRequest',
                    }},
                    body: params.toString(),
                }});
                return await resp.text();
            }})()"#,
            sanitize_js_string(form)
        );

        let result = self
            .page
            .evaluate(script)
            .await
            .context("partial-update POST failed")?;
        let body: Option<String> = result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to read partial response body: {e:?}"))?;
        body.ok_or_else(|| anyhow::anyhow!("form '{form}' not found on current page"))
    }

    async fn fetch_binary(&mut self, url: &str) -> Result<Vec<u8>> {
        let script = format!(
            r#"(async () => {{
                const resp = await fetch('{}');
                if (!resp.ok) return null;
                const bytes = new Uint8Array(await resp.arrayBuffer());
                let binary = '';
                const chunk = 0x8000;
                for (let i = 0; i < bytes.length; i += chunk) {{
                    binary += String.fromCharCode.apply(null, bytes.subarray(i, i + chunk));
                }}
                return btoa(binary);
            }})()"#,
            sanitize_js_string(url)
        );

        let result = self
            .page
            .evaluate(script)
            .await
            .context("in-session download failed")?;
        let encoded: Option<String> = result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to read download body: {e:?}"))?;
        let encoded = encoded.ok_or_else(|| anyhow::anyhow!("download request was rejected"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .context("downloaded payload was not valid base64")
    }

    async fn go_back(&mut self) -> Result<()> {
        let _ = self.page.evaluate("history.back()").await;
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.page.close().await;
        // Browser shuts down on drop.
        drop(self.browser);
        Ok(())
    }
}

/// Sanitize a string for safe injection into a JS string literal.
///
/// Escapes everything that could break out of the string context and
/// strips null bytes; angle brackets are hex-escaped so reflected values
/// cannot close a script tag.
fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionDriver as _;

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize_js_string("form:schlagwoerter"), "form:schlagwoerter");
        assert_eq!(sanitize_js_string("it's"), "it\\'s");
        assert_eq!(sanitize_js_string("a\"b"), "a\\\"b");
    }

    #[test]
    fn test_sanitize_breakout_attempts() {
        // Every quote must come out escaped; an unescaped one would close
        // the JS string literal.
        let malicious = "'); fetch('http://evil'); ('";
        let sanitized = sanitize_js_string(malicious);
        assert!(sanitized.contains("\\')"));
        let mut prev = ' ';
        for c in sanitized.chars() {
            assert!(c != '\'' || prev == '\\', "unescaped quote in {sanitized}");
            prev = c;
        }

        let script = "</script><script>alert(1)</script>";
        let sanitized = sanitize_js_string(script);
        assert!(!sanitized.contains("</script>"));
    }

    #[test]
    fn test_sanitize_preserves_selector_syntax() {
        assert_eq!(
            sanitize_js_string(r#"table[role="grid"]"#),
            r#"table[role=\"grid\"]"#
        );
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_fill_and_submit_roundtrip() {
        let mut driver = Box::new(ChromiumDriver::launch().await.expect("launch failed"));
        driver
            .navigate(
                "data:text/html,<form name=\"form\"><input name=\"form:schlagwoerter\"></form>",
                10_000,
            )
            .await
            .expect("navigation failed");

        assert!(driver
            .fill_field("form:schlagwoerter", "Beispiel GmbH")
            .await
            .unwrap());
        assert!(!driver.fill_field("does:not:exist", "x").await.unwrap());

        let html = driver.page_html().await.unwrap();
        assert!(html.contains("form:schlagwoerter"));

        driver.close().await.expect("close failed");
    }
}
