//! Headless-browser retrieval for script-rendered pages.
//!
//! Every entry point launches a fresh browser, runs the page work under the
//! configured render budget, and tears the browser down on all exit paths,
//! including timeouts.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::FetchConfig;

const PRESENCE_POLL: Duration = Duration::from_millis(250);

/// Render `url` and return the text of the first candidate selector that
/// yields any, failing with the original selector when none does.
pub async fn fetch_rendered_text(
    config: &FetchConfig,
    url: &str,
    candidates: &[String],
    original_selector: &str,
) -> Result<String> {
    let (browser, handler) = launch(config, url).await?;

    let budget = Duration::from_secs(config.render_timeout_secs);
    let outcome =
        tokio::time::timeout(budget, extract_text(&browser, config, url, candidates)).await;

    teardown(browser, handler).await;

    match outcome {
        Ok(result) => result.and_then(|text| {
            text.ok_or_else(|| AppError::selector_not_found(original_selector))
        }),
        Err(_) => Err(AppError::timeout(url, config.render_timeout_secs)),
    }
}

/// Render `url` and return the full post-render markup.
pub async fn fetch_rendered_html(config: &FetchConfig, url: &str) -> Result<String> {
    let (browser, handler) = launch(config, url).await?;

    let budget = Duration::from_secs(config.render_timeout_secs);
    let outcome = tokio::time::timeout(budget, async {
        let page = open(&browser, url).await?;
        page.content().await.map_err(|e| AppError::render(url, e))
    })
    .await;

    teardown(browser, handler).await;

    match outcome {
        Ok(result) => result,
        Err(_) => Err(AppError::timeout(url, config.render_timeout_secs)),
    }
}

async fn launch(config: &FetchConfig, url: &str) -> Result<(Browser, JoinHandle<()>)> {
    let browser_config = BrowserConfig::builder()
        .no_sandbox()
        .arg(format!("--user-agent={}", config.user_agent))
        .build()
        .map_err(|message| AppError::render(url, message))?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(|e| AppError::render(url, e))?;

    let handle = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    Ok((browser, handle))
}

async fn teardown(mut browser: Browser, handler: JoinHandle<()>) {
    if browser.close().await.is_err() {
        let _ = browser.kill().await;
    }
    let _ = browser.wait().await;
    handler.abort();
}

async fn open(browser: &Browser, url: &str) -> Result<Page> {
    let page = browser
        .new_page(url)
        .await
        .map_err(|e| AppError::render(url, e))?;
    page.wait_for_navigation()
        .await
        .map_err(|e| AppError::render(url, e))?;
    Ok(page)
}

async fn extract_text(
    browser: &Browser,
    config: &FetchConfig,
    url: &str,
    candidates: &[String],
) -> Result<Option<String>> {
    let page = open(browser, url).await?;

    wait_for_any_candidate(&page, config, url, candidates).await;

    for candidate in candidates {
        let text: String = page
            .evaluate(text_expression(candidate)?)
            .await
            .map_err(|e| AppError::render(url, e))?
            .into_value()
            .map_err(|e| AppError::render(url, e))?;
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }

    Ok(None)
}

/// Poll until any candidate appears in the DOM or the wait budget elapses.
/// A page that never produces the element is left to the extraction pass,
/// so this never fails.
async fn wait_for_any_candidate(
    page: &Page,
    config: &FetchConfig,
    url: &str,
    candidates: &[String],
) {
    let deadline =
        tokio::time::Instant::now() + Duration::from_secs(config.selector_wait_secs);

    loop {
        for candidate in candidates {
            let Ok(expression) = presence_expression(candidate) else {
                continue;
            };
            match page.evaluate(expression).await {
                Ok(result) => {
                    if result.into_value::<bool>().unwrap_or(false) {
                        return;
                    }
                }
                Err(error) => {
                    debug!("Presence probe for '{candidate}' on {url} failed: {error}");
                }
            }
        }

        if tokio::time::Instant::now() >= deadline {
            debug!("No candidate selector appeared on {url} within the wait budget");
            return;
        }
        tokio::time::sleep(PRESENCE_POLL).await;
    }
}

fn text_expression(selector: &str) -> Result<String> {
    let quoted = serde_json::to_string(selector)?;
    Ok(format!(
        "(() => {{ const el = document.querySelector({quoted}); return el ? (el.textContent || '') : ''; }})()"
    ))
}

fn presence_expression(selector: &str) -> Result<String> {
    let quoted = serde_json::to_string(selector)?;
    Ok(format!("!!document.querySelector({quoted})"))
}
