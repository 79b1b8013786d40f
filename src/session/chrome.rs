use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{identify, BrowserError, ChatMessage, ChatSession, ScrapedMessage, SessionFactory};
use crate::config::ChatConfig;

/// What one scrape of the page returns.
#[derive(Debug, Deserialize)]
struct PageSnapshot {
    url: String,
    messages: Vec<ScrapedMessage>,
}

/// Chat page driven through the Chrome DevTools Protocol.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    input: Option<Element>,
    location: Option<String>,
    chat: ChatConfig,
    /// Attached to a browser the user started; never close it.
    attached: bool,
}

impl ChromeSession {
    pub async fn open(chat: &ChatConfig) -> Result<Self, BrowserError> {
        let attached = chat.debugger_url.is_some();
        let (browser, mut handler) = match &chat.debugger_url {
            Some(endpoint) => {
                info!("Attaching to running browser at {}", endpoint);
                Browser::connect(endpoint.as_str())
                    .await
                    .map_err(|e| BrowserError::Launch(e.to_string()))?
            }
            None => {
                info!("Launching browser (profile: {})", chat.user_data_dir.display());
                Browser::launch(launch_config(chat)?)
                    .await
                    .map_err(|e| BrowserError::Launch(e.to_string()))?
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event loop ended: {}", e);
                    break;
                }
            }
        });

        let page = match chat_page(&browser, &chat.url).await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(e);
            }
        };

        if !attached && chat.login_wait_secs > 0 {
            info!(
                "Log in and open the channel in the browser window; monitoring begins in {}s",
                chat.login_wait_secs
            );
            tokio::time::sleep(Duration::from_secs(chat.login_wait_secs)).await;
        }

        Ok(Self {
            browser,
            page,
            handler,
            input: None,
            location: None,
            chat: chat.clone(),
            attached,
        })
    }
}

fn launch_config(chat: &ChatConfig) -> Result<BrowserConfig, BrowserError> {
    let mut builder = BrowserConfig::builder()
        .user_data_dir(&chat.user_data_dir)
        .arg("--start-maximized")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-infobars");
    if !chat.headless {
        builder = builder.with_head();
    }
    builder.build().map_err(BrowserError::Launch)
}

/// Reuse a tab already on the chat's origin, or open the chat URL.
async fn chat_page(browser: &Browser, chat_url: &str) -> Result<Page, BrowserError> {
    let pages = browser.pages().await.map_err(map_cdp)?;
    for page in pages {
        if let Ok(Some(url)) = page.url().await {
            if same_origin(chat_url, &url) {
                info!("Using open tab {}", url);
                return Ok(page);
            }
        }
    }

    info!("Opening {}", chat_url);
    browser.new_page(chat_url).await.map_err(map_cdp)
}

fn same_origin(expected: &str, actual: &str) -> bool {
    match (Url::parse(expected), Url::parse(actual)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    }
}

/// Path of `url`, which tells the login screen and each channel apart.
fn page_location(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|u| u.path().to_string())
}

fn scrape_script(selector: &str) -> String {
    // serde_json quoting yields a valid JS string literal.
    let selector = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
    const nodes = Array.from(document.querySelectorAll({selector}));
    return {{
        url: window.location.href,
        messages: nodes.map((el) => {{
            const host = el.closest('[id]');
            return {{ dom_id: host ? host.id : null, text: (el.innerText || '').trim() }};
        }}),
    }};
}})()"#
    )
}

fn map_cdp(err: CdpError) -> BrowserError {
    match err {
        CdpError::NotFound => BrowserError::ElementNotFound("no matching element".to_string()),
        CdpError::Timeout => BrowserError::Timeout,
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            BrowserError::SessionLost(err.to_string())
        }
        other => BrowserError::Other(other.to_string()),
    }
}

#[async_trait]
impl ChatSession for ChromeSession {
    async fn visible_messages(&mut self) -> Result<Vec<ChatMessage>, BrowserError> {
        let result = self
            .page
            .evaluate(scrape_script(&self.chat.message_selector))
            .await
            .map_err(map_cdp)?;
        let snapshot: PageSnapshot = result
            .into_value()
            .map_err(|e| BrowserError::Stale(e.to_string()))?;

        if !same_origin(&self.chat.url, &snapshot.url) {
            return Err(BrowserError::NavigatedAway(snapshot.url));
        }
        self.location = page_location(&snapshot.url);
        Ok(identify(snapshot.messages))
    }

    async fn focus_input(&mut self) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(self.chat.input_selector.as_str())
            .await
            .map_err(|e| match e {
                CdpError::NotFound => BrowserError::ElementNotFound(self.chat.input_selector.clone()),
                other => map_cdp(other),
            })?;
        element.click().await.map_err(map_cdp)?;
        self.input = Some(element);
        Ok(())
    }

    async fn type_text(&mut self, text: &str) -> Result<(), BrowserError> {
        let element = self
            .input
            .as_ref()
            .ok_or_else(|| BrowserError::ElementNotFound("message input not focused".to_string()))?;
        element.type_str(text).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn submit(&mut self) -> Result<(), BrowserError> {
        let element = self
            .input
            .take()
            .ok_or_else(|| BrowserError::ElementNotFound("message input not focused".to_string()))?;
        element.press_key("Enter").await.map_err(map_cdp)?;
        Ok(())
    }

    fn location(&self) -> Option<String> {
        self.location.clone()
    }

    async fn close(&mut self) {
        self.input = None;
        if self.attached {
            info!("Detaching from browser");
        } else {
            info!("Closing browser...");
            if let Err(e) = self.browser.close().await {
                warn!("Error closing browser: {}", e);
            }
            if let Err(e) = self.browser.wait().await {
                warn!("Error waiting for browser to exit: {}", e);
            }
        }
        self.handler.abort();
    }
}

/// Opens [`ChromeSession`]s for the control server.
pub struct ChromeLauncher;

#[async_trait]
impl SessionFactory for ChromeLauncher {
    async fn open(&self, chat: &ChatConfig) -> Result<Box<dyn ChatSession>, BrowserError> {
        let session = ChromeSession::open(chat).await?;
        Ok(Box::new(session))
    }
}
