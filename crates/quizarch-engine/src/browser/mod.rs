//! Chromium-backed report renderer.
//!
//! One browser (plus context) is launched per job and reused for all of its
//! attempts. The attempt HTML is never written to a server: a CDP fetch
//! interception fulfils requests to `{base_url}/mock/attempt` with the report
//! body, so host-origin relative resources resolve normally and CORS stays
//! disabled. Belated navigations to the host login page can be aborted, and
//! PDF export waits for the page's ready signal when configured.

use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, ContinueWithAuthParams, AuthChallengeResponse,
    AuthChallengeResponseResponse, EnableParams, EventAuthRequired, EventRequestPaused,
    FailRequestParams, FulfillRequestParams, HeaderEntry, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use quizarch_core::ports::{RenderSession, ReportRenderer};
use quizarch_core::{PaperFormat, ReportSignal, Settings, WorkerError, WorkerResult};

/// Watermark payload injected in demo mode.
const DEMOMODE_JS: &str = include_str!("../../res/demomode.js");

/// Ready-signal payload injected before waiting for export readiness.
const READYSIGNAL_JS: &str = include_str!("../../res/readysignal.js");

/// Millimetres per inch, for CDP margin conversion.
const MM_PER_INCH: f64 = 25.4;

fn render_err(context: &str, e: impl std::fmt::Display) -> WorkerError {
    WorkerError::render(format!("{context}: {e}"))
}

/// Chromium-backed implementation of the [`ReportRenderer`] port.
pub struct ChromiumRenderer {
    settings: Settings,
}

impl ChromiumRenderer {
    /// Create a renderer with the given settings.
    #[must_use]
    pub const fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn browser_config(&self) -> WorkerResult<BrowserConfig> {
        let width = self.settings.report_base_viewport_width;
        let height = width * 9 / 16;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-web-security")
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Viewport::default()
            })
            .request_timeout(self.settings.report_wait_for_navigation_timeout);

        if self.settings.skip_https_cert_validation {
            builder = builder.arg("--ignore-certificate-errors");
        }
        if let Some(proxy) = &self.settings.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.server_url));
            if let Some(bypass) = &proxy.bypass_domains {
                builder = builder.arg(format!("--proxy-bypass-list={bypass}"));
            }
        }

        builder
            .build()
            .map_err(|e| render_err("Invalid browser configuration", e))
    }
}

#[async_trait]
impl ReportRenderer for ChromiumRenderer {
    async fn open_session(&self, base_url: &str) -> WorkerResult<Box<dyn RenderSession>> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| render_err("Failed to launch browser", e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler event error: {e}");
                }
            }
        });
        tracing::debug!("Spawned browser and browser context");

        Ok(Box::new(ChromiumSession {
            browser,
            handler_task,
            settings: self.settings.clone(),
            mock_url: format!("{base_url}/mock/attempt"),
        }))
    }
}

/// One job-scoped browser session.
struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    settings: Settings,
    mock_url: String,
}

impl ChromiumSession {
    /// Register the fetch interception for a fresh page: fulfil the mock
    /// attempt URL with the report HTML, abort login redirections, answer
    /// proxy auth challenges, pass everything else through.
    async fn install_request_interception(
        &self,
        page: &Page,
        html: &str,
    ) -> WorkerResult<JoinHandle<()>> {
        page.execute(EnableParams {
            patterns: Some(vec![RequestPattern {
                url_pattern: Some("*".to_string()),
                resource_type: None,
                request_stage: None,
            }]),
            handle_auth_requests: Some(true),
        })
        .await
        .map_err(|e| render_err("Failed to enable request interception", e))?;

        let mut paused_events = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| render_err("Failed to listen for paused requests", e))?;
        let mut auth_events = page
            .event_listener::<EventAuthRequired>()
            .await
            .map_err(|e| render_err("Failed to listen for auth challenges", e))?;

        let page = page.clone();
        let mock_url = self.mock_url.clone();
        let body = BASE64_STANDARD.encode(html.as_bytes());
        let prevent_login_redirect = self.settings.prevent_redirect_to_login;
        let proxy = self.settings.proxy.clone();

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = paused_events.next() => {
                        let Some(event) = event else { break };
                        let url = event.request.url.clone();
                        let result = if url == mock_url {
                            let fulfill = FulfillRequestParams::builder()
                                .request_id(event.request_id.clone())
                                .response_code(200)
                                .response_headers(vec![HeaderEntry {
                                    name: "Content-Type".to_string(),
                                    value: "text/html".to_string(),
                                }])
                                .body(body.clone())
                                .build();
                            match fulfill {
                                Ok(fulfill) => page.execute(fulfill).await.map(|_| ()),
                                Err(e) => {
                                    tracing::error!("Failed to build fulfil response: {e}");
                                    continue;
                                }
                            }
                        } else if prevent_login_redirect && is_login_url(&url) {
                            tracing::warn!("Prevented belated redirection to: {url}");
                            page.execute(FailRequestParams::new(
                                event.request_id.clone(),
                                ErrorReason::BlockedByClient,
                            ))
                            .await
                            .map(|_| ())
                        } else {
                            page.execute(ContinueRequestParams::new(event.request_id.clone()))
                                .await
                                .map(|_| ())
                        };
                        if let Err(e) = result {
                            tracing::debug!(url, "Request interception response failed: {e}");
                        }
                    }
                    event = auth_events.next() => {
                        let Some(event) = event else { break };
                        let response = match &proxy {
                            Some(proxy) if proxy.username.is_some() => AuthChallengeResponse {
                                response: AuthChallengeResponseResponse::ProvideCredentials,
                                username: proxy.username.clone(),
                                password: proxy.password.clone(),
                            },
                            _ => AuthChallengeResponse {
                                response: AuthChallengeResponseResponse::Default,
                                username: None,
                                password: None,
                            },
                        };
                        let result = page
                            .execute(ContinueWithAuthParams::new(
                                event.request_id.clone(),
                                response,
                            ))
                            .await;
                        if let Err(e) = result {
                            tracing::debug!("Auth challenge response failed: {e}");
                        }
                    }
                }
            }
        }))
    }

    /// Wait for the page to emit the ready-for-export console signal.
    async fn wait_for_ready_signal(&self, page: &Page) -> WorkerResult<()> {
        let mut console_events = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(|e| render_err("Failed to listen for console messages", e))?;

        tracing::debug!("Injecting JS to wait for page rendering ...");
        page.evaluate(READYSIGNAL_JS)
            .await
            .map_err(|e| render_err("Failed to inject ready-signal payload", e))?;
        tracing::debug!(
            signal = ReportSignal::ReadyForExport.as_str(),
            "Waiting for ready signal"
        );

        let expected = ReportSignal::ReadyForExport.as_str();
        let wait = async {
            while let Some(event) = console_events.next().await {
                let matched = event.args.iter().any(|arg| {
                    arg.value
                        .as_ref()
                        .and_then(|value| value.as_str())
                        .is_some_and(|text| text == expected)
                });
                if matched {
                    return true;
                }
            }
            false
        };

        let timeout = self.settings.report_wait_for_ready_signal_timeout;
        match tokio::time::timeout(timeout, wait).await {
            Ok(true) => {
                tracing::debug!("Received ready signal");
                Ok(())
            }
            Ok(false) | Err(_) => {
                if self.settings.report_continue_after_ready_signal_timeout {
                    tracing::warn!(
                        timeout_sec = timeout.as_secs(),
                        "Ready signal not received. Continuing ..."
                    );
                    Ok(())
                } else {
                    Err(WorkerError::render(format!(
                        "Ready signal not received after {} seconds.",
                        timeout.as_secs()
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn render_report(
        &self,
        html: &str,
        paper_format: PaperFormat,
    ) -> WorkerResult<Vec<u8>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| render_err("Failed to open page", e))?;

        let interceptor = self.install_request_interception(&page, html).await?;

        let navigation = tokio::time::timeout(
            self.settings.report_wait_for_navigation_timeout,
            page.goto(self.mock_url.clone()),
        )
        .await;
        match navigation {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                interceptor.abort();
                return Err(render_err("Report page navigation failed", e));
            }
            Err(_) => {
                interceptor.abort();
                return Err(WorkerError::render(format!(
                    "Page did not load after {} seconds. Aborting ...",
                    self.settings.report_wait_for_navigation_timeout.as_secs()
                )));
            }
        }

        if self.settings.demo_mode {
            page.evaluate(DEMOMODE_JS)
                .await
                .map_err(|e| render_err("Failed to inject demo watermark", e))?;
        }

        if self.settings.report_wait_for_ready_signal {
            let ready = self.wait_for_ready_signal(&page).await;
            if let Err(e) = ready {
                interceptor.abort();
                let _ = page.close().await;
                return Err(e);
            }
        } else {
            tracing::debug!("Not waiting for ready signal. Export immediately ...");
        }

        let (paper_width, paper_height) = paper_format.size_inches();
        let margin = self.settings.report_page_margin_mm / MM_PER_INCH;
        let pdf = page
            .pdf(PrintToPdfParams {
                print_background: Some(true),
                display_header_footer: Some(false),
                paper_width: Some(paper_width),
                paper_height: Some(paper_height),
                margin_top: Some(margin),
                margin_bottom: Some(margin),
                margin_left: Some(margin),
                margin_right: Some(margin),
                prefer_css_page_size: Some(false),
                ..PrintToPdfParams::default()
            })
            .await
            .map_err(|e| render_err("PDF export failed", e))?;

        interceptor.abort();
        page.close()
            .await
            .map_err(|e| render_err("Failed to close page", e))?;

        Ok(pdf)
    }

    async fn close(self: Box<Self>) -> WorkerResult<()> {
        let mut this = *self;
        let close_result = this.browser.close().await;
        let _ = this.browser.wait().await;
        this.handler_task.abort();
        tracing::debug!("Destroyed browser and browser context");
        close_result
            .map(|_| ())
            .map_err(|e| render_err("Failed to close browser", e))
    }
}

/// Match belated navigations to the host login page (`**/login/*.php`).
fn is_login_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.ends_with(".php") && path.contains("/login/")
}
