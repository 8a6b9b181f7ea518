use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::{Stream, StreamExt};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{pages, render};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::projects::{ProjectWatcher, ProjectsSnapshot, SessionLoader};
use crate::runtime::{
    channels, run_navigation_consumer, ActivePage, ActiveToast, NavigationStack, PageArgs,
    PageContext, PageKind, Services, ToastScheduler,
};

/// Restores the terminal even when the loop unwinds.
struct TermGuard;

impl Drop for TermGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = execute!(stdout, LeaveAlternateScreen, crossterm::cursor::Show);
    }
}

/// What the page loop needs from the terminal.
trait Screen {
    type Backend: Backend;
    type Events: Stream<Item = io::Result<CrosstermEvent>> + Unpin;

    fn parts(&mut self) -> (&mut Terminal<Self::Backend>, &mut Self::Events);

    /// Hand the tty to a child process.
    fn suspend(&mut self) -> Result<()>;

    /// Take the tty back once the child is done.
    fn resume(&mut self) -> Result<()>;
}

struct CrosstermScreen {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    events: Option<EventStream>,
}

impl Screen for CrosstermScreen {
    type Backend = CrosstermBackend<io::Stdout>;
    type Events = EventStream;

    fn parts(&mut self) -> (&mut Terminal<Self::Backend>, &mut EventStream) {
        let events = self.events.get_or_insert_with(EventStream::new);
        (&mut self.terminal, events)
    }

    fn suspend(&mut self) -> Result<()> {
        // The child reads stdin directly; stop polling it.
        self.events = None;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        enable_raw_mode()?;
        execute!(self.terminal.backend_mut(), EnterAlternateScreen)?;
        self.terminal.clear()?;
        self.events = Some(EventStream::new());
        Ok(())
    }
}

/// How one activation of the top page ended
#[derive(Debug)]
enum PageExit {
    /// The stack changed or the app is shutting down
    Cancelled,
    /// The page wants the raw terminal
    FullControl,
}

/// Main TUI application: owns the terminal and drives whichever page is on top.
pub struct App {
    config: Arc<AppConfig>,
    stack: Arc<NavigationStack>,
    ctx: PageContext,
    watcher: Arc<ProjectWatcher>,
    projects: watch::Receiver<ProjectsSnapshot>,
    toasts: watch::Receiver<Option<ActiveToast>>,
    shutdown: CancellationToken,
    consumers: Vec<JoinHandle<()>>,
}

impl App {
    /// Time the loop waits for a first (or replacement) page before giving up.
    const EMPTY_STACK_GRACE: Duration = Duration::from_millis(200);
    /// Bound on waiting for a failed page to be popped.
    const BACK_TIMEOUT: Duration = Duration::from_secs(1);

    /// Create new application
    pub async fn new(config: AppConfig) -> Result<Self> {
        let config = Arc::new(config);
        let loader = Arc::new(SessionLoader::new());
        let watcher = Arc::new(
            ProjectWatcher::start(
                config.projects_dir.clone(),
                config.watch_debounce,
                Arc::clone(&loader),
            )
            .await,
        );
        let projects = watcher.subscribe();

        let services = Services {
            config: Arc::clone(&config),
            loader,
            projects: projects.clone(),
        };
        let factory = Arc::new(pages::factory(services));
        let (ctx, buses) = channels(factory, config.toast_duration);

        let stack = Arc::new(NavigationStack::new());
        let shutdown = CancellationToken::new();
        let (scheduler, toasts) = ToastScheduler::new(buses.toasts);
        let consumers = vec![
            tokio::spawn(scheduler.run()),
            tokio::spawn(run_navigation_consumer(
                buses.navigation,
                Arc::clone(&stack),
                shutdown.clone(),
            )),
        ];

        Ok(Self {
            config,
            stack,
            ctx,
            watcher,
            projects,
            toasts,
            shutdown,
            consumers,
        })
    }

    /// Run the TUI application
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "starting TUI on {}",
            self.config.projects_dir.display()
        );
        self.ctx
            .navigate_to(PageKind::Projects, PageArgs::none())
            .await?;

        // Setup terminal
        enable_raw_mode()?;
        let _guard = TermGuard;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.clear()?;
        let mut screen = CrosstermScreen {
            terminal,
            events: None,
        };

        let result = self.page_loop(&mut screen).await;
        self.shutdown_runtime().await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(screen.terminal.backend_mut(), LeaveAlternateScreen)?;
        screen.terminal.show_cursor()?;

        result
    }

    /// Outer loop: one iteration per activation of the top page.
    async fn page_loop<S: Screen>(&self, screen: &mut S) -> Result<()> {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let Some(active) = self.stack.current() else {
                if self.wait_for_page().await {
                    continue;
                }
                debug!("navigation stack is empty, leaving");
                break;
            };

            match self.run_page(screen, &active).await {
                Ok(PageExit::Cancelled) => {}
                Ok(PageExit::FullControl) => {
                    if let Err(e) = self.hand_off(screen, &active).await {
                        error!(
                            "restoring terminal after {} failed: {}",
                            active.entry.kind.as_str(),
                            e
                        );
                        return Err(e);
                    }
                }
                Err(e) => {
                    error!("page {} failed: {}", active.entry.kind.as_str(), e);
                    self.report(format!("{} failed: {}", active.entry.kind.as_str(), e))
                        .await;
                    self.leave(&active).await;
                }
            }
        }
        Ok(())
    }

    /// Whether a page showed up on the empty stack within the grace period.
    async fn wait_for_page(&self) -> bool {
        let mut changes = self.stack.subscribe();
        if self.stack.has_pages() {
            return true;
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            changed = tokio::time::timeout(Self::EMPTY_STACK_GRACE, changes.recv()) => {
                changed.is_ok() && self.stack.has_pages()
            }
        }
    }

    /// Initialize, render and feed input to one page activation.
    async fn run_page<S: Screen>(&self, screen: &mut S, active: &ActivePage) -> Result<PageExit> {
        let token = &active.token;
        let page = Arc::clone(&active.entry.page);

        if page.lock().await.wants_full_control() {
            return Ok(PageExit::FullControl);
        }

        let init = {
            let mut guard = page.lock().await;
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = guard.initialize(&self.ctx) => Some(result),
            }
        };
        match init {
            None => return Ok(PageExit::Cancelled),
            Some(Err(e)) => {
                warn!("initializing {} failed: {}", active.entry.kind.as_str(), e);
                self.report(e.to_string()).await;
            }
            Some(Ok(())) => {}
        }

        let (terminal, events) = screen.parts();
        let mut toasts = self.toasts.clone();
        let mut projects = self.projects.clone();
        let mut toasts_open = true;
        let mut projects_open = true;
        let mut reported = HashSet::new();

        toasts.borrow_and_update();
        projects.borrow_and_update();
        self.draw(terminal, active, &mut reported).await?;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(PageExit::Cancelled),
                _ = self.shutdown.cancelled() => return Ok(PageExit::Cancelled),
                changed = toasts.changed(), if toasts_open => {
                    toasts_open = changed.is_ok();
                    toasts.borrow_and_update();
                }
                changed = projects.changed(), if projects_open => {
                    projects_open = changed.is_ok();
                    projects.borrow_and_update();
                    if projects_open {
                        self.projects_changed(active).await;
                    }
                }
                event = events.next() => match event {
                    Some(Ok(CrosstermEvent::Key(key))) if key.kind == KeyEventKind::Press => {
                        // Keys read after the stack moved belong to no page.
                        if token.is_cancelled() {
                            return Ok(PageExit::Cancelled);
                        }
                        self.dispatch_key(active, key).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(Error::Other("terminal input closed".to_string())),
                },
            }

            if token.is_cancelled() {
                return Ok(PageExit::Cancelled);
            }
            self.draw(terminal, active, &mut reported).await?;
        }
    }

    async fn projects_changed(&self, active: &ActivePage) {
        let result = {
            let mut page = active.entry.page.lock().await;
            page.projects_changed(&self.ctx).await
        };
        if let Err(e) = result {
            warn!("{} refresh failed: {}", active.entry.kind.as_str(), e);
            self.report(e.to_string()).await;
        }
    }

    /// Draw the three fragments and the toast overlay. A failing fragment is
    /// replaced by a placeholder and reported once per activation.
    async fn draw<B: Backend>(
        &self,
        terminal: &mut Terminal<B>,
        active: &ActivePage,
        reported: &mut HashSet<String>,
    ) -> Result<()> {
        let toast = self.toasts.borrow().clone();
        let mut failures = Vec::new();
        {
            let mut page = active.entry.page.lock().await;
            terminal
                .draw(|f| {
                    let [header, body, footer] = render::frame_layout(f.area());
                    if let Err(e) = page.render_header(f, header) {
                        render::error_placeholder(f, header, "Header", &e.to_string());
                        failures.push(format!("header: {e}"));
                    }
                    if let Err(e) = page.render_body(f, body) {
                        render::error_placeholder(f, body, "Content", &e.to_string());
                        failures.push(format!("content: {e}"));
                    }
                    if let Err(e) = page.render_footer(f, footer) {
                        render::error_placeholder(f, footer, "Footer", &e.to_string());
                        failures.push(format!("footer: {e}"));
                    }
                    if let Some(toast) = &toast {
                        render::toast_overlay(f, body, toast);
                    }
                })
                .map_err(|e| Error::render(e.to_string()))?;
        }

        for failure in failures {
            if reported.insert(failure.clone()) {
                warn!("render failed on {}: {}", active.entry.kind.as_str(), failure);
                self.report(format!("Render failed ({failure})")).await;
            }
        }
        Ok(())
    }

    /// Global shortcuts first, then the page; pages capturing input get the key
    /// first and globals only see what they leave unrecognized.
    async fn dispatch_key(&self, active: &ActivePage, key: KeyEvent) {
        if active.token.is_cancelled() {
            debug!("dropping key for inactive {}", active.entry.kind.as_str());
            return;
        }
        let capturing = active.entry.page.lock().await.captures_input();
        if !capturing && self.handle_global(active, &key).await {
            return;
        }

        let handled = {
            let mut page = active.entry.page.lock().await;
            if active.token.is_cancelled() {
                return;
            }
            page.handle_key(key, &self.ctx).await
        };
        match handled {
            Ok(true) => {}
            Ok(false) => {
                if capturing {
                    self.handle_global(active, &key).await;
                }
            }
            Err(e) => {
                warn!("{} key handler failed: {}", active.entry.kind.as_str(), e);
                self.report(e.to_string()).await;
            }
        }
    }

    async fn handle_global(&self, active: &ActivePage, key: &KeyEvent) -> bool {
        let keys = &self.config.keybindings;
        let result = if keys.matches("exit", key) {
            self.ctx.exit().await
        } else if keys.matches("quit", key) {
            if active.depth <= 1 {
                self.ctx.exit().await
            } else {
                self.ctx.navigate_back().await
            }
        } else if keys.matches("back", key) {
            self.ctx.navigate_back().await
        } else if keys.matches("settings", key) {
            if active.entry.kind == PageKind::Settings {
                return true;
            }
            self.ctx
                .navigate_to(PageKind::Settings, PageArgs::none())
                .await
        } else if keys.matches("refresh", key) {
            self.watcher.refresh();
            self.rescan_notice().await
        } else if keys.matches("clear_toasts", key) {
            self.ctx.clear_toasts().await
        } else {
            return false;
        };

        if let Err(e) = result {
            warn!("global shortcut failed: {}", e);
            self.report(e.to_string()).await;
        }
        true
    }

    async fn rescan_notice(&self) -> Result<()> {
        self.ctx
            .show_info(format!(
                "Rescanning {}",
                self.watcher.root().display()
            ))
            .await
    }

    /// Give the raw terminal to the page until it returns or is popped, then pop it.
    async fn hand_off<S: Screen>(&self, screen: &mut S, active: &ActivePage) -> Result<()> {
        screen.suspend()?;
        let result = active.run_full_control(&self.ctx).await;
        screen.resume()?;

        match result {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!("{} failed: {}", active.entry.kind.as_str(), e);
                self.report(e.to_string()).await;
            }
            None => debug!("{} left while running", active.entry.kind.as_str()),
        }
        self.leave(active).await;
        Ok(())
    }

    /// Pop `active` unless navigation already moved past it, and wait for the pop.
    async fn leave(&self, active: &ActivePage) {
        if active.token.is_cancelled() {
            return;
        }
        if let Err(e) = self.ctx.navigate_back().await {
            warn!("cannot leave {}: {}", active.entry.kind.as_str(), e);
            return;
        }
        if tokio::time::timeout(Self::BACK_TIMEOUT, active.token.cancelled())
            .await
            .is_err()
        {
            warn!("{} was not popped in time", active.entry.kind.as_str());
        }
    }

    async fn report(&self, message: String) {
        if let Err(e) = self.ctx.show_error(message).await {
            debug!("toast dropped: {}", e);
        }
    }

    async fn shutdown_runtime(&mut self) {
        self.shutdown.cancel();
        self.stack.clear().await;
        self.watcher.dispose();
        for handle in self.consumers.drain(..) {
            handle.abort();
        }
        info!("TUI stopped");
    }
}
