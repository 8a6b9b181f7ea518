use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::bus::{NavigationCommand, PageContext};
use super::page::{Page, PageKind, SharedPage};
use crate::error::Result;

pub type PageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRef {
    pub id: PageId,
    pub kind: PageKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChanged {
    pub previous: Option<PageRef>,
    pub current: Option<PageRef>,
}

#[derive(Clone)]
pub struct PageEntry {
    pub id: PageId,
    pub kind: PageKind,
    pub page: SharedPage,
}

impl PageEntry {
    fn page_ref(&self) -> PageRef {
        PageRef {
            id: self.id,
            kind: self.kind,
        }
    }
}

/// The top page plus the token for its current activation.
#[derive(Clone)]
pub struct ActivePage {
    pub entry: PageEntry,
    pub token: CancellationToken,
    /// Stack size at the time of the read; 1 means this is the root page.
    pub depth: usize,
}

impl ActivePage {
    /// Run the page's full-control section until it returns or this activation
    /// is cancelled. Cancellation drops the section and releases the page lock,
    /// so a pop waiting to dispose the page is never blocked by it.
    pub async fn run_full_control(&self, ctx: &PageContext) -> Option<Result<()>> {
        let mut page = self.entry.page.lock().await;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            result = page.run_full_control(ctx) => Some(result),
        }
    }
}

#[derive(Default)]
struct StackState {
    pages: Vec<PageEntry>,
    active: Option<CancellationToken>,
}

impl StackState {
    fn top_ref(&self) -> Option<PageRef> {
        self.pages.last().map(PageEntry::page_ref)
    }

    /// Cancel the live activation and, if a page remains, start a new one.
    fn reactivate(&mut self) {
        if let Some(token) = self.active.take() {
            token.cancel();
        }
        if !self.pages.is_empty() {
            self.active = Some(CancellationToken::new());
        }
    }
}

/// Stack of live pages. The top page is the only one rendering and reading input.
///
/// Every mutation cancels the live activation token, so the render loop working on
/// the old top page stops at its next suspension point.
pub struct NavigationStack {
    state: Mutex<StackState>,
    next_id: AtomicU64,
    events: broadcast::Sender<PageChanged>,
}

impl NavigationStack {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(StackState::default()),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageChanged> {
        self.events.subscribe()
    }

    pub fn push(&self, page: Box<dyn Page>) -> PageChanged {
        let entry = PageEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind: page.kind(),
            page: Arc::new(tokio::sync::Mutex::new(page)),
        };

        let event = {
            let mut state = self.state.lock();
            let previous = state.top_ref();
            let current = Some(entry.page_ref());
            state.pages.push(entry);
            state.reactivate();
            PageChanged { previous, current }
        };

        info!("navigate to {:?}", event.current.map(|p| p.kind));
        let _ = self.events.send(event.clone());
        event
    }

    /// Pop the top page and dispose it before announcing the change.
    pub async fn pop(&self) -> Option<PageChanged> {
        let (popped, event) = {
            let mut state = self.state.lock();
            let popped = state.pages.pop()?;
            state.reactivate();
            let event = PageChanged {
                previous: Some(popped.page_ref()),
                current: state.top_ref(),
            };
            (popped, event)
        };

        popped.page.lock().await.dispose();

        info!(
            "navigate back from {:?} to {:?}",
            popped.kind,
            event.current.map(|p| p.kind)
        );
        let _ = self.events.send(event.clone());
        Some(event)
    }

    /// Dispose every page, top to bottom, and announce one change.
    pub async fn clear(&self) -> PageChanged {
        let (pages, previous) = {
            let mut state = self.state.lock();
            let previous = state.top_ref();
            let pages = std::mem::take(&mut state.pages);
            state.reactivate();
            (pages, previous)
        };

        for entry in pages.iter().rev() {
            entry.page.lock().await.dispose();
        }

        debug!("cleared {} pages", pages.len());
        let event = PageChanged {
            previous,
            current: None,
        };
        let _ = self.events.send(event.clone());
        event
    }

    pub fn current(&self) -> Option<ActivePage> {
        let state = self.state.lock();
        let entry = state.pages.last()?.clone();
        let token = state.active.clone()?;
        Some(ActivePage {
            entry,
            token,
            depth: state.pages.len(),
        })
    }

    pub fn has_pages(&self) -> bool {
        !self.state.lock().pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_pages()
    }
}

impl Default for NavigationStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply navigation commands in arrival order until the bus closes.
pub async fn run_navigation_consumer(
    mut commands: mpsc::Receiver<NavigationCommand>,
    stack: Arc<NavigationStack>,
    shutdown: CancellationToken,
) {
    while let Some(cmd) = commands.recv().await {
        debug!("navigation command {:?}", cmd);
        match cmd {
            NavigationCommand::NavigateTo(page) => {
                stack.push(page);
            }
            NavigationCommand::NavigateBack => {
                stack.pop().await;
            }
            NavigationCommand::Exit => {
                stack.clear().await;
                shutdown.cancel();
            }
        }
    }
    debug!("navigation bus closed");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Result;
    use crate::runtime::PageContext;
    use async_trait::async_trait;
    use crossterm::event::KeyEvent;
    use ratatui::{layout::Rect, Frame};
    use std::sync::atomic::AtomicUsize;

    pub(crate) struct TestPage {
        pub kind: PageKind,
        pub disposed: Arc<AtomicUsize>,
    }

    impl TestPage {
        pub(crate) fn boxed(kind: PageKind, disposed: &Arc<AtomicUsize>) -> Box<dyn Page> {
            Box::new(Self {
                kind,
                disposed: Arc::clone(disposed),
            })
        }
    }

    #[async_trait]
    impl Page for TestPage {
        fn kind(&self) -> PageKind {
            self.kind
        }

        fn title(&self) -> String {
            self.kind.as_str().to_string()
        }

        fn render_body(&mut self, _f: &mut Frame, _area: Rect) -> Result<()> {
            Ok(())
        }

        async fn handle_key(&mut self, _key: KeyEvent, _ctx: &PageContext) -> Result<bool> {
            Ok(false)
        }

        fn dispose(&mut self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Full-control page that never finishes on its own.
    struct StuckPage {
        disposed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Page for StuckPage {
        fn kind(&self) -> PageKind {
            PageKind::Launch
        }

        fn title(&self) -> String {
            "stuck".to_string()
        }

        fn render_body(&mut self, _f: &mut Frame, _area: Rect) -> Result<()> {
            Ok(())
        }

        async fn handle_key(&mut self, _key: KeyEvent, _ctx: &PageContext) -> Result<bool> {
            Ok(false)
        }

        fn wants_full_control(&self) -> bool {
            true
        }

        async fn run_full_control(&mut self, _ctx: &PageContext) -> Result<()> {
            std::future::pending().await
        }

        fn dispose(&mut self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_pop_is_not_blocked_by_full_control() {
        let services = crate::runtime::factory_tests::test_services();
        let factory = Arc::new(crate::runtime::PageFactory::new(services));
        let (ctx, _buses) = crate::runtime::channels(factory, std::time::Duration::from_secs(1));

        let disposed = Arc::new(AtomicUsize::new(0));
        let stack = NavigationStack::new();
        stack.push(TestPage::boxed(PageKind::Projects, &disposed));
        stack.push(Box::new(StuckPage {
            disposed: Arc::clone(&disposed),
        }));
        let active = stack.current().unwrap();

        let (ran, popped) = tokio::join!(active.run_full_control(&ctx), async {
            tokio::task::yield_now().await;
            tokio::time::timeout(std::time::Duration::from_secs(3), stack.pop()).await
        });

        assert!(ran.is_none());
        assert!(popped.is_ok(), "pop waited on the full-control page");
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(stack.current().unwrap().entry.kind, PageKind::Projects);
    }

    #[tokio::test]
    async fn test_push_cancels_previous_activation() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let stack = NavigationStack::new();
        assert!(stack.current().is_none());

        stack.push(TestPage::boxed(PageKind::Projects, &disposed));
        let first = stack.current().unwrap();
        assert!(!first.token.is_cancelled());
        assert_eq!(first.depth, 1);

        let event = stack.push(TestPage::boxed(PageKind::Sessions, &disposed));
        assert!(first.token.is_cancelled());
        assert_eq!(event.previous.map(|p| p.kind), Some(PageKind::Projects));
        assert_eq!(event.current.map(|p| p.kind), Some(PageKind::Sessions));

        let second = stack.current().unwrap();
        assert_eq!(second.entry.kind, PageKind::Sessions);
        assert!(!second.token.is_cancelled());
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pop_disposes_and_reactivates() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let stack = NavigationStack::new();
        stack.push(TestPage::boxed(PageKind::Projects, &disposed));
        stack.push(TestPage::boxed(PageKind::Sessions, &disposed));
        let top = stack.current().unwrap();

        let event = stack.pop().await.unwrap();
        assert!(top.token.is_cancelled());
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(event.previous.map(|p| p.kind), Some(PageKind::Sessions));
        assert_eq!(event.current.map(|p| p.kind), Some(PageKind::Projects));

        let root = stack.current().unwrap();
        assert_eq!(root.entry.kind, PageKind::Projects);
        assert!(!root.token.is_cancelled());

        stack.pop().await.unwrap();
        assert!(stack.pop().await.is_none());
        assert!(!stack.has_pages());
        assert_eq!(disposed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_random_sequence_keeps_invariant() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let stack = NavigationStack::new();
        let mut model: Vec<PageKind> = Vec::new();
        let mut pops = 0;

        let kinds = [PageKind::Projects, PageKind::Sessions, PageKind::Settings];
        // push push pop push pop pop push push push pop ...
        let script = [1, 1, 0, 1, 0, 0, 0, 1, 1, 1, 0, 1, 0, 0, 1];
        for (i, op) in script.iter().enumerate() {
            if *op == 1 {
                let kind = kinds[i % kinds.len()];
                stack.push(TestPage::boxed(kind, &disposed));
                model.push(kind);
            } else if stack.pop().await.is_some() {
                model.pop();
                pops += 1;
            }

            assert_eq!(stack.current().map(|p| p.entry.kind), model.last().copied());
            assert_eq!(stack.len(), model.len());
        }
        assert_eq!(disposed.load(Ordering::SeqCst), pops);

        let remaining = stack.len();
        let event = stack.clear().await;
        assert_eq!(event.current, None);
        assert_eq!(disposed.load(Ordering::SeqCst), pops + remaining);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let stack = NavigationStack::new();
        let mut events = stack.subscribe();

        stack.push(TestPage::boxed(PageKind::Projects, &disposed));
        stack.clear().await;

        let first = events.recv().await.unwrap();
        assert_eq!(first.previous, None);
        let second = events.recv().await.unwrap();
        assert_eq!(second.previous.map(|p| p.kind), Some(PageKind::Projects));
        assert_eq!(second.current, None);
    }

    #[tokio::test]
    async fn test_consumer_applies_exit() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let stack = Arc::new(NavigationStack::new());
        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        let consumer = tokio::spawn(run_navigation_consumer(
            rx,
            Arc::clone(&stack),
            shutdown.clone(),
        ));

        tx.send(NavigationCommand::NavigateTo(TestPage::boxed(
            PageKind::Projects,
            &disposed,
        )))
        .await
        .unwrap();
        tx.send(NavigationCommand::NavigateTo(TestPage::boxed(
            PageKind::Sessions,
            &disposed,
        )))
        .await
        .unwrap();
        tx.send(NavigationCommand::NavigateBack).await.unwrap();
        tx.send(NavigationCommand::Exit).await.unwrap();
        drop(tx);
        consumer.await.unwrap();

        assert!(shutdown.is_cancelled());
        assert!(!stack.has_pages());
        assert_eq!(disposed.load(Ordering::SeqCst), 2);
    }
}
