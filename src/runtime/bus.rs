use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::factory::PageFactory;
use super::page::{Page, PageArgs, PageKind};
use super::toast::{Severity, Toast};
use crate::error::{Error, Result};

pub const NAVIGATION_CAPACITY: usize = 1;
pub const TOAST_CAPACITY: usize = 10;

pub enum NavigationCommand {
    /// Push a page built by the factory on the sender's side
    NavigateTo(Box<dyn Page>),
    NavigateBack,
    Exit,
}

impl fmt::Debug for NavigationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationCommand::NavigateTo(page) => {
                f.debug_tuple("NavigateTo").field(&page.kind()).finish()
            }
            NavigationCommand::NavigateBack => f.write_str("NavigateBack"),
            NavigationCommand::Exit => f.write_str("Exit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToastCommand {
    Show(Toast),
    Clear,
}

/// Consumer ends of both buses, handed to the runtime's consumer tasks.
pub struct BusReceivers {
    pub navigation: mpsc::Receiver<NavigationCommand>,
    pub toasts: mpsc::Receiver<ToastCommand>,
}

/// Create both buses and the context pages use to write to them.
pub fn channels(factory: Arc<PageFactory>, toast_duration: Duration) -> (PageContext, BusReceivers) {
    let (nav_tx, nav_rx) = mpsc::channel(NAVIGATION_CAPACITY);
    let (toast_tx, toast_rx) = mpsc::channel(TOAST_CAPACITY);
    (
        PageContext {
            navigation: nav_tx,
            toasts: toast_tx,
            factory,
            toast_duration,
        },
        BusReceivers {
            navigation: nav_rx,
            toasts: toast_rx,
        },
    )
}

/// The only handle pages get on the runtime.
///
/// Writers wait only for channel capacity, never for the consumer to finish
/// applying a command.
#[derive(Clone)]
pub struct PageContext {
    navigation: mpsc::Sender<NavigationCommand>,
    toasts: mpsc::Sender<ToastCommand>,
    factory: Arc<PageFactory>,
    toast_duration: Duration,
}

impl PageContext {
    /// Build the page now (construction errors return to the caller), then queue it.
    pub async fn navigate_to(&self, kind: PageKind, args: PageArgs) -> Result<()> {
        let page = self.factory.create(kind, args)?;
        self.send_navigation(NavigationCommand::NavigateTo(page))
            .await
    }

    pub async fn navigate_back(&self) -> Result<()> {
        self.send_navigation(NavigationCommand::NavigateBack).await
    }

    pub async fn exit(&self) -> Result<()> {
        self.send_navigation(NavigationCommand::Exit).await
    }

    pub async fn show_toast(
        &self,
        message: impl Into<String>,
        severity: Severity,
        duration: Duration,
    ) -> Result<()> {
        self.send_toast(ToastCommand::Show(Toast::new(message, severity, duration)))
            .await
    }

    pub async fn show_info(&self, message: impl Into<String>) -> Result<()> {
        self.show_toast(message, Severity::Info, self.toast_duration)
            .await
    }

    pub async fn show_success(&self, message: impl Into<String>) -> Result<()> {
        self.show_toast(message, Severity::Success, self.toast_duration)
            .await
    }

    pub async fn show_warning(&self, message: impl Into<String>) -> Result<()> {
        self.show_toast(message, Severity::Warning, self.toast_duration)
            .await
    }

    pub async fn show_error(&self, message: impl Into<String>) -> Result<()> {
        // Errors stay up a little longer than the default.
        let duration = self.toast_duration.saturating_mul(2);
        self.show_toast(message, Severity::Error, duration).await
    }

    pub async fn clear_toasts(&self) -> Result<()> {
        self.send_toast(ToastCommand::Clear).await
    }

    async fn send_navigation(&self, cmd: NavigationCommand) -> Result<()> {
        self.navigation
            .send(cmd)
            .await
            .map_err(|_| Error::ChannelClosed("navigation"))
    }

    async fn send_toast(&self, cmd: ToastCommand) -> Result<()> {
        self.toasts
            .send(cmd)
            .await
            .map_err(|_| Error::ChannelClosed("toast"))
    }
}
