//! Page runtime: navigation stack, command buses, toast scheduling and page construction.
//!
//! Pages never touch the stack or the toast state directly. They hold a
//! [`PageContext`] and post commands; one consumer task per bus applies them.

mod bus;
mod factory;
mod navigation;
mod page;
mod toast;

pub use bus::{
    channels, BusReceivers, NavigationCommand, PageContext, ToastCommand, NAVIGATION_CAPACITY,
    TOAST_CAPACITY,
};
pub use factory::{PageConstructor, PageFactory, Services};
pub use navigation::{
    run_navigation_consumer, ActivePage, NavigationStack, PageChanged, PageEntry, PageId, PageRef,
};
pub use page::{Page, PageArgs, PageKind, SharedPage};
pub use toast::{ActiveToast, Severity, Toast, ToastScheduler};

#[cfg(test)]
pub(crate) use factory::tests as factory_tests;
