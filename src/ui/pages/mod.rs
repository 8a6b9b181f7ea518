mod launch;
mod projects;
mod sessions;
mod settings;

pub use launch::LaunchPage;
pub use projects::{filter_projects, ProjectListPage};
pub use sessions::SessionListPage;
pub use settings::SettingsPage;

use crate::runtime::{PageFactory, PageKind, Services};

/// Factory with every page of the application registered.
pub fn factory(services: Services) -> PageFactory {
    let mut factory = PageFactory::new(services);
    factory
        .register(PageKind::Projects, ProjectListPage::construct)
        .register(PageKind::Sessions, SessionListPage::construct)
        .register(PageKind::Settings, SettingsPage::construct)
        .register(PageKind::Launch, LaunchPage::construct);
    factory
}

/// Move a list cursor by `delta`, staying inside `[0, len)`.
pub(crate) fn step(selected: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = selected as isize + delta;
    next.clamp(0, len as isize - 1) as usize
}
