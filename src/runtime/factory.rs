use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use super::page::{Page, PageArgs, PageKind};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::projects::{ProjectsSnapshot, SessionLoader};

/// Dependencies injected into every page constructor.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<AppConfig>,
    pub loader: Arc<SessionLoader>,
    pub projects: watch::Receiver<ProjectsSnapshot>,
}

pub type PageConstructor = fn(&Services, PageArgs) -> Result<Box<dyn Page>>;

/// Registry from page identifier to constructor.
pub struct PageFactory {
    services: Services,
    registry: HashMap<PageKind, PageConstructor>,
}

impl PageFactory {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            registry: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: PageKind, constructor: PageConstructor) -> &mut Self {
        self.registry.insert(kind, constructor);
        self
    }

    pub fn is_registered(&self, kind: PageKind) -> bool {
        self.registry.contains_key(&kind)
    }

    pub fn create(&self, kind: PageKind, args: PageArgs) -> Result<Box<dyn Page>> {
        let constructor = self
            .registry
            .get(&kind)
            .ok_or_else(|| Error::page_construction(kind.as_str(), "registered constructor"))?;
        constructor(&self.services, args)
    }
}
