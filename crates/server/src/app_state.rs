use std::{collections::BTreeMap, sync::Arc};

use crud::{CatalogSet, Dispatch, SessionStore};
use storage::Storage;

pub(crate) struct AppState {
    pub(crate) storage: Storage,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) catalogs: CatalogSet,
    controllers: BTreeMap<String, Arc<dyn Dispatch>>,
}

impl AppState {
    pub(crate) fn new(
        storage: Storage,
        sessions: Arc<dyn SessionStore>,
        catalogs: CatalogSet,
    ) -> Self {
        Self {
            storage,
            sessions,
            catalogs,
            controllers: BTreeMap::new(),
        }
    }

    /// Registers a controller under its own name, replacing any previous one.
    pub(crate) fn register(&mut self, controller: Arc<dyn Dispatch>) {
        self.controllers
            .insert(controller.name().to_string(), controller);
    }

    pub(crate) fn controller(&self, name: &str) -> Option<&Arc<dyn Dispatch>> {
        self.controllers.get(name)
    }

    pub(crate) fn controller_names(&self) -> Vec<&str> {
        self.controllers.keys().map(String::as_str).collect()
    }
}
