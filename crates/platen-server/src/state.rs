use std::sync::Arc;

use platen_core::analysis::FileAnalyzer;
use sea_orm::DatabaseConnection;

use crate::bus::EventBus;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::identity::IdentityProvider;
use crate::repo::printers::StateCatalog;
use crate::storage::FileStore;

/// Everything the handlers need, composed once in `main`. Components get
/// their collaborators from here; nothing reaches for globals.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub cfg: Arc<Config>,
    pub identity: Arc<IdentityProvider>,
    pub store: FileStore,
    pub analyzer: Arc<dyn FileAnalyzer>,
    pub bus: EventBus,
    pub dispatcher: Arc<Dispatcher>,
    pub catalog: Arc<StateCatalog>,
}
