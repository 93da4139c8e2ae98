//! Shared application state, passed explicitly to every component.

use std::sync::Arc;

use crate::config::Config;
use crate::crypto::Envelope;
use crate::db::Store;
use crate::email::Mailer;
use crate::error::ApiResult;
use crate::hibp::PwnedPasswords;
use crate::hub::{HubContext, HubRegistry, SocketIndex};
use crate::matchmaker::Matchmaker;
use crate::notifications::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub envelope: Arc<Envelope>,
    pub sockets: Arc<SocketIndex>,
    pub notifier: Arc<Notifier>,
    pub hubs: Arc<HubRegistry>,
    pub matchmaker: Arc<Matchmaker>,
    pub mailer: Arc<Mailer>,
    pub hibp: Arc<PwnedPasswords>,
}

impl AppState {
    /// Assemble the component graph over an initialised store.
    pub async fn new(config: Config, store: Store, envelope: Envelope) -> ApiResult<AppState> {
        let sockets = Arc::new(SocketIndex::new());
        let notifier = Arc::new(Notifier::new(store.clone(), sockets.clone()));
        let hubs = Arc::new(HubRegistry::new(HubContext {
            store: store.clone(),
            notifier: notifier.clone(),
            elo_k: config.elo_k_factor,
        }));
        let matchmaker = Arc::new(Matchmaker::load(store.clone()).await?);
        let mailer = Arc::new(Mailer::new(config.email_from.clone()));
        let hibp = Arc::new(PwnedPasswords::new(config.hibp_enabled));
        Ok(AppState {
            config: Arc::new(config),
            store,
            envelope: Arc::new(envelope),
            sockets,
            notifier,
            hubs,
            matchmaker,
            mailer,
            hibp,
        })
    }
}
