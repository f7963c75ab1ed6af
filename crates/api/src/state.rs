//! Application state.
//!
//! Every component gets its collaborators at construction; nothing reaches
//! for module-level state. The gateway is built once here and shared.

use std::sync::Arc;

use time::Duration;

use orbit_billing::{DismissalStore, MemoryKv, SubscriptionService, WebhookProcessor};
use orbit_invites::InviteManager;
use orbit_shared::{Clock, MemoryGateway, SystemClock};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<MemoryGateway>,
    pub invites: Arc<InviteManager<MemoryGateway>>,
    pub webhooks: Arc<WebhookProcessor<MemoryGateway>>,
    pub subscriptions: Arc<SubscriptionService<MemoryGateway>>,
    pub dismissals: Arc<DismissalStore<MemoryKv>>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Construction with an injected clock, used by tests to control time.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let gateway = Arc::new(MemoryGateway::new());
        let invites = Arc::new(InviteManager::new(
            gateway.clone(),
            clock.clone(),
            Duration::days(config.invite_ttl_days),
        ));
        let webhooks = Arc::new(WebhookProcessor::new(
            gateway.clone(),
            clock.clone(),
            &config.webhook_secret,
            Duration::days(config.trial_days),
        ));
        let subscriptions = Arc::new(SubscriptionService::new(gateway.clone(), clock.clone()));
        let dismissals = Arc::new(DismissalStore::new(MemoryKv::new(), clock));
        Self {
            gateway,
            invites,
            webhooks,
            subscriptions,
            dismissals,
            config,
        }
    }
}
