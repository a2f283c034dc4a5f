use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::orchestrator::RideOrchestrator;
use crate::error::AppError;
use crate::observability::metrics::Metrics;
use crate::services::backend::{SimulatedBackend, SimulationSettings};
use crate::services::notifier::BroadcastNotifier;
use crate::store::accounts::{AccountRepository, AccountStore};
use crate::store::roster::DriverRoster;

pub type Session = RideOrchestrator<SimulatedBackend>;

pub struct AppState {
    pub accounts: Arc<AccountStore>,
    pub backend: Arc<SimulatedBackend>,
    pub notifier: Arc<BroadcastNotifier>,
    pub sessions: DashMap<Uuid, Arc<Session>>,
    pub metrics: Metrics,
    seed: Option<u64>,
    sessions_created: AtomicU64,
}

impl AppState {
    pub fn new(
        accounts: AccountStore,
        roster: DriverRoster,
        settings: SimulationSettings,
        event_buffer_size: usize,
    ) -> Self {
        let backend = SimulatedBackend::new(Arc::new(roster), settings);
        let metrics = Metrics::new();
        metrics.accounts_total.set(accounts.len() as i64);

        Self {
            accounts: Arc::new(accounts),
            backend: Arc::new(backend),
            notifier: Arc::new(BroadcastNotifier::new(event_buffer_size)),
            sessions: DashMap::new(),
            metrics,
            seed: settings.seed,
            sessions_created: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let accounts = AccountStore::load(config.accounts_file.as_deref())?;
        let roster = DriverRoster::load(config.drivers_file.as_deref())?;
        let settings = SimulationSettings {
            latency: config.sim_latency(),
            failure_rate: config.sim_failure_rate,
            seed: config.sim_seed,
        };

        Ok(Self::new(accounts, roster, settings, config.event_buffer_size))
    }

    pub fn create_session(&self) -> Arc<Session> {
        let ordinal = self.sessions_created.fetch_add(1, Ordering::Relaxed);
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(ordinal)),
            None => StdRng::from_entropy(),
        };

        let session_id = Uuid::new_v4();
        let session = Arc::new(RideOrchestrator::new(
            session_id,
            self.accounts.clone(),
            self.backend.clone(),
            self.notifier.clone(),
            rng,
        ));

        self.sessions.insert(session_id, session.clone());
        self.metrics.active_sessions.set(self.sessions.len() as i64);
        session
    }

    pub fn session(&self, id: Uuid) -> Result<Arc<Session>, AppError> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))
    }

    pub fn close_session(&self, id: Uuid) -> Result<(), AppError> {
        self.sessions
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
        self.metrics.active_sessions.set(self.sessions.len() as i64);
        Ok(())
    }
}
