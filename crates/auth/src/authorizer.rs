use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::{info, warn};

use crate::credential::{AppCredentials, Credential};
use crate::flow::{AuthFuture, InteractiveFlow};
use crate::store::CredentialStore;
use crate::{AuthError, DEFAULT_SCOPE};

/// Default time the operator has to complete the interactive flow.
pub const DEFAULT_FLOW_TIMEOUT: Duration = Duration::from_secs(300);

/// Anything that can hand out a usable [`Credential`].
pub trait CredentialProvider: Send + Sync {
    fn authorize(&self) -> AuthFuture<'_, Credential>;
}

/// Whether a usable credential is currently persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

type Flight = Shared<BoxFuture<'static, Result<Credential, Arc<AuthError>>>>;

/// The in-progress flight, tagged so its task only clears its own entry.
#[derive(Default)]
struct FlightSlot {
    next_id: u64,
    current: Option<(u64, Flight)>,
}

fn lock(slot: &Mutex<FlightSlot>) -> MutexGuard<'_, FlightSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Loads the persisted credential or runs the interactive flow once.
///
/// One `Authorizer` per credential path. While an interactive flow is in
/// progress, every caller awaits that same flow instead of starting its own.
/// A flight is forgotten as soon as its flow finishes, whether or not any
/// caller is still waiting for it.
pub struct Authorizer {
    inner: Arc<Inner>,
    flight: Arc<Mutex<FlightSlot>>,
}

struct Inner {
    store: CredentialStore,
    app_path: PathBuf,
    scopes: Vec<String>,
    flow: Arc<dyn InteractiveFlow>,
    flow_timeout: Option<Duration>,
}

impl Authorizer {
    pub fn new(
        store: CredentialStore,
        app_path: impl Into<PathBuf>,
        flow: Arc<dyn InteractiveFlow>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                app_path: app_path.into(),
                scopes: vec![DEFAULT_SCOPE.to_string()],
                flow,
                flow_timeout: Some(DEFAULT_FLOW_TIMEOUT),
            }),
            flight: Arc::default(),
        }
    }

    /// Scopes requested by the interactive flow.
    ///
    /// Must be called before the authorizer is shared.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.scopes = scopes;
        }
        self
    }

    /// Bounds the interactive flow. `None` waits indefinitely.
    pub fn with_flow_timeout(mut self, timeout: Option<Duration>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.flow_timeout = timeout;
        }
        self
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub async fn state(&self) -> AuthState {
        match self.inner.store.load().await {
            Ok(Some(_)) => AuthState::Authenticated,
            _ => AuthState::Unauthenticated,
        }
    }

    /// Returns the stored credential, running the interactive flow if none
    /// can be loaded.
    pub async fn authorize(&self) -> Result<Credential, AuthError> {
        if let Some(credential) = self.inner.load_persisted().await {
            return Ok(credential);
        }

        let result = self.join_flight().await;
        result.map_err(|e| Arc::try_unwrap(e).unwrap_or_else(AuthError::Shared))
    }

    /// Returns the in-progress flight, starting one if there is none.
    fn join_flight(&self) -> Flight {
        // Held until the new flight is stored, so its task cannot clear the
        // slot before the flight is in it.
        let mut slot = lock(&self.flight);
        if let Some((_, flight)) = slot.current.as_ref() {
            return flight.clone();
        }

        let id = slot.next_id;
        slot.next_id += 1;
        let inner = Arc::clone(&self.inner);
        let slots = Arc::clone(&self.flight);
        let handle = tokio::spawn(async move {
            let result = inner.run_flow().await;
            {
                let mut slot = lock(&slots);
                if slot.current.as_ref().is_some_and(|(current, _)| *current == id) {
                    slot.current = None;
                }
            }
            result
        });
        let flight = async move {
            match handle.await {
                Ok(result) => result.map_err(Arc::new),
                Err(e) => Err(Arc::new(AuthError::Flow(format!(
                    "authorization task failed: {e}"
                )))),
            }
        }
        .boxed()
        .shared();

        slot.current = Some((id, flight.clone()));
        flight
    }
}

impl CredentialProvider for Authorizer {
    fn authorize(&self) -> AuthFuture<'_, Credential> {
        Box::pin(Authorizer::authorize(self))
    }
}

impl Inner {
    async fn load_persisted(&self) -> Option<Credential> {
        match self.store.load().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(
                    path = %self.store.path().display(),
                    error = %e,
                    "stored credential could not be loaded"
                );
                None
            }
        }
    }

    async fn run_flow(&self) -> Result<Credential, AuthError> {
        // A previous flight may have stored a credential since the caller looked.
        if let Ok(Some(credential)) = self.store.load().await {
            return Ok(credential);
        }

        let app = AppCredentials::load(&self.app_path).await?;
        info!(client_id = %app.client_id, "starting interactive authorization");

        let flow = self.flow.authorize(&app, &self.scopes);
        let token = match self.flow_timeout {
            Some(limit) => tokio::time::timeout(limit, flow)
                .await
                .map_err(|_| AuthError::Timeout)??,
            None => flow.await?,
        };

        let credential = Credential::authorized_user(&app, token);
        credential.validate()?;
        self.store.save(&credential).await?;

        info!(path = %self.store.path().display(), "authorization complete, credential stored");
        Ok(credential)
    }
}
