//! Test server harness for E2E testing
//!
//! Provides `TestAdmissionServer` for spawning real admission server
//! instances in tests. By default the server runs on the in-memory lock
//! store with a succeeding mock attacher and no rate limiting.

use admission_service::config::Config;
use admission_service::observability::metrics::init_metrics_recorder;
use admission_service::repositories::{InMemoryLockStore, LockStore};
use admission_service::routes::{self, AppState};
use admission_service::services::agent_attacher::mock::MockAttacher;
use admission_service::services::{
    AdmissionController, AdmissionPolicy, AgentConnectService, AttachPolicy, EventDispatcher,
    RateLimiter,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Global metrics handle for test servers
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Builder for `TestAdmissionServer`.
pub struct TestAdmissionServerBuilder {
    vars: HashMap<String, String>,
    store: Option<Arc<dyn LockStore>>,
    attacher: MockAttacher,
}

impl TestAdmissionServerBuilder {
    fn new() -> Self {
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("INSTANCE_ID".to_string(), "admission-test".to_string()),
            ("ADMISSION_MIN_INTERVAL_MS".to_string(), "0".to_string()),
            ("DEFAULT_AGENT_ID".to_string(), "default-agent".to_string()),
            ("ATTACH_TIMEOUT_SECONDS".to_string(), "2".to_string()),
            ("ATTACH_MAX_ATTEMPTS".to_string(), "1".to_string()),
            ("WEBHOOK_VERIFY".to_string(), "false".to_string()),
        ]);

        Self {
            vars,
            store: None,
            attacher: MockAttacher::succeeding(),
        }
    }

    /// Override a configuration variable.
    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }

    /// Use a specific lock store instead of a fresh in-memory one.
    pub fn lock_store(mut self, store: Arc<dyn LockStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a specific mock attacher.
    pub fn attacher(mut self, attacher: MockAttacher) -> Self {
        self.attacher = attacher;
        self
    }

    /// Spawn the server on a random local port.
    pub async fn spawn(self) -> Result<TestAdmissionServer, anyhow::Error> {
        let config = Config::from_vars(&self.vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let memory_store = InMemoryLockStore::new();
        let store: Arc<dyn LockStore> = match self.store {
            Some(store) => store,
            None => Arc::new(memory_store.clone()),
        };

        let controller = Arc::new(AdmissionController::new(
            store,
            RateLimiter::new(config.rate_limit_horizon()),
            AdmissionPolicy::from_config(&config),
        ));
        let attacher = Arc::new(self.attacher);
        let connect = Arc::new(AgentConnectService::new(
            controller.clone(),
            attacher.clone(),
            AttachPolicy {
                retry_backoff: Duration::from_millis(10),
                ..AttachPolicy::from_config(&config)
            },
        ));
        let dispatcher = Arc::new(EventDispatcher::new(
            connect.clone(),
            config.default_agent_id.clone(),
        ));

        let state = Arc::new(AppState {
            config: config.clone(),
            controller: controller.clone(),
            connect,
            dispatcher,
        });

        // Build routes using admission-service's real route builder
        let app = routes::build_routes(state, test_metrics_handle());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(TestAdmissionServer {
            addr,
            config,
            controller,
            memory_store,
            attacher,
            _handle: handle,
        })
    }
}

/// Test harness for spawning the admission service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<()> {
///     let server = TestAdmissionServer::spawn().await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestAdmissionServer {
    addr: SocketAddr,
    config: Config,
    controller: Arc<AdmissionController>,
    memory_store: InMemoryLockStore,
    attacher: Arc<MockAttacher>,
    _handle: JoinHandle<()>,
}

impl TestAdmissionServer {
    /// Spawn a server with default test configuration.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::builder().spawn().await
    }

    pub fn builder() -> TestAdmissionServerBuilder {
        TestAdmissionServerBuilder::new()
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The controller behind the server, for direct ticket inspection.
    pub fn controller(&self) -> &Arc<AdmissionController> {
        &self.controller
    }

    /// The in-memory store (unused when a custom store was supplied).
    pub fn memory_store(&self) -> &InMemoryLockStore {
        &self.memory_store
    }

    /// The mock attacher, for call counting.
    pub fn attacher(&self) -> &MockAttacher {
        &self.attacher
    }
}

impl Drop for TestAdmissionServer {
    fn drop(&mut self) {
        // Abort the HTTP server task so the port is released when the test ends
        self._handle.abort();
    }
}
