//! Wallet gate service - wiring and HTTP entry point.
//!
//! Builds every component once from a validated [`GateConfig`], mounts the
//! routes behind the middleware stack and serves them.

use crate::adapters::{MemoryRateLimitStore, SystemResolver};
use crate::domain::address::Address;
use crate::domain::allow_list::AllowList;
use crate::domain::config::{ConfigError, GateConfig};
use crate::domain::csrf::CsrfGuard;
use crate::domain::rate_limit::{cleanup_task, RateLimitPolicy, RateLimiter};
use crate::domain::sanitize::InputGuard;
use crate::domain::session::SessionTokenService;
use crate::domain::signature::SignatureVerifier;
use crate::handlers;
use crate::middleware::{
    create_cors_layer, panic_response, AuthGateLayer, CookiePolicy, CsrfLayer,
    ErrorExposureLayer, GateMode, InputGuardLayer, IpProtectionLayer, RateLimitLayer,
    TracingLayer, TrustedProxies,
};
use crate::ports::{HostResolver, RateLimitStore};
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct GateState {
    pub config: Arc<GateConfig>,
    pub verifier: Arc<SignatureVerifier>,
    pub sessions: Arc<SessionTokenService>,
    pub csrf: Arc<CsrfGuard>,
    pub input: Arc<InputGuard>,
    pub allow_list: Arc<AllowList>,
    pub owner: Option<Address>,
    pub cookies: CookiePolicy,
}

/// The assembled gate: state, rate limiters and middleware.
pub struct GateService {
    state: GateState,
    store: Arc<dyn RateLimitStore>,
    general: RateLimitLayer,
    auth: RateLimitLayer,
    per_wallet: RateLimitLayer,
    cors: CorsLayer,
}

impl GateService {
    /// Validate `config` and build every component.
    pub fn new(
        config: GateConfig,
        store: Arc<dyn RateLimitStore>,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let allow_list = Arc::new(config.allow_list()?);
        let owner = config.owner()?;
        let sessions = Arc::new(SessionTokenService::new(
            config.session.secret.as_bytes(),
            config.session.ttl,
        )?);
        let csrf = Arc::new(CsrfGuard::new(config.csrf.secret.as_bytes())?);
        let verifier = Arc::new(SignatureVerifier::new(
            config.auth.challenge_message.clone(),
            Arc::clone(&allow_list),
        ));
        let input = Arc::new(InputGuard::new(
            config.input.rich_text_fields.clone(),
            config.input.verbatim_fields.clone(),
            resolver,
        ));
        let cors = create_cors_layer(&config.cors)?;

        let budget = config.rate_limit.max_requests;
        let window = config.rate_limit.window;
        let limiter = |policy| RateLimitLayer::new(RateLimiter::new(policy, Arc::clone(&store)));
        let general = limiter(RateLimitPolicy::general(budget, window));
        let auth = limiter(RateLimitPolicy::auth());
        let per_wallet = limiter(RateLimitPolicy::per_wallet(budget, window));

        info!(
            mode = %config.mode,
            allow_list = allow_list.len(),
            owner_routes = owner.is_some(),
            "Wallet gate configured"
        );

        let state = GateState {
            cookies: CookiePolicy {
                secure: config.mode.is_production(),
            },
            config: Arc::new(config),
            verifier,
            sessions,
            csrf,
            input,
            allow_list,
            owner,
        };

        Ok(Self {
            state,
            store,
            general,
            auth,
            per_wallet,
            cors,
        })
    }

    /// In-process rate-limit store and the system DNS resolver.
    pub fn from_config(config: GateConfig) -> Result<Self, ConfigError> {
        Self::new(
            config,
            Arc::new(MemoryRateLimitStore::new()),
            Arc::new(SystemResolver),
        )
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn config(&self) -> &GateConfig {
        &self.state.config
    }

    /// The rpcProxy policy for routers that forward RPC traffic.
    pub fn rpc_proxy_layer(&self) -> RateLimitLayer {
        let config = &self.state.config.rate_limit;
        RateLimitLayer::new(RateLimiter::new(
            RateLimitPolicy::rpc_proxy(config.max_requests, config.window),
            Arc::clone(&self.store),
        ))
    }

    /// Build the full router.
    pub fn router(&self) -> Router {
        let state = self.state.clone();
        let gate = |mode| {
            AuthGateLayer::new(
                mode,
                Arc::clone(&state.sessions),
                Arc::clone(&state.allow_list),
            )
        };
        let max_body_bytes = state.config.input.max_body_bytes;

        let mut api = Router::new()
            .route("/auth/message", get(handlers::challenge_message))
            .route("/auth/csrf", get(handlers::csrf_token))
            .route(
                "/auth/verify",
                post(handlers::verify).layer(self.auth.clone()),
            )
            .route(
                "/auth/me",
                get(handlers::me).layer(gate(GateMode::Optional)),
            )
            .route(
                "/auth/refresh",
                post(handlers::refresh).layer(
                    ServiceBuilder::new()
                        .layer(gate(GateMode::Required))
                        .layer(self.per_wallet.clone()),
                ),
            )
            .route(
                "/auth/logout",
                post(handlers::logout).layer(gate(GateMode::Required)),
            );

        if let Some(owner) = state.owner {
            api = api.route(
                "/admin/session",
                get(handlers::admin_session).layer(
                    ServiceBuilder::new()
                        .layer(gate(GateMode::Required))
                        .layer(gate(GateMode::Pinned(owner))),
                ),
            );
        }

        let api = api.layer(
            ServiceBuilder::new()
                .layer(self.general.clone())
                .layer(InputGuardLayer::new(Arc::clone(&state.input), max_body_bytes))
                .layer(
                    CsrfLayer::new(Arc::clone(&state.csrf), state.cookies, max_body_bytes)
                        .with_session_binding(
                            Arc::clone(&state.sessions),
                            Arc::clone(&state.allow_list),
                        ),
                ),
        );

        Router::new()
            .route("/health", get(handlers::health_check))
            .nest("/api", api)
            .fallback(handlers::not_found)
            .layer(
                ServiceBuilder::new()
                    .layer(self.cors.clone())
                    .layer(CatchPanicLayer::custom(panic_response))
                    .layer(TracingLayer::new())
                    .layer(ErrorExposureLayer::new(state.config.mode))
                    .layer(IpProtectionLayer::new(TrustedProxies::from(
                        &state.config.security,
                    ))),
            )
            .with_state(state)
    }

    /// Prune finished rate-limit windows in the background.
    pub fn spawn_cleanup(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let interval = self.state.config.rate_limit.cleanup_interval;
        tokio::spawn(cleanup_task(store, interval))
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config.bind_addr();
        let cleanup = self.spawn_cleanup();
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %addr, "Wallet gate listening");

        let result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        cleanup.abort();
        info!("Wallet gate stopped");
        result
    }
}
