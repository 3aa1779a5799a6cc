//! Server construction and middleware wiring.

mod config;
#[cfg(feature = "metrics")]
mod metrics;
mod state_builders;

pub use config::ServerConfig;

use state_builders::build_http_state;

use actix_session::{
    SessionMiddleware,
    config::{CookieContentSecurity, PersistentSession},
    storage::CookieSessionStore,
};
use actix_web::cookie::{Key, SameSite};
use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use platelist::Trace;
#[cfg(debug_assertions)]
use platelist::doc::ApiDoc;
use platelist::inbound::http::api_services;
use platelist::inbound::http::health::{HealthState, live, ready};
use platelist::inbound::http::state::HttpState;
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

#[derive(Clone)]
struct AppDependencies {
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    key: Key,
    cookie_secure: bool,
    same_site: SameSite,
}

fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
        key,
        cookie_secure,
        same_site,
    } = deps;

    let session = SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("session".into())
        .cookie_path("/".into())
        .cookie_secure(cookie_secure)
        .cookie_http_only(true)
        .cookie_content_security(CookieContentSecurity::Private)
        .cookie_same_site(same_site)
        .session_lifecycle(
            PersistentSession::default().session_ttl(actix_web::cookie::time::Duration::days(30)),
        )
        .build();

    let api = web::scope("/api/v1").wrap(session).configure(api_services);

    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .wrap(Trace)
        .service(api)
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    app
}

/// Prepare the store and cache before traffic arrives: seed the built-in
/// achievements and publish the persisted snapshot, if any.
async fn prime_state(state: &HttpState) {
    match state.achievements.seed_builtin().await {
        Ok(created) => info!(created, "built-in achievements ready"),
        Err(err) => warn!(error = %err, "could not seed built-in achievements"),
    }
    if !state.refresh.warm_start().await {
        info!("no persisted snapshot; queries use the store until the first refresh");
    }
}

/// A bound server plus the background refresh it owns.
pub struct RunningServer {
    server: Server,
    refresh: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl RunningServer {
    /// Drive the listener until shutdown, then stop the periodic refresh.
    ///
    /// # Errors
    /// Propagates [`std::io::Error`] from the Actix server.
    pub async fn run(self) -> std::io::Result<()> {
        let result = self.server.await;
        if let Some((shutdown, handle)) = self.refresh {
            if shutdown.send(true).is_err() {
                debug!("periodic refresh already stopped");
            }
            if let Err(err) = handle.await {
                warn!(error = %err, "periodic refresh task ended abnormally");
            }
        }
        result
    }
}

/// Construct the Actix HTTP server and start the periodic snapshot refresh.
///
/// # Parameters
/// - `health_state`: readiness state, marked ready once the socket is bound.
/// - `config`: pre-built [`ServerConfig`] with session, binding, storage and
///   refresh settings.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket or building the
/// metrics middleware fails.
pub async fn create_server(
    health_state: HealthState,
    config: ServerConfig,
) -> std::io::Result<RunningServer> {
    let http_state = build_http_state(&config);
    prime_state(&http_state).await;

    let health_state =
        web::Data::new(health_state.with_snapshot_cache(http_state.snapshot_cache().clone()));
    let server_health_state = health_state.clone();

    let refresh = config.refresh_interval.map(|interval| {
        let (tx, rx) = watch::channel(false);
        info!(interval_secs = interval.as_secs(), "periodic snapshot refresh enabled");
        (tx, http_state.refresh.spawn_periodic(interval, rx))
    });

    let http_state = web::Data::new(http_state);
    let ServerConfig {
        key,
        cookie_secure,
        same_site,
        bind_addr,
        ..
    } = config;

    #[cfg(feature = "metrics")]
    let prometheus = metrics::build_metrics()?;

    let server = HttpServer::new(move || {
        let app = build_app(AppDependencies {
            health_state: server_health_state.clone(),
            http_state: http_state.clone(),
            key: key.clone(),
            cookie_secure,
            same_site,
        });

        #[cfg(feature = "metrics")]
        let app = app.wrap(prometheus.clone());

        app
    })
    .bind(bind_addr)?
    .run();

    health_state.mark_ready();
    Ok(RunningServer { server, refresh })
}
