//! Server initialization and routing

use crate::api;
use crate::config::Config;
use crate::email::{EmailProvider, LogEmailProvider, SmtpEmailProvider};
use crate::jwt::JwtManager;
use crate::middleware::{ObservabilityLayer, SanitizedMakeSpan};
use crate::repository::{
    confirmation::ConfirmationRepositoryImpl, invitation::InvitationRepositoryImpl,
    realm::RealmRepositoryImpl, scheduled_email::ScheduledEmailRepositoryImpl,
    user::UserRepositoryImpl, ScheduledEmailRepository,
};
use crate::service::{
    ConfirmationManager, EmailService, InvitationService, LicenseSeatChecker,
    RegistrationService, SeatChecker, UnlimitedSeats,
};
use crate::state::HasServices;
use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type MySqlInvitationService = InvitationService<
    RealmRepositoryImpl,
    UserRepositoryImpl,
    InvitationRepositoryImpl,
    ConfirmationRepositoryImpl,
    ScheduledEmailRepositoryImpl,
>;

type MySqlRegistrationService = RegistrationService<
    RealmRepositoryImpl,
    UserRepositoryImpl,
    InvitationRepositoryImpl,
    ConfirmationRepositoryImpl,
    ScheduledEmailRepositoryImpl,
>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: MySqlPool,
    pub jwt_manager: JwtManager,
    pub user_repo: Arc<UserRepositoryImpl>,
    pub invitation_service: Arc<MySqlInvitationService>,
    pub registration_service: Arc<MySqlRegistrationService>,
}

impl HasServices for AppState {
    type RealmRepo = RealmRepositoryImpl;
    type UserRepo = UserRepositoryImpl;
    type InvitationRepo = InvitationRepositoryImpl;
    type ConfirmationRepo = ConfirmationRepositoryImpl;
    type ScheduledEmailRepo = ScheduledEmailRepositoryImpl;

    fn config(&self) -> &Config {
        &self.config
    }

    fn jwt_manager(&self) -> &JwtManager {
        &self.jwt_manager
    }

    fn user_repo(&self) -> &Self::UserRepo {
        &self.user_repo
    }

    fn invitation_service(&self) -> &MySqlInvitationService {
        &self.invitation_service
    }

    fn registration_service(&self) -> &MySqlRegistrationService {
        &self.registration_service
    }

    async fn check_ready(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.db_pool).await.is_ok()
    }
}

/// The outgoing mail transport: SMTP when configured, otherwise the log
pub fn email_provider(config: &Config) -> Result<Arc<dyn EmailProvider>> {
    match &config.email.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "Using SMTP email provider");
            Ok(Arc::new(SmtpEmailProvider::from_config(smtp)?))
        }
        None => {
            tracing::warn!("SMTP_HOST not set; emails will only be logged");
            Ok(Arc::new(LogEmailProvider))
        }
    }
}

pub async fn run(config: Config, prometheus_handle: Option<PrometheusHandle>) -> Result<()> {
    let db_pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    info!("Connected to database");

    let realm_repo = Arc::new(RealmRepositoryImpl::new(db_pool.clone()));
    let user_repo = Arc::new(UserRepositoryImpl::new(db_pool.clone()));
    let invitation_repo = Arc::new(InvitationRepositoryImpl::new(db_pool.clone()));
    let confirmation_repo = Arc::new(ConfirmationRepositoryImpl::new(db_pool.clone()));
    let scheduled_repo = Arc::new(ScheduledEmailRepositoryImpl::new(db_pool.clone()));

    let confirmations = Arc::new(ConfirmationManager::new(confirmation_repo));
    let email_service = Arc::new(EmailService::new(email_provider(&config)?, scheduled_repo));
    let seats: Arc<dyn SeatChecker> = match config.invitations.license_limit {
        Some(licenses) => Arc::new(LicenseSeatChecker::new(user_repo.clone(), licenses)),
        None => Arc::new(UnlimitedSeats),
    };

    let invitation_service = Arc::new(InvitationService::new(
        realm_repo.clone(),
        user_repo.clone(),
        invitation_repo.clone(),
        confirmations.clone(),
        email_service.clone(),
        seats.clone(),
        config.invitations.clone(),
        config.app_base_url.clone(),
    ));
    let registration_service = Arc::new(RegistrationService::new(
        realm_repo,
        user_repo.clone(),
        invitation_repo,
        confirmations,
        email_service.clone(),
        seats,
        config.invitations.clone(),
        config.app_base_url.clone(),
    ));

    let http_addr = config.http_addr();
    spawn_reminder_worker(
        email_service,
        Duration::from_secs(config.email.reminder_poll_interval_secs.max(1)),
    );

    let state = AppState {
        jwt_manager: JwtManager::new(config.jwt.clone()),
        config: Arc::new(config),
        db_pool,
        user_repo,
        invitation_service,
        registration_service,
    };

    let app = build_router(state, prometheus_handle);

    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Deliver due scheduled emails every `every`
pub fn spawn_reminder_worker<S>(
    email_service: Arc<EmailService<S>>,
    every: Duration,
) -> tokio::task::JoinHandle<()>
where
    S: ScheduledEmailRepository + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match email_service.deliver_due(chrono::Utc::now()).await {
                Ok(report) if report.delivered + report.failed + report.dropped > 0 => {
                    info!(
                        delivered = report.delivered,
                        failed = report.failed,
                        dropped = report.dropped,
                        "Scheduled email pass finished"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Scheduled email pass failed"),
            }
        }
    })
}

/// Build the HTTP router with generic state type
///
/// `/metrics` is only mounted when a Prometheus handle is given.
pub fn build_router<S: HasServices>(state: S, prometheus_handle: Option<PrometheusHandle>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready::<S>))
        // Invitations (authenticated)
        .route(
            "/api/v1/invites",
            get(api::invitation::list::<S>).post(api::invitation::invite::<S>),
        )
        .route("/api/v1/invites/{id}", delete(api::invitation::revoke::<S>))
        .route(
            "/api/v1/invites/{id}/resend",
            post(api::invitation::resend::<S>),
        )
        .route(
            "/api/v1/invites/multiuse",
            post(api::invitation::create_multiuse::<S>),
        )
        .route(
            "/api/v1/invites/multiuse/{id}",
            delete(api::invitation::revoke_multiuse::<S>),
        )
        // Registration (public)
        .route("/join/{key}", post(api::registration::join::<S>))
        .route("/join/{key}/", post(api::registration::join::<S>))
        .route("/api/v1/signup", post(api::registration::signup::<S>))
        .route("/api/v1/register", post(api::registration::complete::<S>))
        .route(
            "/api/v1/register/{key}",
            get(api::registration::preview::<S>),
        )
        .with_state(state);

    if let Some(handle) = prometheus_handle {
        router = router.merge(
            Router::new()
                .route("/metrics", get(api::metrics::render))
                .with_state(handle),
        );
    }

    router
        .layer(TraceLayer::new_for_http().make_span_with(SanitizedMakeSpan))
        .layer(ObservabilityLayer)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
}
