use std::process;
use std::sync::Arc;

use expohall::{
    application::{
        analytics::AnalyticsService,
        auth::AuthService,
        booths::BoothService,
        cache::TtlCache,
        error::AppError,
        exhibitors::ExhibitorService,
        favorites::FavoriteService,
        repos::{CreateBoothParams, CreateUserParams, SectorParams},
        sectors::SectorService,
        themes::ThemeService,
        users::UserAdminService,
    },
    config,
    domain::types::Role,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, rate_limit::ApiRateLimiter},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_startup_error(&error);
        process::exit(1);
    }
}

fn report_startup_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "startup error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "startup error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| InfraError::configuration(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Seed(_) => run_seed(settings).await,
    }
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_state(repositories: Arc<PostgresRepositories>, settings: &config::Settings) -> ApiState {
    let cache = Arc::new(TtlCache::new(settings.cache.default_ttl));

    let auth = Arc::new(AuthService::new(
        repositories.clone(),
        cache.clone(),
        &settings.auth.jwt_secret,
        settings.auth.jwt_expires,
        settings.auth.bcrypt_cost,
    ));
    let booths = Arc::new(BoothService::new(repositories.clone(), cache.clone()));
    let exhibitors = Arc::new(ExhibitorService::new(
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        cache.clone(),
    ));
    let sectors = Arc::new(SectorService::new(repositories.clone(), cache.clone()));
    let themes = Arc::new(ThemeService::new(repositories.clone(), cache.clone()));
    let favorites = Arc::new(FavoriteService::new(repositories.clone()));
    let users = Arc::new(UserAdminService::new(repositories.clone(), cache.clone()));
    let analytics = Arc::new(AnalyticsService::new(repositories.clone(), cache.clone()));

    let rate_limiter = Arc::new(ApiRateLimiter::new(
        std::time::Duration::from_secs(settings.rate_limit.window_seconds.get() as u64),
        settings.rate_limit.max_requests.get(),
    ));

    ApiState {
        auth,
        booths,
        exhibitors,
        sectors,
        themes,
        favorites,
        users,
        analytics,
        cache,
        db: repositories,
        rate_limiter,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_state(repositories, &settings);

    spawn_cache_sweeper(state.cache.clone(), settings.cache.sweep_interval);

    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "expohall::server",
        addr = %settings.server.addr,
        "listening",
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(())
}

/// Periodically drop expired cache entries so idle keys do not pin memory.
fn spawn_cache_sweeper(cache: Arc<TtlCache>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = cache.sweep();
            if evicted > 0 {
                info!(
                    target = "expohall::cache",
                    evicted = evicted,
                    "swept expired cache entries",
                );
            }
        }
    });
}

async fn shutdown_signal(grace: std::time::Duration) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!(
        target = "expohall::server",
        grace_seconds = grace.as_secs(),
        "shutdown signal received",
    );
}

/// Idempotent bootstrap: default admin, base sectors and a handful of
/// placeholder booths.
async fn run_seed(settings: config::Settings) -> Result<(), AppError> {
    use expohall::application::repos::{BoothsRepo, SectorsRepo, UsersRepo};

    let repositories = init_repositories(&settings).await?;

    let admin_email = settings
        .seed
        .admin_email
        .as_deref()
        .ok_or_else(|| InfraError::configuration("seed admin email is not configured"))?;
    let admin_password = settings
        .seed
        .admin_password
        .as_deref()
        .ok_or_else(|| InfraError::configuration("seed admin password is not configured"))?;

    let existing = UsersRepo::find_auth_by_email(repositories.as_ref(), admin_email)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    if existing.is_none() {
        let password_hash = bcrypt::hash(admin_password, settings.auth.bcrypt_cost)
            .map_err(|err| InfraError::database(err.to_string()))?;
        UsersRepo::create(
            repositories.as_ref(),
            CreateUserParams {
                email: admin_email.to_string(),
                password_hash,
                role: Role::Admin,
                is_approved: true,
            },
        )
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
        info!(target = "expohall::seed", email = admin_email, "admin created");
    }

    let sectors = [
        ("Innovation", "#4F46E5"),
        ("Commerce", "#10B981"),
        ("Services", "#F59E0B"),
    ];
    for (name, color_hex) in sectors {
        let found = SectorsRepo::find_by_name(repositories.as_ref(), name)
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;
        if found.is_none() {
            SectorsRepo::create(
                repositories.as_ref(),
                SectorParams {
                    name: name.to_string(),
                    color_hex: color_hex.to_string(),
                },
            )
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;
        }
    }

    for i in 1..=4u32 {
        let number = format!("A0{i}");
        let found = BoothsRepo::find_by_number(repositories.as_ref(), &number)
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;
        if found.is_none() {
            BoothsRepo::create(
                repositories.as_ref(),
                CreateBoothParams {
                    number,
                    polygon_id: format!("poly-a0{i}"),
                    x: 0.0,
                    y: 0.0,
                    width: None,
                    height: None,
                    rotation: 0.0,
                    polygon_points: None,
                },
            )
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;
        }
    }

    info!(target = "expohall::seed", "base data created");
    Ok(())
}
