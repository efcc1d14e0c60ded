#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod graphql;
pub mod models;
pub mod request_context;
pub mod request_logger;
pub mod routes;
pub mod users;

use crate::auth::{AppConfig, AuthConfig, AuthState, PgRefreshTokenStore, RefreshTokenStore};
use crate::db::IamDb;
use crate::request_context::RequestContextFairing;
use crate::request_logger::RequestLogger;
use crate::users::{PgUserStore, UserStore};
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};
use std::time::Duration;

static LOGGER: Once = Once::new();

const REFRESH_TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let app_config = AppConfig::from_env();
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::some_exact(&app_config.cors_allowed_origins))
        .allowed_methods(
            vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Patch,
            ]
            .into_iter()
            .map(From::from)
            .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::build()
        .attach(RequestLogger)
        .attach(RequestContextFairing)
        .attach(IamDb::init())
        .attach(cors)
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite("Run Migrations", |rocket| async move {
            match IamDb::fetch(&rocket) {
                Some(db) => match db::run_migrations(db).await {
                    Ok(_) => {
                        log::info!("database migrations successful");
                        Ok(rocket)
                    }
                    Err(e) => {
                        log::error!("database migrations failed: {}", e);
                        Err(rocket)
                    }
                },
                None => {
                    log::error!("database pool not available for migrations");
                    Err(rocket)
                }
            }
        }))
        .attach(AdHoc::try_on_ignite("Authentication", move |rocket| async move {
            let pool = match IamDb::fetch(&rocket) {
                Some(db) => (**db).clone(),
                None => {
                    log::error!("database pool not available for authentication");
                    return Err(rocket);
                }
            };

            let config = match AuthConfig::from_env() {
                Ok(config) => config,
                Err(err) => {
                    log::error!("failed to load authentication config: {}", err);
                    return Err(rocket);
                }
            };

            let refresh_store = PgRefreshTokenStore::new(pool.clone());
            let user_store: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool));
            let ledger: Arc<dyn RefreshTokenStore> = Arc::new(refresh_store.clone());
            let rotation = config.refresh_token_rotation;

            match AuthState::new(config, user_store, Some(ledger)) {
                Ok(state) => {
                    log::info!(
                        "authentication ready (refresh token rotation {})",
                        if rotation { "enabled" } else { "disabled" }
                    );
                    let rocket = if rotation {
                        rocket.manage(refresh_store)
                    } else {
                        rocket
                    };
                    Ok(mount_app(rocket, state, app_config))
                }
                Err(err) => {
                    log::error!("failed to initialize authentication: {}", err);
                    Err(rocket)
                }
            }
        }))
        .attach(AdHoc::on_liftoff("Spawn Refresh Token Purge", |rocket| {
            Box::pin(async move {
                if let Some(store) = rocket.state::<PgRefreshTokenStore>() {
                    let store = store.clone();
                    tokio::spawn(async move {
                        log::info!("starting refresh token purge task");
                        purge_refresh_tokens(store).await
                    });
                }
            })
        }))
}

/// Manage the application state and mount every route: GraphQL at the root,
/// REST and its OpenAPI document under `/api/v1`.
pub fn mount_app(rocket: Rocket<Build>, auth_state: AuthState, app_config: AppConfig) -> Rocket<Build> {
    let schema = graphql::build_schema(auth_state.clone());

    rocket
        .manage(auth_state)
        .manage(app_config)
        .manage(schema)
        .mount("/", graphql::routes())
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Health routes
                routes::health::health_check,
                // Auth routes
                auth::routes::signup,
                auth::routes::signin,
                auth::routes::refresh,
                auth::routes::me,
            ],
        )
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("IAM API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

async fn purge_refresh_tokens(store: impl RefreshTokenStore) {
    let mut interval = tokio::time::interval(REFRESH_TOKEN_PURGE_INTERVAL);
    loop {
        interval.tick().await;
        match store.purge_expired(chrono::Utc::now()).await {
            Ok(0) => {}
            Ok(purged) => log::info!("purged {} expired refresh tokens", purged),
            Err(err) => log::warn!("refresh token purge failed: {}", err),
        }
    }
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use parking_lot::{Mutex, RwLock};
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use rocket_db_pools::sqlx::{self, PgPool};
    use uuid::Uuid;

    use crate::auth::{AppConfig, AuthConfig, AuthError, AuthResult, AuthState, RefreshTokenStore};
    use crate::models::{NewUser, User, UserChanges};
    use crate::request_context::RequestContextFairing;
    use crate::users::UserStore;

    pub use database::{TestDatabase, TestDatabaseError};

    pub const TEST_JWT_SECRET: &str = "test-jwt-secret";

    /// User store backed by a map, for tests that do not need Postgres.
    #[derive(Default)]
    pub struct MemoryUserStore {
        users: RwLock<HashMap<Uuid, User>>,
    }

    #[rocket::async_trait]
    impl UserStore for MemoryUserStore {
        async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
            Ok(self.users.read().get(&id).cloned())
        }

        async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
            Ok(self
                .users
                .read()
                .values()
                .find(|user| user.email == email)
                .cloned())
        }

        async fn insert(&self, user: NewUser) -> AuthResult<User> {
            let mut users = self.users.write();
            if users.values().any(|existing| existing.email == user.email) {
                return Err(AuthError::EmailAlreadyRegistered);
            }

            let now = Utc::now();
            let user = User {
                id: Uuid::new_v4(),
                email: user.email,
                first_name: user.first_name,
                last_name: user.last_name,
                password_hash: user.password_hash,
                created_at: now,
                updated_at: now,
            };
            users.insert(user.id, user.clone());
            Ok(user)
        }

        async fn update(&self, id: Uuid, changes: UserChanges) -> AuthResult<Option<User>> {
            let mut users = self.users.write();
            if let Some(email) = &changes.email {
                if users.values().any(|user| user.id != id && &user.email == email) {
                    return Err(AuthError::EmailAlreadyRegistered);
                }
            }

            let Some(user) = users.get_mut(&id) else {
                return Ok(None);
            };
            if let Some(email) = changes.email {
                user.email = email;
            }
            if let Some(first_name) = changes.first_name {
                user.first_name = first_name;
            }
            if let Some(last_name) = changes.last_name {
                user.last_name = last_name;
            }
            if let Some(password_hash) = changes.password_hash {
                user.password_hash = password_hash;
            }
            user.updated_at = Utc::now();
            Ok(Some(user.clone()))
        }
    }

    #[derive(Debug, Clone)]
    struct RefreshRecord {
        user_id: Uuid,
        expires_at: DateTime<Utc>,
        revoked_at: Option<DateTime<Utc>>,
    }

    /// In-memory refresh token ledger with the same semantics as the
    /// Postgres store.
    #[derive(Default)]
    pub struct MemoryRefreshTokenStore {
        records: Mutex<HashMap<Uuid, RefreshRecord>>,
    }

    impl MemoryRefreshTokenStore {
        /// Recorded, unrevoked ids for `user_id`.
        pub fn outstanding_for(&self, user_id: Uuid) -> usize {
            self.records
                .lock()
                .values()
                .filter(|record| record.user_id == user_id && record.revoked_at.is_none())
                .count()
        }
    }

    #[rocket::async_trait]
    impl RefreshTokenStore for MemoryRefreshTokenStore {
        async fn record(
            &self,
            token_id: Uuid,
            user_id: Uuid,
            expires_at: DateTime<Utc>,
        ) -> AuthResult<()> {
            self.records.lock().insert(
                token_id,
                RefreshRecord {
                    user_id,
                    expires_at,
                    revoked_at: None,
                },
            );
            Ok(())
        }

        async fn consume(&self, token_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> AuthResult<()> {
            let mut records = self.records.lock();
            let record = records.get_mut(&token_id).ok_or(AuthError::TokenInvalid)?;

            if record.user_id != user_id {
                return Err(AuthError::TokenInvalid);
            }
            if record.revoked_at.is_some() {
                return Err(AuthError::TokenReuseDetected { user_id });
            }
            if record.expires_at <= now {
                return Err(AuthError::TokenExpired);
            }

            record.revoked_at = Some(now);
            Ok(())
        }

        async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> AuthResult<u64> {
            let mut revoked = 0;
            for record in self.records.lock().values_mut() {
                if record.user_id == user_id && record.revoked_at.is_none() {
                    record.revoked_at = Some(now);
                    revoked += 1;
                }
            }
            Ok(revoked)
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
            let mut records = self.records.lock();
            let before = records.len();
            records.retain(|_, record| record.expires_at > now);
            Ok((before - records.len()) as u64)
        }
    }

    /// Auth state over empty in-memory stores, without rotation.
    pub fn memory_auth_state() -> AuthState {
        AuthState::new(
            AuthConfig::with_secret(TEST_JWT_SECRET),
            Arc::new(MemoryUserStore::default()),
            None,
        )
        .expect("auth state")
    }

    /// Auth state with rotation on, returning the ledger for inspection.
    pub fn memory_auth_state_with_rotation() -> (AuthState, Arc<MemoryRefreshTokenStore>) {
        let refresh_store = Arc::new(MemoryRefreshTokenStore::default());
        let ledger: Arc<dyn RefreshTokenStore> = refresh_store.clone();
        let mut config = AuthConfig::with_secret(TEST_JWT_SECRET);
        config.refresh_token_rotation = true;

        let state = AuthState::new(config, Arc::new(MemoryUserStore::default()), Some(ledger))
        .expect("auth state");
        (state, refresh_store)
    }

    /// Convenience helpers for seeding user rows in Postgres-backed tests.
    pub struct TestFixtures<'a> {
        pool: &'a PgPool,
    }

    impl<'a> TestFixtures<'a> {
        /// Create a fixture helper bound to the provided pool.
        pub fn new(pool: &'a PgPool) -> Self {
            Self { pool }
        }

        /// Insert a user row with a precomputed hash, returning the new id.
        pub async fn insert_user(
            &self,
            email: &str,
            first_name: &str,
            last_name: &str,
            password_hash: &str,
        ) -> Result<Uuid, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO users (id, email, first_name, last_name, password_hash) VALUES ($1, $2, $3, $4, $5) RETURNING id",
            )
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(first_name)
            .bind(last_name)
            .bind(password_hash)
            .fetch_one(self.pool)
            .await
        }

        /// Number of refresh token rows for `user_id` that are not revoked.
        pub async fn outstanding_refresh_tokens(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM refresh_tokens WHERE user_id = $1 AND revoked_at IS NULL",
            )
            .bind(user_id)
            .fetch_one(self.pool)
            .await
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::{GenericImage, ImageExt, core::WaitFor};
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        impl TestDatabaseError {
            /// True when no container runtime is available, so the calling
            /// test should be skipped rather than failed.
            pub fn is_unavailable(&self) -> bool {
                matches!(self, TestDatabaseError::Container(_))
            }
        }

        /// Ephemeral database factory for integration tests.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<GenericImage>>,
        }

        impl TestDatabase {
            /// Provision a fresh, migrated database in a disposable Postgres container.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let image = GenericImage::new("postgres", "16-alpine")
                    .with_wait_for(WaitFor::message_on_stderr(
                        "database system is ready to accept connections",
                    ));

                let request = image
                    .with_env_var("POSTGRES_DB", "postgres")
                    .with_env_var("POSTGRES_USER", "postgres")
                    .with_env_var("POSTGRES_PASSWORD", "postgres");

                let container = request.start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let base_options: PgConnectOptions =
                    admin_url.parse().map_err(TestDatabaseError::Sqlx)?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let admin_options = base_options.clone().database("postgres");
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                let new_db_name = format!("iam_{}", Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", new_db_name);
                sqlx::query(&create_sql)
                    .execute(&admin_pool)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.clone().database(&new_db_name))
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name: new_db_name,
                    container: Some(container),
                })
            }

            /// Cloneable connection pool for use in tests and Rocket state.
            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections and drop the ephemeral database.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                drop_database_with_fallback(self.admin_options.clone(), &self.database_name)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        async fn drop_database_with_fallback(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;

            let drop_force = format!("DROP DATABASE \"{}\" WITH (FORCE)", database_name);
            match sqlx::query(&drop_force).execute(&admin_pool).await {
                Ok(_) => Ok(()),
                Err(err) if force_drop_unsupported(&err) => {
                    let drop_sql = format!("DROP DATABASE \"{}\"", database_name);
                    sqlx::query(&drop_sql).execute(&admin_pool).await?;
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }

        fn force_drop_unsupported(err: &sqlx::Error) -> bool {
            matches!(
                err,
                sqlx::Error::Database(db_err)
                    if db_err
                        .code()
                        .map(|code| code == "42601" || code == "0A000")
                        .unwrap_or(false)
            )
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let admin_options = self.admin_options.clone();
                    let db_name = self.database_name.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                            let _ = drop_database_with_fallback(admin_options, &db_name).await;
                        });
                    }
                }

                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        app: Option<(AuthState, AppConfig)>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                app: None,
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        /// Mount the full application (GraphQL and REST) over `auth_state`.
        pub fn with_auth_state(mut self, auth_state: AuthState) -> Self {
            let app_config = AppConfig {
                is_development: false,
                cors_allowed_origins: Vec::new(),
            };
            self.app = Some((auth_state, app_config));
            self
        }

        /// Like [`Self::with_auth_state`] with the development-only routes enabled.
        pub fn with_development_app(mut self, auth_state: AuthState) -> Self {
            let app_config = AppConfig {
                is_development: true,
                cors_allowed_origins: Vec::new(),
            };
            self.app = Some((auth_state, app_config));
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment).attach(RequestContextFairing);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some((auth_state, app_config)) = self.app {
                rocket = crate::mount_app(rocket, auth_state, app_config);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
