use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use iam_server::auth::PasswordService;
use iam_server::auth::validation::validate_credentials;
use iam_server::models::Registration;
use iam_server::users::{PgUserStore, UserService};

#[derive(Parser, Debug)]
#[command(name = "create_user", about = "Create a user account in the IAM database")]
struct Args {
    /// Email address for the account (matched exactly on sign-in).
    #[arg(long)]
    email: String,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,

    #[arg(long)]
    first_name: String,

    #[arg(long)]
    last_name: String,

    /// Connection string; falls back to `DATABASE_URL`.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let email = args.email.trim().to_string();

    if let Err(err) = validate_credentials(&email, &args.password) {
        writeln!(io::stderr(), "error: {err}")?;
        std::process::exit(1);
    }

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&args.database_url)
        .await?;
    iam_server::db::run_migrations(&pool).await?;

    let passwords = Arc::new(PasswordService::new()?);
    let users = UserService::new(Arc::new(PgUserStore::new(pool)), passwords);

    if users.find_by_email(&email).await?.is_some() {
        writeln!(
            io::stderr(),
            "error: a user with email '{email}' already exists."
        )?;
        std::process::exit(1);
    }

    let user = users
        .create(Registration {
            email,
            password: args.password,
            first_name: args.first_name,
            last_name: args.last_name,
        })
        .await?;

    println!("Created user '{}' with id {}", user.email, user.id);
    Ok(())
}
