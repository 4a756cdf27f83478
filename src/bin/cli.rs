use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use evento::{
    client::{ApiClient, ClientConfig, EntryScanner, FileCredentialStore},
    db,
    models::{CreateEventRequest, EntryOutcome, User},
    repositories::{
        EventRepository, SqliteEventRepository, SqliteRegistrationRepository,
        SqliteUserRepository,
    },
    services::{CreateUserRequest, EventService, UpdatePasswordRequest, UserService},
};
use std::sync::Arc;

const DEFAULT_CREDENTIALS_PATH: &str = ".evento-credentials.json";

#[derive(Parser)]
#[command(name = "evento-cli")]
#[command(about = "Operator tool for Evento users, events and door scanning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User management commands
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Event management commands
    Event {
        #[command(subcommand)]
        command: EventCommands,
    },

    /// Validate an entry code against a running server
    Scan {
        /// Scanned payload: the entry code or a URL ending in it
        code: String,

        /// Only accept codes for this event
        #[arg(short, long)]
        event: Option<i64>,

        /// Log in as this user first (will prompt for the password)
        #[arg(short, long)]
        username: Option<String>,

        /// File holding the session tokens (defaults to $EVENTO_CREDENTIALS)
        #[arg(long)]
        credentials: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a new user
    Create {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        /// Password (will prompt if not provided)
        #[arg(short, long)]
        password: Option<String>,

        /// Mark email as verified
        #[arg(long)]
        verified: bool,

        /// Grant staff rights
        #[arg(long)]
        staff: bool,
    },

    /// List all users
    List {
        /// Maximum number of users to display
        #[arg(short, long, default_value_t = 100)]
        limit: i64,

        /// Offset for pagination
        #[arg(short = 'o', long, default_value_t = 0)]
        offset: i64,
    },

    /// Verify a user's email
    Verify {
        #[arg(short, long)]
        username: String,
    },

    /// Grant or revoke staff rights
    MakeStaff {
        #[arg(short, long)]
        username: String,

        #[arg(long)]
        revoke: bool,
    },

    /// Set a new password for a user
    SetPassword {
        #[arg(short, long)]
        username: String,

        /// New password (will prompt if not provided)
        #[arg(short, long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum EventCommands {
    /// Create an event administered by an existing user
    Create {
        #[arg(short, long)]
        name: String,

        /// RFC 3339 timestamp or YYYY-MM-DD
        #[arg(short, long)]
        date: String,

        /// Username of the first event admin
        #[arg(short, long)]
        admin: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "")]
        location: String,

        /// 0 means unlimited
        #[arg(long, default_value_t = 0)]
        capacity: i64,

        #[arg(long)]
        max_qr_codes: Option<i64>,

        #[arg(long)]
        max_codes_per_user: Option<i64>,

        #[arg(long)]
        private: bool,
    },

    /// Add an admin to an event
    AddAdmin {
        #[arg(short, long)]
        event: i64,

        #[arg(short, long)]
        username: String,
    },
}

fn get_password(prompt: &str) -> anyhow::Result<String> {
    use std::io::{self, Write};
    print!("{}: ", prompt);
    io::stdout().flush()?;

    Ok(rpassword::read_password()?)
}

fn confirm_password(prompt: &str) -> anyhow::Result<(String, String)> {
    let password = get_password(prompt)?;
    let confirm = get_password("Confirm password")?;
    Ok((password, confirm))
}

struct Services {
    users: UserService,
    events: EventService,
    event_repository: Arc<SqliteEventRepository>,
}

async fn connect() -> anyhow::Result<Services> {
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set for this command")?;
    let pool = db::create_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let user_repository = Arc::new(SqliteUserRepository::new(pool.clone()));
    let event_repository = Arc::new(SqliteEventRepository::new(pool.clone()));
    let registration_repository = Arc::new(SqliteRegistrationRepository::new(pool));

    Ok(Services {
        users: UserService::new(user_repository.clone()),
        events: EventService::new(
            event_repository.clone(),
            user_repository,
            registration_repository,
        ),
        event_repository,
    })
}

async fn require_user(users: &UserService, username: &str) -> anyhow::Result<User> {
    users
        .find_user_by_username(username)
        .await?
        .ok_or_else(|| anyhow!("User '{}' not found", username))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evento=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::User { command } => run_user(command).await,
        Commands::Event { command } => run_event(command).await,
        Commands::Scan {
            code,
            event,
            username,
            credentials,
        } => run_scan(&code, event, username, credentials).await,
    }
}

async fn run_user(command: UserCommands) -> anyhow::Result<()> {
    let services = connect().await?;
    let users = &services.users;

    match command {
        UserCommands::Create {
            username,
            email,
            password,
            verified,
            staff,
        } => {
            let (password, password_confirm) = match password {
                Some(pw) => (pw.clone(), pw),
                None => confirm_password("Password")?,
            };

            let user = users
                .create_user(CreateUserRequest {
                    username,
                    email,
                    phone: None,
                    password,
                    password_confirm: Some(password_confirm),
                    email_verified: verified,
                })
                .await
                .context("Failed to create user")?;

            if staff {
                users.set_staff(user.id, true).await?;
            }

            println!("✅ User created successfully!");
            println!("  ID: {}", user.id);
            println!("  Username: {}", user.username);
            println!("  Email: {}", user.email);
            println!("  Verified: {}", user.email_verified);
            println!("  Staff: {}", staff);
        }

        UserCommands::List { limit, offset } => {
            let list = users.list_users(limit, offset).await?;
            if list.is_empty() {
                println!("No users found.");
                return Ok(());
            }

            println!(
                "{:<5} {:<20} {:<32} {:<10} {:<6} {:<20}",
                "ID", "Username", "Email", "Verified", "Staff", "Created"
            );
            println!("{}", "-".repeat(96));
            for user in list {
                println!(
                    "{:<5} {:<20} {:<32} {:<10} {:<6} {:<20}",
                    user.id,
                    user.username,
                    user.email,
                    if user.email_verified { "Yes" } else { "No" },
                    if user.is_staff { "Yes" } else { "No" },
                    user.created_at.as_deref().unwrap_or("N/A")
                );
            }
        }

        UserCommands::Verify { username } => {
            let user = require_user(users, &username).await?;
            if user.email_verified {
                println!("ℹ️  User '{}' is already verified", username);
            } else {
                users.verify_user_email(user.id).await?;
                println!("✅ User '{}' email verified successfully!", username);
            }
        }

        UserCommands::MakeStaff { username, revoke } => {
            let user = require_user(users, &username).await?;
            users.set_staff(user.id, !revoke).await?;
            if revoke {
                println!("✅ Staff rights revoked from '{}'", username);
            } else {
                println!("✅ User '{}' is now staff", username);
            }
        }

        UserCommands::SetPassword { username, password } => {
            let user = require_user(users, &username).await?;
            let (new_password, password_confirm) = match password {
                Some(pw) => (pw.clone(), pw),
                None => confirm_password("New password")?,
            };

            users
                .update_password(UpdatePasswordRequest {
                    user_id: user.id,
                    new_password,
                    new_password_confirm: Some(password_confirm),
                })
                .await
                .context("Failed to update password")?;
            println!("✅ Password updated successfully for '{}'!", username);
        }
    }

    Ok(())
}

async fn run_event(command: EventCommands) -> anyhow::Result<()> {
    let services = connect().await?;

    match command {
        EventCommands::Create {
            name,
            date,
            admin,
            description,
            location,
            capacity,
            max_qr_codes,
            max_codes_per_user,
            private,
        } => {
            let creator = require_user(&services.users, &admin).await?;
            let event = services
                .events
                .create(
                    &creator,
                    CreateEventRequest {
                        name,
                        description,
                        date,
                        location,
                        capacity,
                        max_qr_codes,
                        max_codes_per_user,
                        is_public: !private,
                    },
                )
                .await
                .context("Failed to create event")?;

            println!("✅ Event created successfully!");
            println!("  ID: {}", event.id);
            println!("  Name: {}", event.name);
            println!("  Date: {}", event.date);
            println!("  Public: {}", event.is_public);
        }

        EventCommands::AddAdmin { event, username } => {
            let user = require_user(&services.users, &username).await?;
            let found = services
                .event_repository
                .find_by_id(event)
                .await?
                .ok_or_else(|| anyhow!("Event {} not found", event))?;
            services.event_repository.add_admin(found.id, user.id).await?;
            println!("✅ '{}' is now an admin of '{}'", username, found.name);
        }
    }

    Ok(())
}

async fn run_scan(
    code: &str,
    event: Option<i64>,
    username: Option<String>,
    credentials: Option<String>,
) -> anyhow::Result<()> {
    let path = credentials
        .or_else(|| std::env::var("EVENTO_CREDENTIALS").ok())
        .unwrap_or_else(|| DEFAULT_CREDENTIALS_PATH.to_string());
    let store = Arc::new(FileCredentialStore::new(path));
    let client = ApiClient::new(ClientConfig::from_env(), store)?;

    if let Some(username) = username {
        let password = get_password("Password")?;
        client.login(&username, &password).await?;
    } else if !client.is_authenticated().await {
        bail!("Not logged in; pass --username to log in first");
    }

    let scanner = EntryScanner::new(client);
    match scanner.scan(code, event).await? {
        EntryOutcome::Accepted(details) => {
            println!("✅ Entry granted");
            println!("  Attendee: {}", details.holder);
            println!("  Event: {}", details.event_name);
            println!("  Used at: {}", details.used_at);
        }
        EntryOutcome::AlreadyUsed(details) => {
            println!("⚠️  Code already used");
            println!("  Attendee: {}", details.holder);
            println!("  Event: {}", details.event_name);
            println!("  Used at: {}", details.used_at);
            std::process::exit(2);
        }
        EntryOutcome::Denied(reason) => {
            eprintln!("❌ {}", reason.message());
            std::process::exit(1);
        }
    }

    Ok(())
}
