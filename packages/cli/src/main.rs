use std::path::PathBuf;
use std::sync::Arc;

use api::{BackendConfig, HttpBackend, SessionFile};
use clap::{Parser, Subcommand, ValueEnum};
use store::{Calendar, DaybookConfig, RecordKind};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use ui::{
    ActivityLog, AppContext, DailyRecordService, HistoryNavigator, LogLevel, SessionService,
    SignUpOutcome,
};

mod settings;

#[derive(Debug, Parser)]
#[command(name = "daybook")]
#[command(about = "Write today's journal entry and book review")]
struct Args {
    /// Config file (defaults to ./daybook.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Email a password-reset link
    ResetPassword {
        #[arg(long)]
        email: String,
    },
    /// Change the password of the signed-in user
    UpdatePassword {
        #[arg(long)]
        password: String,
    },
    /// Show the signed-in user
    Whoami,
    /// Show today's record
    Today { kind: Kind },
    /// Create or replace today's record
    Write { kind: Kind, text: String },
    /// List recent records, newest first
    History {
        kind: Kind,
        /// Number of days (defaults to history.recent_limit)
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Journal,
    Review,
}

impl From<Kind> for RecordKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Journal => RecordKind::JournalEntry,
            Kind::Review => RecordKind::BookReview,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let settings = settings::load(args.config.as_deref())?;
    let backend_config = if settings.backend.url.is_empty() {
        BackendConfig::from_env()?
    } else {
        BackendConfig::from_daybook(&settings)?
    };
    let session_file = SessionFile::default_location();
    debug!(session_file = %session_file.path().display(), "Using session file");
    let backend = Arc::new(HttpBackend::new(backend_config)?.with_session_file(session_file));

    // One-shot commands load records explicitly rather than following the session.
    let log = ActivityLog::new();
    let calendar = Calendar::system(settings.days.policy);
    let session = SessionService::new(
        backend.clone(),
        log.clone(),
        Arc::new(HistoryNavigator::new()),
        &settings,
    );
    let ctx = AppContext::new(log.clone())
        .provide_session(session)
        .provide_records(DailyRecordService::journal(backend.clone(), log.clone(), calendar.clone()))
        .provide_records(DailyRecordService::book_reviews(backend, log, calendar));
    ctx.start().await;

    let ok = run(&ctx, &settings, args.command).await;
    ctx.session().shutdown();

    for entry in ctx.activity_log().drain() {
        let marker = match entry.level {
            LogLevel::Info => "·",
            LogLevel::Success => "✓",
            LogLevel::Warning => "!",
            LogLevel::Error => "✗",
        };
        eprintln!("{} {}", marker, entry.message);
    }

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(ctx: &AppContext<HttpBackend>, settings: &DaybookConfig, command: Command) -> bool {
    let session = ctx.session();
    match command {
        Command::Login { email, password } => session.login(&email, &password).await,
        Command::Signup {
            name,
            email,
            password,
            phone,
        } => match session.signup(&name, &email, &password, phone.as_deref()).await {
            Some(SignUpOutcome::SignedIn(identity)) => {
                println!("Signed in as {} <{}>", identity.name, identity.email);
                true
            }
            Some(SignUpOutcome::ConfirmationRequired(identity)) => {
                println!("Confirm {} before signing in", identity.email);
                true
            }
            None => false,
        },
        Command::Logout => session.logout().await,
        Command::ResetPassword { email } => session.reset_password(&email).await,
        Command::UpdatePassword { password } => session.update_password(&password).await,
        Command::Whoami => match session.identity() {
            Some(identity) => {
                println!("{} <{}>", identity.name, identity.email);
                if let Some(phone) = identity.phone {
                    println!("phone: {}", phone);
                }
                true
            }
            None => {
                println!("Not signed in");
                session.state().error.is_none()
            }
        },
        Command::Today { kind } => {
            let records = ctx.records(kind.into());
            records.identity_changed(session.identity()).await;
            let state = records.state();
            match &state.record {
                Some(record) => println!("{}\n{}", record.date, record.text),
                None if records.identity().is_some() => println!("Nothing written today"),
                None => println!("Not signed in"),
            }
            state.error.is_none() && records.identity().is_some()
        }
        Command::Write { kind, text } => {
            let records = ctx.records(kind.into());
            records.identity_changed(session.identity()).await;
            match records.save_for_today(&text).await {
                Ok(Some(record)) => {
                    println!("{}\n{}", record.date, record.text);
                    true
                }
                Ok(None) | Err(_) => false,
            }
        }
        Command::History { kind, limit } => {
            let records = ctx.records(kind.into());
            records.identity_changed(session.identity()).await;
            if records.identity().is_none() {
                println!("Not signed in");
                return false;
            }
            let limit = limit.unwrap_or(settings.history.recent_limit);
            for record in records.recent(limit).await {
                println!("{}  {}", record.date, record.text);
            }
            true
        }
    }
}
