//! clinicdesk - command-line front end for the doctor dashboard.
//!
//! Logs in against the clinic backend, keeps the session tokens on disk (or
//! in the OS keychain), and runs authenticated queries through the same
//! session pipeline the dashboard uses.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clinicdesk_core::api::{ApiClient, HttpAuthApi};
use clinicdesk_core::auth::{token_expiry, Navigator, SessionManager, SessionStore};
use clinicdesk_core::models::AppointmentsParams;
use clinicdesk_core::Config;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "clinicdesk.log";

const USAGE: &str = "\
Usage: clinicdesk <command>

Commands:
  login [email]              Log in and store the session
  status                     Show whether the stored session is usable
  whoami                     Show the logged-in email and role
  refresh                    Exchange the refresh token for a new access token
  logout                     End the session here and on the server
  appointments [page]        List your appointments
  availability <YYYY-MM-DD>  List your open slots for a day";

/// Tells the user where to go once the session is gone
struct LoginPrompt;

impl Navigator for LoginPrompt {
    fn redirect_to_login(&self) {
        eprintln!("Session ended. Run `clinicdesk login` to sign in again.");
    }
}

/// Initialize the tracing subscriber for logging.
///
/// Stderr gets `warn` and above unless RUST_LOG says otherwise; the daily log
/// file in the cache directory gets the same filter.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    match config.cache_dir() {
        Ok(log_dir) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .init();
            None
        }
    }
}

/// Wire the session manager and API client from config.
fn build_clients(config: &Config) -> Result<(SessionManager, ApiClient)> {
    let storage = config
        .storage
        .open(&config.data_dir()?)
        .context("Failed to open token storage")?;
    let auth_api = HttpAuthApi::new(config.api_base_url.clone(), config.request_timeout())?;
    let session = SessionManager::new(
        SessionStore::new(storage),
        Arc::new(auth_api),
        Arc::new(LoginPrompt),
    );
    let api = ApiClient::new(
        config.api_base_url.clone(),
        config.request_timeout(),
        session.clone(),
    )?;
    Ok((session, api))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    let _log_guard = init_tracing(&config);
    info!(api = %config.api_base_url, storage = ?config.storage, "clinicdesk starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let (session, api) = build_clients(&config)?;
    session.initialize().await;

    match command.as_str() {
        "login" => login(&session, &mut config, args.get(1).cloned()).await,
        "status" => status(&session).await,
        "whoami" => whoami(&session),
        "refresh" => refresh(&session).await,
        "logout" => {
            session.logout().await;
            Ok(())
        }
        "appointments" => appointments(&api, args.get(1)).await,
        "availability" => availability(&api, args.get(1)).await,
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

async fn login(session: &SessionManager, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => {
            print!("Email: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line.trim().to_string()
        }
    };
    if email.is_empty() {
        bail!("An email address is required");
    }

    let password = rpassword::prompt_password(format!("Password for {}: ", email))?;
    let tokens = session.login(&email, &password).await?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        debug!(error = %e, "Failed to save config");
    }

    println!("Logged in as {} ({})", tokens.email, tokens.role);
    Ok(())
}

async fn status(session: &SessionManager) -> Result<()> {
    println!("Session:   {}", session.state());
    println!("Logged in: {}", if session.is_logged_in().await { "yes" } else { "no" });

    let now = Utc::now();
    let describe = |token: Option<String>| match token.as_deref().map(token_expiry) {
        None => "none".to_string(),
        Some(None) => "unreadable".to_string(),
        Some(Some(expiry)) if expiry <= now => {
            format!("expired {}", expiry.format("%Y-%m-%d %H:%M UTC"))
        }
        Some(Some(expiry)) => format!(
            "valid for {}m (until {})",
            (expiry - now).num_minutes(),
            expiry.format("%Y-%m-%d %H:%M UTC")
        ),
    };
    println!("Access:    {}", describe(session.current_access_token()));
    println!("Refresh:   {}", describe(session.current_refresh_token()));
    Ok(())
}

fn whoami(session: &SessionManager) -> Result<()> {
    let info = session.user_info();
    match (info.email, info.role) {
        (Some(email), Some(role)) => println!("{} ({})", email, role),
        _ => println!("Not logged in"),
    }
    Ok(())
}

async fn refresh(session: &SessionManager) -> Result<()> {
    match session.force_refresh().await {
        Some(_) => {
            println!("Access token refreshed");
            Ok(())
        }
        None => bail!("Token refresh failed"),
    }
}

async fn appointments(api: &ApiClient, page: Option<&String>) -> Result<()> {
    let page = match page {
        Some(page) => page.parse().context("Page must be a number")?,
        None => 0,
    };
    let params = AppointmentsParams {
        page,
        ..Default::default()
    };
    let response = api.fetch_appointments(&params).await?;

    if response.appointments.is_empty() {
        println!("No appointments");
    }
    for appt in &response.appointments {
        println!(
            "{}  {}  {:<10}  {}",
            appt.start_time,
            appt.end_time,
            appt.status.to_string(),
            appt.patient_name
        );
    }
    let p = &response.pagination;
    println!(
        "Page {} of {} ({} total)",
        p.current_page.saturating_add(1),
        p.total_pages.max(1),
        response.total_count
    );
    Ok(())
}

async fn availability(api: &ApiClient, date: Option<&String>) -> Result<()> {
    let Some(date) = date else {
        bail!("Usage: clinicdesk availability <YYYY-MM-DD>");
    };
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").context("Date must be YYYY-MM-DD")?;
    let slots = api.fetch_availability(date).await?;

    if slots.is_empty() {
        println!("No slots on {}", date);
    }
    for slot in &slots {
        println!(
            "{} - {}  ({} min)",
            slot.start_time.format("%H:%M"),
            slot.end_time.format("%H:%M"),
            slot.duration_minutes()
        );
    }
    Ok(())
}
