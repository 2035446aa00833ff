//! CLI module for the kintai command-line interface.
//!
//! Provides subcommands for working with the attendance backend:
//! - `login` / `logout` / `whoami` - Manage the stored session
//! - `requests ...` - List, show, create, submit and cancel requests
//! - `approvals` / `approve` / `reject` / `return` - Work the approval queue
//! - `export ...` - Download request exports and PDFs
//! - `admin ...` / `notifications ...` - Admin dashboard operations
//! - `config check` - Validate configuration file

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, ExportFormat};
use crate::auth::CliNavigator;
use crate::config::Config;
use crate::models::{
    ExportFilters, NotificationSettings, PeriodFilter, Request, RequestPayload, RequestStatus,
    RequestType, UserStatus,
};
use crate::session::FileSessionStore;
use crate::workflow::Decision;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "kintai")]
#[command(author, version, about = "Attendance and expense-approval client", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "kintai.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// API URL to connect to (overrides the configuration file)
    #[arg(long, env = "KINTAI_API_URL")]
    pub api_url: Option<String>,

    /// Session file (overrides the configuration file)
    #[arg(long, env = "KINTAI_SESSION")]
    pub session: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and store the session
    Login {
        #[arg(short, long)]
        email: String,
        /// Password (can also be set via KINTAI_PASSWORD env var)
        #[arg(short, long, env = "KINTAI_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log out and clear the stored session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Request commands
    #[command(subcommand)]
    Requests(RequestsCommands),

    /// List requests waiting for your decision
    Approvals,

    /// Approve an applied request
    Approve {
        id: String,
        #[arg(short, long)]
        comment: Option<String>,
        /// Date the advance payment was handed over (YYYY-MM-DD)
        #[arg(long)]
        received_date: Option<NaiveDate>,
    },

    /// Reject an applied request
    Reject {
        id: String,
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Return an applied request to the applicant
    Return {
        id: String,
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Export commands
    #[command(subcommand)]
    Export(ExportCommands),

    /// Admin commands
    #[command(subcommand)]
    Admin(AdminCommands),

    /// Daily-report reminder settings
    #[command(subcommand)]
    Notifications(NotificationCommands),

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Requests subcommands
#[derive(Subcommand, Debug)]
pub enum RequestsCommands {
    /// List requests
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "type")]
        request_type: Option<String>,
    },
    /// Show a request
    Show { id: String },
    /// Create a request from a JSON payload file (`{"kind": "leave", ...}`)
    Create {
        #[arg(long = "from")]
        file: PathBuf,
    },
    /// Submit a draft or returned request
    Submit { id: String },
    /// Cancel a request that is not yet final
    Cancel { id: String },
    /// Approved advance payments still waiting for settlement
    Advances,
}

/// Export subcommands
#[derive(Subcommand, Debug)]
pub enum ExportCommands {
    /// Export the request list
    Requests {
        #[arg(value_enum)]
        format: ExportFormat,
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "type")]
        request_type: Option<String>,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Summary PDF for a period
    Summary {
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// PDF of a single request
    Pdf {
        id: String,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

/// Admin subcommands
#[derive(Subcommand, Debug)]
pub enum AdminCommands {
    /// Dashboard counters
    Stats,
    /// List users
    Users,
    /// Show a user
    User { id: String },
    /// Change a user's status (active, inactive, suspended)
    SetStatus { id: String, status: String },
    /// Aggregated report for a period
    Report {
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
}

/// Notification subcommands
#[derive(Subcommand, Debug)]
pub enum NotificationCommands {
    /// Show reminder settings
    Get,
    /// Update reminder settings; omitted options keep their current value
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        /// HH:MM
        #[arg(long)]
        send_time: Option<String>,
        #[arg(long)]
        skip_weekends: Option<bool>,
        #[arg(long)]
        skip_holidays: Option<bool>,
    },
    /// Send the daily-report reminder now
    Remind,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

// ============================================================================
// CLI Command Handlers
// ============================================================================

/// Create an API client backed by the session file
fn create_client(cli: &Cli, config: &Config, cancel: CancellationToken) -> Result<ApiClient> {
    let session_path = match &cli.session {
        Some(path) => path.clone(),
        None => config
            .session
            .resolve_path()
            .context("Failed to locate session file")?,
    };

    let store = Arc::new(FileSessionStore::new(session_path));
    let client = ApiClient::new(
        config.client_config(cli.api_url.as_deref()),
        store,
        Arc::new(CliNavigator),
    )
    .context("Failed to create HTTP client")?;

    Ok(client.with_cancellation(cancel))
}

/// Run a CLI command
pub async fn run_command(cli: &Cli, config: &Config, cancel: CancellationToken) -> Result<()> {
    if let Commands::Config(ConfigCommands::Check) = &cli.command {
        return cmd_config_check(cli);
    }

    let client = create_client(cli, config, cancel)?;

    match &cli.command {
        Commands::Login { email, password } => cmd_login(&client, email, password).await,
        Commands::Logout => {
            client.logout().await;
            println!("Logged out.");
            Ok(())
        }
        Commands::Whoami => cmd_whoami(&client).await,
        Commands::Requests(RequestsCommands::List {
            status,
            request_type,
        }) => cmd_requests_list(&client, status.as_deref(), request_type.as_deref()).await,
        Commands::Requests(RequestsCommands::Show { id }) => cmd_requests_show(&client, id).await,
        Commands::Requests(RequestsCommands::Create { file }) => {
            cmd_requests_create(&client, file).await
        }
        Commands::Requests(RequestsCommands::Submit { id }) => {
            let request = client.get_request(id).await?;
            client.submit(&request).await?;
            println!("[OK] Request {} submitted.", id);
            Ok(())
        }
        Commands::Requests(RequestsCommands::Cancel { id }) => {
            let request = client.get_request(id).await?;
            client.cancel(&request).await?;
            println!("[OK] Request {} cancelled.", id);
            Ok(())
        }
        Commands::Requests(RequestsCommands::Advances) => {
            let advances = client.settleable_advances().await?;
            print_requests(&advances);
            Ok(())
        }
        Commands::Approvals => {
            let queue = client.get_approval_requests().await?;
            print_requests(&queue);
            Ok(())
        }
        Commands::Approve {
            id,
            comment,
            received_date,
        } => {
            let decision = Decision::Approve {
                comment: comment.clone(),
                received_date: *received_date,
            };
            cmd_decide(&client, id, decision).await
        }
        Commands::Reject { id, comment } => {
            let decision = Decision::Reject {
                comment: comment.clone(),
            };
            cmd_decide(&client, id, decision).await
        }
        Commands::Return { id, comment } => {
            let decision = Decision::Return {
                comment: comment.clone(),
            };
            cmd_decide(&client, id, decision).await
        }
        Commands::Export(command) => cmd_export(&client, command).await,
        Commands::Admin(command) => cmd_admin(&client, command).await,
        Commands::Notifications(command) => cmd_notifications(&client, command).await,
        Commands::Config(ConfigCommands::Check) => Ok(()),
    }
}

async fn cmd_login(client: &ApiClient, email: &str, password: &str) -> Result<()> {
    let session = client.login(email, password).await?;

    println!("[OK] Logged in as {} ({})", session.user.display_name(), session.user.role);
    Ok(())
}

async fn cmd_whoami(client: &ApiClient) -> Result<()> {
    if client.session().is_none() {
        println!("Not logged in. Use 'kintai login' to sign in.");
        return Ok(());
    }

    let user = client.current_user().await?;

    println!();
    println!("Name:        {}", user.display_name());
    println!("Email:       {}", user.email);
    println!("Role:        {}", user.role);
    println!("Department:  {}", user.department.as_deref().unwrap_or("-"));
    println!("Position:    {}", user.position.as_deref().unwrap_or("-"));
    if let Some(employee_id) = &user.employee_id {
        println!("Employee ID: {}", employee_id);
    }
    println!();
    Ok(())
}

/// List requests
async fn cmd_requests_list(
    client: &ApiClient,
    status: Option<&str>,
    request_type: Option<&str>,
) -> Result<()> {
    let status = status.map(parse_status).transpose()?;
    let request_type = request_type.map(parse_type).transpose()?;

    let requests: Vec<Request> = client
        .get_requests()
        .await?
        .into_iter()
        .filter(|r| status.map_or(true, |s| r.status == s))
        .filter(|r| request_type.map_or(true, |t| r.request_type == t))
        .collect();

    print_requests(&requests);
    Ok(())
}

/// Show details for a specific request
async fn cmd_requests_show(client: &ApiClient, id: &str) -> Result<()> {
    let request = client.get_request(id).await?;

    println!();
    println!("=== Request: {} ===", request.display_title());
    println!();
    println!("ID:          {}", request.id);
    println!("Type:        {} ({})", request.request_type.label(), request.request_type);
    println!("Status:      {} ({})", request.status.label(), request.status);
    println!(
        "Applicant:   {}",
        request
            .applicant_name
            .as_deref()
            .or(request.applicant_id.as_deref())
            .unwrap_or("-")
    );
    if let Some(amount) = request.amount() {
        println!("Amount:      ¥{}", amount);
    }
    if request.is_advance_payment() {
        println!("Settled:     {}", if request.is_settled() { "Yes" } else { "No" });
    }
    println!("Applied:     {}", request.applied_at.as_deref().unwrap_or("-"));
    println!("Created:     {}", request.created_at.as_deref().unwrap_or("-"));
    if let Some(approved_at) = &request.approved_at {
        println!("Approved:    {}", approved_at);
    }
    if let Some(description) = request.description.as_deref().filter(|d| !d.is_empty()) {
        println!();
        println!("{}", description);
    }
    println!();

    Ok(())
}

async fn cmd_requests_create(client: &ApiClient, file: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read payload file: {}", file.display()))?;
    let payload: RequestPayload =
        serde_json::from_str(&content).with_context(|| "Failed to parse payload file")?;

    let ack = client.create_request(&payload).await?;

    println!("[OK] {} request created.", payload.request_type().label());
    if let Some(id) = ack.extra.get("id").or_else(|| ack.extra.get("request_id")) {
        println!("Request ID: {}", id);
    }
    Ok(())
}

async fn cmd_decide(client: &ApiClient, id: &str, decision: Decision) -> Result<()> {
    let request = client.get_request(id).await?;
    let next = decision.next_status();

    client.decide(&request, decision).await?;

    println!("[OK] {} -> {}", request.display_title(), next.label());
    Ok(())
}

async fn cmd_export(client: &ApiClient, command: &ExportCommands) -> Result<()> {
    let (download, out) = match command {
        ExportCommands::Requests {
            format,
            status,
            request_type,
            start_date,
            end_date,
            out,
        } => {
            let filters = ExportFilters {
                status: status.as_deref().map(parse_status).transpose()?,
                request_type: request_type.as_deref().map(parse_type).transpose()?,
                period: PeriodFilter {
                    start_date: *start_date,
                    end_date: *end_date,
                },
            };
            (client.export_requests(*format, &filters).await?, out)
        }
        ExportCommands::Summary {
            start_date,
            end_date,
            out,
        } => {
            let period = PeriodFilter {
                start_date: *start_date,
                end_date: *end_date,
            };
            (client.export_summary_pdf(&period).await?, out)
        }
        ExportCommands::Pdf { id, out } => (client.request_pdf(id).await?, out),
    };

    let path = download
        .save_in(out)
        .with_context(|| format!("Failed to write into {}", out.display()))?;
    println!("[OK] Saved {} ({})", path.display(), format_bytes(download.bytes.len() as u64));
    Ok(())
}

async fn cmd_admin(client: &ApiClient, command: &AdminCommands) -> Result<()> {
    match command {
        AdminCommands::Stats => {
            let stats = client.get_admin_stats().await?;

            println!();
            println!("=== Dashboard ===");
            println!();
            println!("Requests:");
            println!("  Total:      {}", stats.total_requests);
            println!("  Pending:    {}", stats.pending_requests);
            println!("  Approved:   {}", stats.approved_requests);
            println!("  Rejected:   {}", stats.rejected_requests);
            println!();
            println!("Users:        {}/{} active", stats.active_users, stats.total_users);
            println!();
        }
        AdminCommands::Users => {
            let users = client.get_users().await?;
            if users.is_empty() {
                println!("No users found.");
                return Ok(());
            }

            println!();
            println!(
                "{:<36}  {:<16}  {:<28}  {:<10}  {:<10}",
                "ID", "NAME", "EMAIL", "ROLE", "STATUS"
            );
            println!("{}", "-".repeat(108));
            for user in users {
                println!(
                    "{:<36}  {:<16}  {:<28}  {:<10}  {:<10}",
                    user.id,
                    truncate(&user.name, 16),
                    truncate(&user.email, 28),
                    user.role.to_string(),
                    user.status_label()
                );
            }
            println!();
        }
        AdminCommands::User { id } => {
            let user = client.get_user(id).await?;

            println!();
            println!("ID:          {}", user.id);
            println!("Name:        {}", user.name);
            println!("Email:       {}", user.email);
            println!("Role:        {}", user.role);
            println!("Department:  {}", user.department.as_deref().unwrap_or("-"));
            println!("Status:      {}", user.status_label());
            println!("Last login:  {}", user.last_login.as_deref().unwrap_or("-"));
            println!();
        }
        AdminCommands::SetStatus { id, status } => {
            let status: UserStatus = status.parse().map_err(anyhow::Error::msg)?;
            client.update_user_status(id, status).await?;
            println!("[OK] User {} is now {}.", id, status);
        }
        AdminCommands::Report {
            start_date,
            end_date,
        } => {
            let period = PeriodFilter {
                start_date: *start_date,
                end_date: *end_date,
            };
            let report = client.get_summary_report(&period).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn cmd_notifications(client: &ApiClient, command: &NotificationCommands) -> Result<()> {
    match command {
        NotificationCommands::Get => {
            let settings = client.get_notification_settings().await?;
            print_notification_settings(&settings);
        }
        NotificationCommands::Set {
            enabled,
            send_time,
            skip_weekends,
            skip_holidays,
        } => {
            let mut settings = client.get_notification_settings().await?;
            if let Some(enabled) = enabled {
                settings.enabled = *enabled;
            }
            if let Some(send_time) = send_time {
                settings.send_time = send_time.clone();
            }
            if let Some(skip_weekends) = skip_weekends {
                settings.skip_weekends = *skip_weekends;
            }
            if let Some(skip_holidays) = skip_holidays {
                settings.skip_holidays = *skip_holidays;
            }

            client.update_notification_settings(&settings).await?;
            println!("[OK] Notification settings updated.");
            print_notification_settings(&settings);
        }
        NotificationCommands::Remind => {
            client.send_daily_report_reminder().await?;
            println!("[OK] Daily report reminder sent.");
        }
    }
    Ok(())
}

fn print_notification_settings(settings: &NotificationSettings) {
    println!();
    println!("Enabled:        {}", yes_no(settings.enabled));
    println!("Send time:      {}", settings.send_time);
    println!("Skip weekends:  {}", yes_no(settings.skip_weekends));
    println!("Skip holidays:  {}", yes_no(settings.skip_holidays));
    println!();
}

/// Validate configuration file
fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!("[!!] Configuration file not found: {}", config_path.display());
        println!();
        println!("Defaults will be used.");
        return Ok(());
    }

    match Config::load(config_path) {
        Ok(config) => {
            println!("[OK] Configuration file is valid!");
            println!();
            println!("=== Configuration Summary ===");
            println!();
            println!("API:");
            println!("  Base URL:     {}", config.api.base_url);
            println!("  Timeout:      {}s", config.api.timeout_secs);
            println!();
            println!("Retry:");
            println!("  Attempts:     {}", config.retry.max_attempts);
            println!("  Base delay:   {}ms", config.retry.base_delay_ms);
            println!();
            println!("Session:");
            match config.session.resolve_path() {
                Ok(path) => println!("  File:         {}", path.display()),
                Err(e) => println!("  File:         [!!] {}", e),
            }
            println!();
            println!("Logging:");
            println!("  Level:        {}", config.logging.level);
            println!();

            let mut warnings = Vec::new();
            if config.api.base_url.starts_with("http://")
                && !config.api.base_url.contains("localhost")
                && !config.api.base_url.contains("127.0.0.1")
            {
                warnings.push("API URL is not HTTPS - tokens will be sent in plaintext");
            }
            if config.retry.max_attempts == 0 {
                warnings.push("retry.max_attempts is 0 - reads will be attempted once");
            }

            if !warnings.is_empty() {
                println!("Warnings:");
                for warning in warnings {
                    println!("  [!] {}", warning);
                }
                println!();
            }

            Ok(())
        }
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {:#}", e);
            println!();
            anyhow::bail!("Invalid configuration file");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_status(value: &str) -> Result<RequestStatus> {
    match serde_json::from_value(serde_json::Value::String(value.to_string()))? {
        RequestStatus::Unknown => anyhow::bail!("Unknown status: {}", value),
        status => Ok(status),
    }
}

fn parse_type(value: &str) -> Result<RequestType> {
    match serde_json::from_value(serde_json::Value::String(value.to_string()))? {
        RequestType::Unknown => anyhow::bail!("Unknown request type: {}", value),
        kind => Ok(kind),
    }
}

fn print_requests(requests: &[Request]) {
    if requests.is_empty() {
        println!("No requests found.");
        return;
    }

    println!();
    println!(
        "{:<36}  {:<10}  {:<8}  {:<30}  {:<12}  {:<10}",
        "ID", "TYPE", "STATUS", "TITLE", "APPLICANT", "APPLIED"
    );
    println!("{}", "-".repeat(118));

    for request in requests {
        let applied = request
            .applied_at
            .as_deref()
            .or(request.created_at.as_deref())
            .map(|d| truncate(d, 10))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<36}  {:<10}  {:<8}  {:<30}  {:<12}  {:<10}",
            request.id,
            request.request_type.label(),
            request.status.label(),
            truncate(request.display_title(), 30),
            truncate(request.applicant_name.as_deref().unwrap_or("-"), 12),
            applied
        );
    }

    println!();
    println!("{} request(s)", requests.len());
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// Format bytes to human-readable string
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Truncate to `max_len` characters with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
