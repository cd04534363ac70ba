use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rentfeed::api::HttpTransport;
use rentfeed::config::Config;
use rentfeed::feed::{MutationKind, NotificationId};
use rentfeed::push::PushPayload;
use rentfeed::session::GateState;
use rentfeed::store::{FeedEvent, FeedView, NotificationStore, Route, StoreSettings};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

type Store = NotificationStore<HttpTransport>;

/// Get the config directory path (~/.config/rentfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("rentfeed"))
}

#[derive(Parser, Debug)]
#[command(name = "rentfeed", about = "Notification feed for your rental bookings")]
struct Args {
    /// Config file (default: ~/.config/rentfeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show one page of notifications
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Print the unread count
    Unread,
    /// Mark notifications as read
    MarkRead {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Mark notifications as unread
    MarkUnread {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete notifications
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Open the booking behind a notification (marks it read first)
    Open {
        id: String,
        /// Page the notification is on
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Handle a push payload, e.g. '{"bookingId":"b1","userId":"u1","notificationId":"n1"}'
    Push { payload: String },
    /// Send the account validation email again
    ResendValidation,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Env var takes precedence over the config file.
    let token = std::env::var("RENTFEED_TOKEN")
        .ok()
        .or_else(|| config.auth_token.clone())
        .map(SecretString::from);

    let transport =
        Arc::new(HttpTransport::new(&config, token).context("Failed to create HTTP client")?);
    let (tx, mut rx) = mpsc::channel::<FeedEvent>(64);
    let mut store = NotificationStore::new(transport, StoreSettings::from(&config), tx);

    store.focus();
    store.settle(&mut rx).await;

    let gate = store.gate_state().clone();
    match gate {
        GateState::Active { .. } => {}
        GateState::Unverified => {
            if matches!(args.command, Command::ResendValidation) {
                store.resend_validation()?;
                store.settle(&mut rx).await;
                report_notice(&store);
                return Ok(());
            }
            anyhow::bail!(
                "Your account is not verified yet. Run `rentfeed resend-validation` to get a new email."
            );
        }
        GateState::Blacklisted => anyhow::bail!("This account has been blocked"),
        GateState::Unauthenticated | GateState::Loading => {
            anyhow::bail!("Not signed in. Set RENTFEED_TOKEN or auth_token in the config file.")
        }
    }

    run(&mut store, &mut rx, args.command).await?;
    store.unmount();
    Ok(())
}

async fn run(store: &mut Store, rx: &mut mpsc::Receiver<FeedEvent>, command: Command) -> Result<()> {
    match command {
        Command::List { page } => {
            if page != 1 {
                store.load_page(page)?;
                store.settle(rx).await;
            }
            check_failures(store)?;
            print_page(&store.view());
        }
        Command::Unread => {
            check_failures(store)?;
            println!("{}", store.unread_count());
        }
        Command::MarkRead { ids } => {
            store.mark_read(ids.into_iter().map(NotificationId::from))?;
            finish_mutation(store, rx, MutationKind::MarkRead).await?;
        }
        Command::MarkUnread { ids } => {
            store.mark_unread(ids.into_iter().map(NotificationId::from))?;
            finish_mutation(store, rx, MutationKind::MarkUnread).await?;
        }
        Command::Delete { ids } => {
            store.delete(ids.into_iter().map(NotificationId::from))?;
            finish_mutation(store, rx, MutationKind::Delete).await?;
        }
        Command::Open { id, page } => {
            if page != 1 {
                store.load_page(page)?;
                store.settle(rx).await;
            }
            check_failures(store)?;
            store.open(&NotificationId::from(id))?;
            store.settle(rx).await;
            report_notice(store);
            report_route(store)?;
        }
        Command::Push { payload } => {
            let payload = PushPayload::from_json(&payload).context("Invalid push payload")?;
            store.handle_push(&payload);
            store.settle(rx).await;
            report_notice(store);
            report_route(store)?;
        }
        Command::ResendValidation => {
            println!("Account is already verified");
        }
    }
    Ok(())
}

async fn finish_mutation(
    store: &mut Store,
    rx: &mut mpsc::Receiver<FeedEvent>,
    kind: MutationKind,
) -> Result<()> {
    store.settle(rx).await;
    check_failures(store)?;
    println!("Done: {}. Unread: {}", kind.verb(), store.unread_count());
    Ok(())
}

fn check_failures(store: &mut Store) -> Result<()> {
    if store.take_route() == Some(Route::SignIn) {
        anyhow::bail!("Session expired, please sign in again");
    }
    if let Some(notice) = store.notice() {
        anyhow::bail!("{}", notice.message);
    }
    Ok(())
}

fn report_notice(store: &Store) {
    if let Some(notice) = store.notice() {
        eprintln!("{}", notice.message);
    }
}

fn report_route(store: &mut Store) -> Result<()> {
    match store.take_route() {
        Some(Route::Booking(booking)) => println!("Opening booking {}", booking),
        Some(Route::Feed) => println!("Opening notifications"),
        Some(Route::SignIn) => anyhow::bail!("Session expired, please sign in again"),
        None => {}
    }
    Ok(())
}

fn print_page(view: &FeedView) {
    let Some(range) = view.range else {
        println!("No notifications");
        return;
    };
    if view.rows.is_empty() {
        println!("No notifications");
        return;
    }

    for row in &view.rows {
        let n = &row.notification;
        let marker = if n.read { ' ' } else { '*' };
        let booking = n
            .booking_id
            .as_ref()
            .map(|b| format!("  (booking {})", b))
            .unwrap_or_default();
        println!(
            "{} {:<12} {}  {}{}",
            marker,
            n.id.as_str(),
            n.created_at.format("%Y-%m-%d %H:%M"),
            n.message,
            booking
        );
    }
    println!(
        "{}-{} of {}   unread: {}",
        range.lower_bound,
        range.row_count,
        range.total_records,
        view.unread_count
    );
}
