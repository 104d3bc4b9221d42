use anyhow::{Context, bail};
use chatcore::events::{CoreEventBus, Event, EventHandler};
use chatcore::net::HttpClient;
use chrono::Local;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use whatsapp_graphql::guard::{Navigation, Route, navigate};
use whatsapp_graphql::live::LiveCache;
use whatsapp_graphql::service::RemoveTarget;
use whatsapp_graphql::session::SignUp;
use whatsapp_graphql::store::FileStore;
use whatsapp_graphql::subscriptions::SubscriptionManager;
use whatsapp_graphql::views::{render_chat, render_chat_list, render_users};
use whatsapp_graphql::{ChatService, Client, ClientConfig, LoginService, SessionManager};
use whatsapp_graphql_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_graphql_ureq_http_client::UreqHttpClient;

// Command-line chat client.
//
// Usage:
//   whatsapp-graphql login ethan 111
//   whatsapp-graphql chats
//   whatsapp-graphql send 2 "hello"
//   whatsapp-graphql watch
//   whatsapp-graphql --server https://chat.example.com users

#[derive(Parser)]
#[command(name = "whatsapp-graphql", version, about = "GraphQL chat client")]
struct Cli {
    /// Server base URL; the GraphQL, WebSocket and auth endpoints derive from it.
    #[arg(long, env = "CHAT_SERVER", default_value = "http://localhost:4000")]
    server: String,

    /// Directory holding the persisted session.
    #[arg(long, default_value = ".whatsapp-session")]
    store: PathBuf,

    /// Messages fetched per chat for the chat list.
    #[arg(long, default_value_t = 3)]
    amount: usize,

    /// Wait for the server before showing sent messages.
    #[arg(long)]
    no_optimistic: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Login {
        username: String,
        password: String,
    },
    Signup {
        username: String,
        password: String,
        #[arg(long)]
        confirm: String,
        #[arg(long)]
        name: String,
    },
    Logout,
    /// List chats, most recently active first.
    Chats,
    /// Show one chat's messages.
    Chat { id: String },
    Send { chat: String, text: String },
    /// Delete messages by id, or all of them.
    Remove {
        chat: String,
        #[arg(long, conflicts_with = "ids")]
        all: bool,
        ids: Vec<String>,
    },
    Users,
    /// Open (or reuse) a one-to-one chat.
    NewChat { user: String },
    NewGroup {
        #[arg(long)]
        name: String,
        #[arg(required = true)]
        users: Vec<String>,
    },
    DeleteChat { chat: String },
    /// Print the chat list as pushed updates arrive.
    Watch,
}

impl Command {
    /// Screen the command stands for, checked against the login guard.
    fn route(&self) -> Option<Route> {
        match self {
            Command::Login { .. } | Command::Signup { .. } => Some(Route::Login),
            Command::Logout => None,
            Command::Chats | Command::Watch => Some(Route::Chats),
            Command::Chat { id } => Some(Route::Chat(id.clone())),
            Command::Send { chat, .. }
            | Command::Remove { chat, .. }
            | Command::DeleteChat { chat } => Some(Route::Chat(chat.clone())),
            Command::Users | Command::NewChat { .. } => Some(Route::NewChat),
            Command::NewGroup { .. } => Some(Route::NewGroup),
        }
    }
}

struct LogEvents;

impl EventHandler for LogEvents {
    fn handle_event(&self, event: &Event) {
        match event {
            Event::LoggedIn(user) => info!("Logged in as {}", user.display_name()),
            Event::LoggedOut { reason } => warn!("Logged out: {reason:?}"),
            Event::UserAdded(user) => info!("New user: {}", user.display_name()),
            Event::MessageAdded(message) => info!(
                "New message in chat {} from {}",
                message.chat_id(),
                message.sender.display_name()
            ),
            Event::ChatAdded(chat) => info!("New chat {}", chat.id),
            Event::SubscriptionConnected => info!("Listening for updates"),
            Event::SubscriptionDisconnected => info!("Stopped listening for updates"),
        }
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    if let Err(e) = rt.block_on(run(cli)) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::for_server(&cli.server);
    config.store_path = cli.store;
    config.messages_amount = Some(cli.amount);
    config.optimistic_updates = !cli.no_optimistic;

    let store = FileStore::new(&config.store_path)
        .await
        .with_context(|| format!("opening session store {}", config.store_path.display()))?;
    let event_bus = CoreEventBus::new();
    event_bus.add_handler(Arc::new(LogEvents));
    let session = Arc::new(SessionManager::load(Arc::new(store), event_bus).await?);
    let http: Arc<dyn HttpClient> = Arc::new(UreqHttpClient::new());

    if let Some(route) = cli.command.route() {
        match navigate(&route.path(), &session) {
            Navigation::Render(_) => {}
            Navigation::Redirect(Route::Login) => bail!("Not logged in, run `login` first"),
            Navigation::Redirect(_) => {
                let who = session.user().map(|u| u.display_name().to_string());
                println!("Already logged in as {}", who.unwrap_or_default());
                return Ok(());
            }
        }
    }

    let login = LoginService::new(http.clone(), &config.auth_url, session.clone());
    let client = Arc::new(Client::with_session(http, &config.graphql_url, &session));
    let cache = Arc::new(LiveCache::new());
    let service = ChatService::new(client, session.clone(), cache.clone(), &config);

    match cli.command {
        Command::Login { username, password } => {
            login.sign_in(&username, &password).await?;
        }
        Command::Signup {
            username,
            password,
            confirm,
            name,
        } => {
            let form = SignUp {
                name,
                username,
                password,
                password_confirmation: confirm,
            };
            login.sign_up(&form).await?;
        }
        Command::Logout => login.logout().await?,
        Command::Chats => {
            let chats = service.get_chats().await?;
            print_lines(render_chat_list(&chats.current().unwrap_or_default()));
        }
        Command::Chat { id } => {
            let chat = service.get_chat(&id).await?;
            match chat.current() {
                Some(chat) => print_lines(render_chat(&chat)),
                None => bail!("Chat {id} not found"),
            }
        }
        Command::Send { chat, text } => {
            let message = service.add_message(&chat, &text).await?;
            println!("Sent message {}", message.id);
        }
        Command::Remove { chat, all, ids } => {
            let messages = service
                .get_chat(&chat)
                .await?
                .current()
                .map(|c| c.messages)
                .unwrap_or_default();
            let target = if all {
                RemoveTarget::All
            } else if ids.is_empty() {
                bail!("Give message ids to remove, or --all");
            } else {
                RemoveTarget::Ids(ids)
            };
            let removed = service.remove_messages(&chat, &messages, target).await?;
            println!("Removed {} messages", removed.len());
        }
        Command::Users => {
            let users = service.get_users().await?;
            print_lines(render_users(&users.current().unwrap_or_default()));
        }
        Command::NewChat { user } => {
            service.get_chats().await?;
            let chat_id = match service.get_chat_id(&user) {
                Some(existing) => existing,
                None => service.add_chat(&user).await?.id,
            };
            println!("Chat {chat_id}");
        }
        Command::NewGroup { name, users } => {
            let chat = service.add_group(&users, &name).await?;
            println!("Group {} created", chat.id);
        }
        Command::DeleteChat { chat } => {
            let removed = service.remove_chat(&chat).await?;
            println!("Deleted chat {removed}");
        }
        Command::Watch => {
            let manager = SubscriptionManager::new(
                Arc::new(TokioWebSocketTransportFactory::new()),
                &config.subscriptions_url,
                session.clone(),
                cache,
            );
            let mut chats = service.get_chats().await?;
            let handle = manager.start().await?;
            print_lines(render_chat_list(&chats.current().unwrap_or_default()));

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = handle.finished() => {
                        warn!("Subscription connection ended");
                        break;
                    }
                    changed = chats.changed() => match changed {
                        Ok(list) => {
                            println!();
                            print_lines(render_chat_list(&list.unwrap_or_default()));
                        }
                        Err(_) => break,
                    }
                }
            }
            handle.stop().await?;
        }
    }
    Ok(())
}
