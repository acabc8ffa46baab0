use std::sync::Arc;

use clap::{Parser, Subcommand};
use forum_client::api::{ForumApi, HttpApi};
use forum_client::config::{ClientConfig, DEFAULT_BASE_URL};
use forum_client::connection::WsConnector;
use forum_client::controller::{Controller, ControllerHandle};
use forum_client::error::ClientError;
use forum_client::state::Route;
use forum_client::types::{NewUser, User};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "forum-client", about = "Forum API and push-channel client")]
struct Cli {
    #[arg(long, env = "FORUM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "FORUM_SESSION_TOKEN")]
    session_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and print the session token for later `--session-token` use.
    Login {
        #[arg(long)]
        identifier: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and print its session token.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        age: i64,
        /// `M`, `F` or `Autre`.
        #[arg(long)]
        gender: String,
    },
    /// Restore the session and print state changes until interrupted.
    Listen,
    Posts,
    Categories,
    Comments {
        post_id: i64,
    },
    /// Print the conversation with a peer.
    Messages {
        peer_id: i64,
    },
    SendMessage {
        peer_id: i64,
        content: String,
    },
    CreatePost {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        category_id: i64,
    },
    Comment {
        post_id: i64,
        content: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()
        .with_base_url(&cli.base_url)
        .with_session_token(cli.session_token);

    let api = Arc::new(HttpApi::new(&config)?);
    let session = match &cli.command {
        Command::Login { identifier, password } => Some(api.login(identifier, password).await?),
        Command::Register { username, email, password, first_name, last_name, age, gender } => {
            let user = NewUser {
                username: username.clone(),
                age: *age,
                gender: gender.clone(),
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                email: email.clone(),
                password: password.clone(),
            };
            Some(api.register(&user).await?)
        }
        _ => None,
    };
    if let Some(session) = session {
        eprintln!("signed in as {}", session.user.username);
        println!("{}", session.token);
        return Ok(());
    }

    let (controller, client) = Controller::new(config, Arc::new(WsConnector), api.clone());
    let task = controller.spawn();

    let result = run(&client, api.as_ref(), cli.command).await;

    client.shutdown().await?;
    if let Err(e) = task.await {
        warn!(error = %e, "controller task failed");
    }
    result
}

async fn run(client: &ControllerHandle, api: &dyn ForumApi, command: Command) -> Result<(), ClientError> {
    if let Command::Posts = command {
        client.navigate(Route::Home).await?;
        return print_json(&client.view().posts);
    }
    if let Command::Categories = command {
        client.navigate(Route::Categories).await?;
        return print_json(&client.view().categories);
    }

    if !client.restore().await? {
        return Err(ClientError::NotAuthenticated);
    }

    match command {
        Command::Listen => listen(client).await,
        Command::Comments { post_id } => {
            open_post(client, api, post_id).await?;
            print_json(&client.view().comments)
        }
        Command::Messages { peer_id } => {
            open_conversation(client, peer_id).await?;
            print_json(&client.view().conversation)
        }
        Command::SendMessage { peer_id, content } => {
            open_conversation(client, peer_id).await?;
            client.send_private_message(&content).await
        }
        Command::CreatePost { title, content, category_id } => {
            let post = client.create_post(&title, &content, category_id).await?;
            print_json(&post)
        }
        Command::Comment { post_id, content } => {
            open_post(client, api, post_id).await?;
            match client.create_comment(&content).await? {
                Some(comment) => print_json(&comment),
                None => {
                    eprintln!("comment is empty; nothing sent");
                    Ok(())
                }
            }
        }
        Command::Login { .. } | Command::Register { .. } | Command::Posts | Command::Categories => Ok(()),
    }
}

async fn listen(client: &ControllerHandle) -> Result<(), ClientError> {
    client.navigate(Route::Home).await?;
    let mut views = client.subscribe();
    print_json(&*views.borrow_and_update())?;

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    return Err(ClientError::ControllerGone);
                }
                let view = views.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&view)?);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; shutting down");
                return Ok(());
            }
        }
    }
}

async fn open_conversation(client: &ControllerHandle, peer_id: i64) -> Result<(), ClientError> {
    client.navigate(Route::Messages(None)).await?;
    let peer = client
        .view()
        .online_users
        .into_iter()
        .find(|u| u.id == peer_id)
        .unwrap_or_else(|| User { id: peer_id, ..User::default() });
    client.navigate(Route::Messages(Some(peer))).await
}

async fn open_post(client: &ControllerHandle, api: &dyn ForumApi, post_id: i64) -> Result<(), ClientError> {
    let post = api.post_by_id(post_id).await?;
    client.navigate(Route::PostDetail(post)).await
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), ClientError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
