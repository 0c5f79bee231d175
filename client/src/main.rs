use clap::Parser;
use client::input::{parse_command, Command, HELP};
use client::network::GameClient;
use client::rendering::render_message;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:12345")]
    server: String,

    /// Player name to join as
    #[arg(short = 'n', long)]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Connecting to: {}", args.server);
    let mut client = GameClient::connect(&args.server).await?;
    client.join(&args.name).await?;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            message = client.next_message() => {
                match message? {
                    Some(message) => println!("{}", render_message(&message, client.player_name())),
                    None => {
                        println!("Server closed the connection");
                        break;
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = run_command(&mut client, command).await {
                            warn!("Command failed: {}", e);
                            println!("{e}");
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    if client.player_name().is_some() {
        let _ = client.leave().await;
    }
    Ok(())
}

async fn run_command(
    client: &mut GameClient<TcpStream>,
    command: Command,
) -> client::network::Result<()> {
    match command {
        Command::Move(direction) => client.move_player(direction).await,
        Command::Attack(target) => client.attack(&target).await,
        Command::Chat(message) => client.chat(&message).await,
        Command::State => client.request_state().await,
        Command::Replay => client.replay().await,
        Command::Leave => client.leave().await,
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => Ok(()),
    }
}
