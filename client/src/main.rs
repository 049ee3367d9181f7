use clap::Parser;
use client::Mirror;
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gamelog written by the server
    #[arg(short = 'g', long)]
    gamelog: PathBuf,

    /// Pretty-print the final state
    #[arg(short = 'p', long)]
    pretty: bool,
}

/// Replays a gamelog into a mirror and prints the resulting state.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Replaying {}", args.gamelog.display());
    let contents = tokio::fs::read_to_string(&args.gamelog).await?;

    let mut mirror = Mirror::new();
    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        mirror
            .apply_gamelog_line(line)
            .map_err(|e| format!("line {}: {}", number + 1, e))?;
    }

    if let Some(turn) = mirror.turn() {
        info!("Replayed up to turn {}", turn);
    }
    if let Some(reason) = mirror.over() {
        info!("Game over: {}", reason);
    }

    let state = mirror.state().to_json();
    if args.pretty {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{}", state);
    }

    Ok(())
}
