use clap::Parser;
use log::{error, info};
use server::sample::Skirmish;
use server::{GamelogWriter, Mode, PacketSender, Session, TurnOutcome};
use shared::Packet;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Runs the sample game at a fixed tick rate, writing every turn's delta to
/// a gamelog.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Maximum number of turns before the game is called
        #[clap(short, long, default_value = "50")]
        turns: u32,
        /// Milliseconds between turns
        #[clap(long, default_value = "100")]
        tick_ms: u64,
        /// Seed for the game's random number generator (random if omitted)
        #[clap(short, long)]
        seed: Option<u64>,
        /// Number of units on the board
        #[clap(short, long, default_value = "6")]
        units: usize,
        /// Reject invalid values instead of correcting them
        #[clap(long)]
        strict: bool,
        /// Gamelog file to write (stdout if omitted)
        #[clap(short, long)]
        gamelog: Option<PathBuf>,
    }

    env_logger::init();
    let args = Args::parse();

    let seed = args.seed.unwrap_or_else(rand::random);
    let mode = if args.strict { Mode::Strict } else { Mode::Lenient };
    info!("starting Skirmish with seed {} in {:?} mode", seed, mode);

    let mut session = Session::new(Skirmish::new(seed, args.units, args.turns), mode);
    match &args.gamelog {
        Some(path) => session.add_sink(GamelogWriter::new(BufWriter::new(File::create(path)?))),
        None => session.add_sink(GamelogWriter::new(io::stdout())),
    }

    // Stand-in for the network task: drains encoded packets
    let (packet_sender, mut packet_receiver) = mpsc::unbounded_channel::<Vec<u8>>();
    session.add_sink(PacketSender::new(packet_sender, "1"));
    let network_handle = tokio::spawn(async move {
        let mut bytes_sent = 0;
        while let Some(bytes) = packet_receiver.recv().await {
            bytes_sent += bytes.len();
            match Packet::decode(&bytes) {
                Ok(Packet::Over { reason }) => info!("game over ({}), {} bytes sent", reason, bytes_sent),
                Ok(_) => {}
                Err(e) => error!("undecodable packet: {}", e),
            }
        }
    });

    session.start()?;

    let mut interval_timer = interval(Duration::from_millis(args.tick_ms));
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    interval_timer.tick().await;

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                match session.run_turn()? {
                    TurnOutcome::Continue => {}
                    TurnOutcome::Over { winner, reason } => {
                        info!(
                            "turn {}: {}, winner {}",
                            session.turn(),
                            reason,
                            winner.as_deref().unwrap_or("none")
                        );
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping after turn {}", session.turn());
                break;
            }
        }
    }

    // Dropping the session closes the packet channel
    drop(session);
    network_handle.await?;
    Ok(())
}
