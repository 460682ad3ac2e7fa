//! cmdlink CLI Client
//!
//! Command-line interface for talking to a cmdlink server.

use std::time::Duration;

use clap::{Parser, Subcommand};
use cmdlink::{Client, PacketOut};
use serde_json::Value;

/// cmdlink CLI
#[derive(Parser, Debug)]
#[command(name = "cmdlink-cli")]
#[command(about = "CLI for cmdlink command servers")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:9091")]
    server: String,

    /// Read timeout in milliseconds (0 = wait forever)
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one command and print its response packet
    Call {
        /// Command name
        name: String,

        /// Command payload as JSON
        #[arg(short, long)]
        data: Option<String>,

        /// Then print this many pushed packets
        #[arg(short, long, default_value = "0")]
        follow: usize,
    },

    /// Send a raw packet and print the next packet received
    Raw {
        /// Packet JSON
        packet: String,
    },
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> cmdlink::Result<()> {
    let mut client = Client::connect(&args.server)?;
    if args.timeout_ms > 0 {
        client.set_read_timeout(Some(Duration::from_millis(args.timeout_ms)))?;
    }

    match args.command {
        Commands::Call { name, data, follow } => {
            let data = match data {
                Some(text) => Some(
                    serde_json::from_str::<Value>(&text).map_err(cmdlink::LinkError::Deserialize)?,
                ),
                None => None,
            };
            print_packet(&client.call(&name, data.as_ref())?)?;
            for _ in 0..follow {
                print_packet(&client.recv()?)?;
            }
        }
        Commands::Raw { packet } => {
            client.send_raw(packet.as_bytes())?;
            print_packet(&client.recv()?)?;
        }
    }

    client.close()
}

fn print_packet(packet: &PacketOut) -> cmdlink::Result<()> {
    let json = serde_json::to_string(packet).map_err(cmdlink::LinkError::Serialize)?;
    println!("{}", json);
    Ok(())
}
