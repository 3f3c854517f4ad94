//! A small command-line client for manual smoke-testing of a running
//! `bap-server`, in the spirit of BRLTTY's `apitest`/`brltest`: connect,
//! ask a couple of questions, write a line, or watch key events go by.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use bap_client::{Client, Credential, ServerAddr};

#[derive(Parser, Debug)]
#[command(author, version, about = "Manual smoke-test client for a bap-server")]
struct Cli {
    /// Directory holding the server's Unix-domain sockets.
    #[arg(long, value_name = "DIR", default_value = "/tmp/bap", conflicts_with = "host")]
    socket_dir: PathBuf,

    /// Connect over TCP to this host instead of a local socket.
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Server port offset (appended to the socket path, or added to the
    /// base TCP port), matching the server's own `--port-offset`.
    #[arg(long, default_value_t = 0)]
    port_offset: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the driver name and display dimensions.
    Info,
    /// Enter a tty and write one line of text.
    Write {
        text: String,
        #[arg(long)]
        cursor: Option<u32>,
    },
    /// Enter a tty, accept all key ranges, and print every key event as it
    /// arrives until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let addr = match &cli.host {
        Some(host) => ServerAddr::tcp(host.clone(), cli.port_offset),
        None => ServerAddr::local_socket(cli.socket_dir.clone(), cli.port_offset),
    };

    let client = Client::connect(&addr, Credential::None).await?;
    info!(?addr, "connected");

    match cli.command {
        Command::Info => {
            let name = client.get_driver_name().await?;
            let size = client.get_display_size().await?;
            println!("driver: {name}");
            println!("display: {}x{}", size.width, size.height);
        }
        Command::Write { text, cursor } => {
            client.enter_tty(&[], "").await?;
            client.write_text(text.as_bytes(), cursor).await?;
            println!("wrote {} byte(s)", text.len());
        }
        Command::Watch => {
            client.enter_tty(&[], "").await?;
            client.accept_key_ranges(&[full_key_range()]).await?;
            println!("watching for key events, press Ctrl-C to stop");
            loop {
                let code = client.read_key().await?;
                println!("key: {code:?} (0x{:016x})", code.0);
            }
        }
    }

    Ok(())
}

/// A range covering every possible key code, for `Watch`'s "show me
/// everything" use case (mirrors `apitest`'s `brlapi_acceptAllKeys`).
fn full_key_range() -> bap_client::KeyRange {
    use bap_client::KeyCode;
    bap_client::KeyRange::new(KeyCode(u64::MIN), KeyCode(u64::MAX)).expect("MIN <= MAX")
}
