use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use rtpproxy_core::Relay;
use rtpproxy_core::config::Config;

#[derive(Parser)]
#[command(name = "rtpproxy", about = "Userspace RTP/RTCP relay")]
struct Args {
    /// TOML configuration file. When omitted, `--control-addr` and
    /// `--rtp-addr` must be given and every other setting takes its
    /// built-in default.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Control-channel UDP bind address.
    #[arg(long)]
    control_addr: Option<SocketAddr>,

    /// RTP/RTCP primary bind address.
    #[arg(long)]
    rtp_addr: Option<IpAddr>,

    /// Per-session TTL in seconds.
    #[arg(long)]
    max_ttl: Option<i64>,

    /// Soft limit on open file descriptors, used to scale the
    /// open-session warning threshold.
    #[arg(short = 'L', long)]
    max_open_fds: Option<usize>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let base = match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("failed to load config {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => {
            let (Some(control_addr), Some(rtp_addr)) = (args.control_addr, args.rtp_addr) else {
                eprintln!("either --config or both --control-addr and --rtp-addr are required");
                std::process::exit(1);
            };
            Config::minimal(control_addr, rtp_addr)
        }
    };

    let config = base.merge_cli(args.control_addr, args.rtp_addr, args.max_ttl, args.max_open_fds);

    let mut relay = Relay::new(config);
    if let Err(e) = relay.start() {
        eprintln!("failed to start relay: {e}");
        std::process::exit(1);
    }

    tracing::info!("relay running — press Enter to stop");
    let mut input = String::new();
    let _ = std::io::stdin().read_line(&mut input);

    relay.stop();
}
