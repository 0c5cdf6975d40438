#[macro_use]
extern crate tracing;

use std::path::PathBuf;
use std::sync::Arc;

use structopt::StructOpt;
use tokio::runtime::Builder;
use tokio::signal;

use huectl::{bridge::DummyBridge, global::GlobalData, models::Config};

#[derive(Debug, StructOpt)]
struct Opts {
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u32,
    #[structopt(short, long = "config")]
    config_path: Option<PathBuf>,
    /// Override the web server port
    #[structopt(short, long)]
    port: Option<u16>,
    /// Serve in-memory demo rooms instead of talking to a bridge
    #[structopt(long)]
    dummy: bool,
    #[structopt(long)]
    dump_config: bool,
}

async fn run(opts: Opts) -> color_eyre::eyre::Result<()> {
    // Load configuration
    let config_path = match opts.config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    let config = Config::load_file(&config_path).await?;

    // Command-line overrides are not saved with the configuration
    let web_config = config.web.with_port(opts.port);

    // Dump configuration if this was asked
    if opts.dump_config {
        print!("{}", config.to_string()?);
        return Ok(());
    }

    // Create the global state object
    let global = if opts.dummy {
        // Demo changes are not saved
        GlobalData::new(&config)
            .with_dummy_bridge(Arc::new(DummyBridge::with_demo_rooms()))
            .wrap()
    } else {
        GlobalData::new(&config)
            .with_config_path(config_path)
            .wrap()
    };

    if !global.read_config(|config| config.bridge.is_configured()).await {
        warn!("no bridge configured, use the web page to discover and register one");
    }

    // Start the web server
    let server = tokio::spawn(huectl::web::bind(global, &web_config).await?);

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("shutting down");
        }
        result = server => {
            if let Err(error) = result {
                error!(error = %error, "web server error");
            }
        }
    }

    Ok(())
}

fn install_tracing(opts: &Opts) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let fmt_layer = fmt::layer();

    let filter_layer = EnvFilter::try_from_env("HUECTL_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match opts.verbose {
            0 => "huectl=warn,huectld=warn",
            1 => "huectl=info,huectld=info",
            2 => "huectl=debug,huectld=debug",
            _ => "huectl=trace,huectld=trace",
        })
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init()
}

#[paw::main]
fn main(opts: Opts) -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    install_tracing(&opts)?;

    // Create tokio runtime
    let thd_count = match num_cpus::get() {
        1 => 2,
        other => other.min(4),
    };

    let rt = Builder::new_multi_thread()
        .worker_threads(thd_count)
        .enable_all()
        .build()?;
    rt.block_on(run(opts))
}
