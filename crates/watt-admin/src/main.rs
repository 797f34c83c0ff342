use std::sync::Arc;

use facet::Facet;
use figue as args;
use tokio::net::TcpListener;
use tracing::{info, warn};
use watt_admin::app::{AppState, ServerHandle, build_router};
use watt_admin::artifact::SystemOpener;
use watt_admin::client::{ControlSocketClient, RuntimeClient};
use watt_admin::config::AdminConfig;
use watt_admin::metrics::MetricsAggregator;
use watt_admin::recording::{InterruptForwarder, ServerControl, UnattendedRecording};
use watt_admin::runtimes::RuntimeDirectory;
use watt_admin_types::{Pid, ProfileKind, Runtime};

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    #[facet(args::named, default)]
    pid: Option<String>,
    #[facet(args::named, default)]
    port: Option<String>,
    #[facet(args::named, default)]
    record: bool,
    #[facet(args::named, default)]
    profile: Option<String>,
    #[facet(args::named, default)]
    output: Option<String>,
    #[facet(args::named, default)]
    no_open: bool,
    #[facet(args::named, default)]
    include_admin: bool,
}

struct RecordOptions {
    profile: ProfileKind,
    output: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = AdminConfig::from_env();
    let record = apply_cli(&cli, &mut config)?;

    let client: Arc<dyn RuntimeClient> =
        Arc::new(ControlSocketClient::new(config.socket_dir.clone()));
    let runtime = RuntimeDirectory::new(Arc::clone(&client), config.admin_pid, config.selected_pid)
        .select_startup(cli.include_admin)
        .await
        .map_err(|e| e.to_string())?;
    config.selected_pid = Some(runtime.pid);
    info!(pid = runtime.pid, package = %runtime.package_name, "using runtime");

    let state = AppState::new(&config, Arc::clone(&client), Arc::new(SystemOpener));
    let aggregator = MetricsAggregator::new(Arc::clone(&client), Arc::clone(&state.metrics))
        .spawn(config.metrics_poll_interval);

    let listener = TcpListener::bind(&config.http_addr)
        .await
        .map_err(|e| format!("failed to bind HTTP on {}: {e}", config.http_addr))?;
    let server = Arc::new(ServerHandle::serve(
        listener,
        build_router(state.clone(), &config.assets_dir),
    )?);
    info!(http_addr = %config.http_addr, "watt-admin HTTP API ready");
    print_startup_hints(&config.http_addr, &runtime, record.as_ref());

    match record {
        Some(record) => {
            let recording = UnattendedRecording::new(
                Arc::clone(&state.recorder),
                Arc::clone(&client),
                server.clone(),
                runtime.pid,
                record.profile,
                record.output,
            );
            let (forwarder, interrupts) = InterruptForwarder::install();
            let outcome = recording
                .run(interrupts, config.record_safety_timeout)
                .await;
            forwarder.remove();
            if let Err(e) = outcome {
                client.close().await;
                server.close().await;
                aggregator.stop().await;
                return Err(format!("failed to start recording: {e}"));
            }
        }
        None => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(%e, "failed waiting for ctrl-c");
                    }
                }
                _ = server.stopped() => warn!("HTTP server stopped on its own"),
            }
            client.close().await;
            server.close().await;
        }
    }

    aggregator.stop().await;
    Ok(())
}

fn apply_cli(cli: &Cli, config: &mut AdminConfig) -> Result<Option<RecordOptions>, String> {
    if let Some(pid) = &cli.pid {
        let pid: Pid = pid
            .parse()
            .map_err(|e| format!("invalid --pid {pid:?}: {e}"))?;
        config.selected_pid = Some(pid);
    }
    if let Some(port) = &cli.port {
        let port: u16 = port
            .parse()
            .map_err(|e| format!("invalid --port {port:?}: {e}"))?;
        let host = config
            .http_addr
            .rsplit_once(':')
            .map_or("127.0.0.1", |(host, _)| host);
        config.http_addr = format!("{host}:{port}");
    }
    if cli.no_open {
        config.open_artifacts = false;
    }

    let profile = match cli.profile.as_deref() {
        None | Some("cpu") => ProfileKind::Cpu,
        Some("heap") => ProfileKind::Heap,
        Some(other) => return Err(format!("invalid --profile {other:?}: expected cpu or heap")),
    };
    if !cli.record {
        if cli.output.is_some() {
            warn!("--output only applies together with --record");
        }
        return Ok(None);
    }
    Ok(Some(RecordOptions {
        profile,
        output: cli.output.clone(),
    }))
}

fn parse_cli() -> Result<Cli, String> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("watt-admin")
                .description("Dashboard and profiling recorder for running watt runtimes")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();
    let cli = args::Driver::new(figue_config)
        .run()
        .into_result()
        .map_err(|e| e.to_string())?;
    Ok(cli.value)
}

fn print_startup_hints(http_addr: &str, runtime: &Runtime, record: Option<&RecordOptions>) {
    println!();
    println!();
    println!(
        "  watt-admin watching {} (PID: {})",
        runtime.package_name, runtime.pid
    );
    println!();
    println!("  \x1b[32mOpen in browser: http://{http_addr}\x1b[0m");
    println!();
    if let Some(record) = record {
        println!("  Recording {} profile; press Ctrl-C to stop and save.", record.profile);
        if let Some(output) = &record.output {
            println!("  Output: {output}");
        }
        println!();
    }
    println!();
}
