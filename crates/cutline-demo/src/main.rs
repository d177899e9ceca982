use std::time::Duration;

use cutline::CutlineConfig;
use facet::Facet;
use figue as args;

mod scenarios;

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Overrides CUTLINE_CHANNEL_CAPACITY.
    #[facet(args::named, default)]
    channel_capacity: Option<u32>,
    /// Overrides CUTLINE_REPORT_TIMEOUT_MS.
    #[facet(args::named, default)]
    timeout_ms: Option<u64>,
    /// Also print the global snapshot as JSON.
    #[facet(args::named, default)]
    json: bool,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    ChandyLamport,
    LaiYang,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> AnyResult<()> {
    let cli = parse_cli()?;
    let config = config_from_cli(&cli)?;
    let output = scenarios::Output { json: cli.json };

    match cli.command {
        CommandKind::ChandyLamport => scenarios::chandy_lamport::run(config, output).await,
        CommandKind::LaiYang => scenarios::lai_yang::run(config, output).await,
    }
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("cutline-demo")
                .description("Replay the triangle snapshot scenarios")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}

/// Environment first, then CLI flags on top. The strategy always comes from
/// the subcommand.
fn config_from_cli(cli: &Cli) -> AnyResult<CutlineConfig> {
    let mut config = CutlineConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(capacity) = cli.channel_capacity {
        config = config.with_channel_capacity(capacity as usize);
    }
    if let Some(millis) = cli.timeout_ms {
        config = config.with_report_timeout(Duration::from_millis(millis));
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}
