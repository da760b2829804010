use std::time::Duration;

use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "ring-peer")]
struct Opt {
    /// Unique member ID in [0, count)
    #[structopt(short = "i", long = "id")]
    id: usize,

    /// Total number of members
    #[structopt(short = "c", long = "count", default_value = "3")]
    count: usize,

    /// Member that injects the token (default: lowest ID)
    #[structopt(short = "o", long = "origin")]
    origin: Option<usize>,

    /// Base port; member `i` listens on `port + i`
    #[structopt(short = "p", long = "port", default_value = "5000")]
    port: u16,

    /// Time between intent draws (in milliseconds)
    #[structopt(long = "interval", default_value = "5000")]
    interval: u64,

    /// Time the token is held on arrival (in milliseconds)
    #[structopt(long = "hold", default_value = "3000")]
    hold: u64,

    /// Length of the critical section (in milliseconds)
    #[structopt(long = "critical", default_value = "5000")]
    critical: u64,

    /// Wait after the critical section (in milliseconds)
    #[structopt(long = "cooldown", default_value = "3000")]
    cooldown: u64,

    /// Origin's wait before injecting the token (in milliseconds)
    #[structopt(long = "startup", default_value = "3000")]
    startup: u64,

    /// Keep running after the ring stalls instead of exiting
    #[structopt(long = "stall")]
    stall: bool,

    /// Logging verbosity
    #[structopt(short = "v", parse(from_occurrences))]
    verbose: u8,
}

fn logger(id: usize, verbose: u8) -> Result<(), log::SetLoggerError> {
    let level = match verbose {
    | 0 => log::LevelFilter::Info,
    | 1 => log::LevelFilter::Debug,
    | _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                id,
                record.level(),
                message,
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    if let Err(error) = logger(opt.id, opt.verbose) {
        eprintln!("[ERROR]: could not initialize logging: {}", error);
    }

    let timing = token_ring::Timing {
        startup: Duration::from_millis(opt.startup),
        hold: Duration::from_millis(opt.hold),
        critical_section: Duration::from_millis(opt.critical),
        cooldown: Duration::from_millis(opt.cooldown),
    };

    let schedule = token_ring::Schedule::default()
        .with_interval(Duration::from_millis(opt.interval));

    let mut config = token_ring::Config::new(opt.id, opt.count)
        .with_port(opt.port)
        .with_timing(timing)
        .with_schedule(Some(schedule));

    if let Some(origin) = opt.origin {
        config = config.with_origin(origin);
    }

    match config.run().await {
    | Ok(()) => log::info!("{} shutting down", opt.id),
    | Err(error @ token_ring::Error::Forward { .. }) if opt.stall => {
        log::error!("{}; ring stalled", error);
        std::future::pending::<()>().await;
    }
    | Err(error) => {
        log::error!("{}", error);
        std::process::exit(1);
    }
    }
}
