//! # Crate Control Daemon
//!
//! Runs a crate control server outside of an acquisition process, for bench
//! tests of modules and for developing tools against the protocol.
//!
//! ## Overview
//!
//! The daemon builds a single crate, either from simulated modules whose counters
//! advance like a running acquisition, or from one module reachable through a
//! memory mapping, and serves it until interrupted.
pub mod backends;

use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use daqctl_protocol::{ConfigNode, Keyword, RegisterDescriptor, ScalarValue, chain::MAX_CHAIN_LEN};
use daqctl_server::{
    live::{Crate, CrateArray, Module},
    registers,
    server::Builder,
    sim::{SimulatedGoc, SimulatedModule},
};
use env_logger::Env;
use tokio_util::sync::CancellationToken;

use crate::backends::mmap::MappedModule;

#[derive(Subcommand, Eq, PartialEq, Clone)]
enum Source {
    /// Serve simulated MADC-32 modules and a simulated GOC
    Simulate {
        #[arg(short, long, default_value = "2")]
        modules: u16,
        #[arg(long, help = "Number of SFP links of the GOC", default_value = "4")]
        sfps: u8,
        #[arg(
            short,
            long,
            help = "Interval of simulated events in milliseconds",
            default_value = "100"
        )]
        event_interval_ms: u64,
    },
    /// Serve one module mapped from a device file
    Mapped {
        path: PathBuf,
        #[arg(short, long, help = "Keyword of the module type, e.g. caen_v775", value_parser = parse_keyword)]
        module_type: Keyword,
        #[arg(short, long, value_parser = maybe_hex::<u64>, default_value = "0")]
        base: u64,
        #[arg(short, long, value_parser = maybe_hex::<usize>, default_value = "0x10000")]
        size: usize,
    },
}

#[derive(Parser)]
#[command(about = "Crate control server for simulated or memory-mapped modules", long_about=None)]
struct Args {
    #[arg(short, long, default_value = "23546")]
    port: u16,

    #[arg(short, long, default_value = "0.0.0.0")]
    ip: IpAddr,

    #[arg(short, long, default_value = "Main")]
    crate_name: String,

    #[arg(long, help = "Deadtime release in microseconds, reported as configured")]
    deadtime_release_us: Option<u32>,

    #[arg(long, help = "Most datagrams a single answer may span")]
    max_response_datagrams: Option<usize>,

    #[clap(subcommand)]
    source: Source,
}

fn parse_keyword(name: &str) -> Result<Keyword, String> {
    Keyword::from_name(name).ok_or_else(|| format!("Unknown keyword '{}'", name))
}

/// The crate block, with the deadtime release as the only parameter set by the user.
fn crate_config(name: &str, deadtime_release_us: Option<u32>) -> ConfigNode {
    let mut config =
        ConfigNode::block(Keyword::CRATE).with_scalar(ScalarValue::String(name.to_string()));
    if let Some(us) = deadtime_release_us {
        config = config.with_child(
            ConfigNode::param(Keyword::DEADTIME_RELEASE)
                .with_scalar(ScalarValue::Int32 {
                    value: us as i32,
                    unit: "us".to_string(),
                })
                .set(),
        );
    }
    config
}

fn simulated_crate(args: &Args, modules: u16, sfps: u8) -> Crate {
    let mut crate_ = Crate::new(&args.crate_name)
        .with_config(crate_config(&args.crate_name, args.deadtime_release_us))
        .with_tag("Default", (0..modules).collect())
        .with_goc(SimulatedGoc::new(sfps));
    for i in 0..modules {
        let config = ConfigNode::block(Keyword::MESYTEC_MADC32).with_child(
            ConfigNode::param(Keyword::ADDRESS)
                .with_scalar(ScalarValue::Int32 {
                    value: i32::from(i) << 24,
                    unit: String::new(),
                })
                .set(),
        );
        crate_ = crate_.with_module(
            Module::new(Keyword::MESYTEC_MADC32, SimulatedModule::mesytec_madc32())
                .with_config(config)
                .with_counter_mask(0x00ff_ffff),
        );
    }
    crate_
}

fn mapped_crate(
    args: &Args,
    path: &Path,
    module_type: Keyword,
    base: u64,
    size: usize,
) -> Result<Crate, Box<dyn Error>> {
    let table: &'static [RegisterDescriptor] = match registers::table_for(module_type) {
        Some(table) => table,
        None => {
            log::warn!("No register table for {}, register lists will be empty", module_type);
            &[]
        }
    };
    let driver = MappedModule::open(path, base, size, table)?;
    Ok(Crate::new(&args.crate_name)
        .with_config(crate_config(&args.crate_name, args.deadtime_release_us))
        .with_tag("Default", vec![0])
        .with_module(Module::new(module_type, driver)))
}

/// Advances the counters of crate 0 like a running acquisition would.
async fn simulate_acquisition(
    crates: Arc<CrateArray>,
    interval: Duration,
    stop: CancellationToken,
) {
    let Some(crate_) = crates.crates().first() else {
        return;
    };
    crate_.counters().set_running(true);
    let mut ticker = tokio::time::interval(interval);
    let mut events: u32 = 0;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        events = events.wrapping_add(1);
        crate_.counters().add_events(1);
        for tag in crate_.tags() {
            tag.record_event();
        }
        for module in crate_.modules() {
            module.set_event_counter(events);
        }
        log::trace!("Simulated event {}", events);
    }
    crate_.counters().set_running(false);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    log::info!("Starting crate control daemon");

    let args = Args::parse();
    log::debug!("Parsed arguments: ip={}, port={}", args.ip, args.port);

    let crate_ = match &args.source {
        Source::Simulate { modules, sfps, .. } => {
            log::info!("Simulating {} modules", modules);
            simulated_crate(&args, *modules, *sfps)
        }
        Source::Mapped {
            path,
            module_type,
            base,
            size,
        } => {
            log::info!("Serving {} mapped from {}", module_type, path.display());
            mapped_crate(&args, path, *module_type, *base, *size)?
        }
    };
    if let Some(us) = args.deadtime_release_us {
        crate_.counters().set_deadtime_release_us(us);
    }
    let crates = Arc::new(CrateArray::new(vec![crate_]));

    let addr = SocketAddr::new(args.ip, args.port);
    log::info!("Binding to address: {}", addr);
    let handle = Builder::new()
        .bind_addr(addr)
        .max_response_datagrams(args.max_response_datagrams.unwrap_or(MAX_CHAIN_LEN))
        .build(crates.clone())
        .spawn()?;

    let stop = CancellationToken::new();
    if let Source::Simulate {
        event_interval_ms, ..
    } = args.source
    {
        tokio::spawn(simulate_acquisition(
            crates.clone(),
            Duration::from_millis(event_interval_ms.max(1)),
            stop.clone(),
        ));
    }

    tokio::signal::ctrl_c().await?;
    log::info!("Interrupted, shutting down");
    stop.cancel();
    tokio::task::spawn_blocking(move || handle.shutdown()).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_hex_mapping() {
        let args = Args::parse_from([
            "daqctld",
            "--crate-name",
            "Bench",
            "mapped",
            "/dev/uio0",
            "--module-type",
            "caen_v775",
            "--base",
            "0x10000",
        ]);
        assert_eq!(args.crate_name, "Bench");
        assert!(matches!(
            args.source,
            Source::Mapped {
                module_type: Keyword::CAEN_V775,
                base: 0x10000,
                size: 0x10000,
                ..
            }
        ));
    }

    #[test]
    fn simulated_crate_has_touched_config() {
        let args = Args::parse_from(["daqctld", "--deadtime-release-us", "20", "simulate"]);
        let crate_ = simulated_crate(&args, 3, 1);
        assert_eq!(crate_.modules().len(), 3);
        assert_eq!(crate_.tags()[0].modules(), &[0, 1, 2]);
        let tree = crate_.config_tree().unwrap();
        assert!(tree.child(Keyword::DEADTIME_RELEASE).is_some_and(|n| n.touched));
        assert_eq!(tree.prune_untouched().unwrap().node_count(), 8);
    }
}
