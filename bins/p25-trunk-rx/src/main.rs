use clap::Parser;

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};

use p25_config::RxConfig;
use p25_core::{debug, timebase};
use p25_trunking::{ChannelSink, Outbound, QueueMsg, RxCtl};

const INBOUND_QUEUE_LEN: usize = 1024;
const OUTBOUND_QUEUE_LEN: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Load configuration file
fn load_config(cfg_path: &str) -> RxConfig {
    let cfg = match p25_config::load_config(cfg_path) {
        Ok(c) => c,
        Err(e) => {
            println!("Failed to load configuration from {}: {}", cfg_path, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = cfg.validate() {
        println!("Invalid configuration in {}: {}", cfg_path, e);
        std::process::exit(1);
    }
    cfg
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "P25 Trunking Receiver Control",
    long_about = "Follows P25 control channels and emits frequency change requests for voice grants. \
                  Reads recorded queue messages, one per line, and writes JSON lines to stdout."
)]
struct Args {
    #[arg(short, long, help = "TOML, JSON or TSV channel configuration. Without one, systems are learned as NACs appear")]
    config: Option<String>,

    #[arg(help = "Recorded queue messages (reads stdin when omitted)")]
    input: Option<String>,

    #[arg(long, help = "Emit a heartbeat line for every processed message")]
    heartbeats: bool,

    #[arg(long, default_value_t = 1.0, help = "Seconds without input before a receive timeout is synthesized")]
    timeout: f64,

    #[arg(long, default_value_t = 0.0, help = "Seconds between status dumps on stderr, 0 disables")]
    status_interval: f64,
}

/// Feeds parsed queue messages into the control loop until EOF
fn spawn_reader(input: Box<dyn Read + Send>, tx: crossbeam_channel::Sender<QueueMsg>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for (lineno, line) in BufReader::new(input).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("input read error: {}", e);
                    break;
                }
            };
            match QueueMsg::from_line(&line) {
                Ok(Some(msg)) => {
                    if tx.send(msg).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("line {}: {}", lineno + 1, e),
            }
        }
        tracing::debug!("input exhausted");
    })
}

/// Drains the outbound queue to stdout as JSON lines
fn spawn_writer(rx: crossbeam_channel::Receiver<Outbound>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdout = std::io::stdout();
        for item in rx.iter() {
            let json = match item.to_json() {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("failed to serialize {:?}: {}", item, e);
                    continue;
                }
            };
            let mut out = stdout.lock();
            if let Err(e) = writeln!(out, "{}", json).and_then(|_| out.flush()) {
                tracing::error!("stdout write failed: {}", e);
                break;
            }
        }
    })
}

fn open_input(path: Option<&str>) -> Box<dyn Read + Send> {
    match path {
        Some(p) => match std::fs::File::open(p) {
            Ok(f) => Box::new(f),
            Err(e) => {
                println!("Failed to open input {}: {}", p, e);
                std::process::exit(1);
            }
        },
        None => Box::new(std::io::stdin()),
    }
}

fn main() {
    eprintln!("░█▀█░▀▀▄░█▀▀░░░▀█▀░█▀▄░█░█░█▀█░█░█░░░█▀▄░█░█");
    eprintln!("░█▀▀░▄▀░░▀▀▄░░░░█░░█▀▄░█░█░█░█░█▀▄░░░█▀▄░▄▀▄");
    eprintln!("░▀░░░▀▀▀░▀▀░░░░░▀░░▀░▀░▀▀▀░▀░▀░▀░▀░░░▀░▀░▀░▀\n");

    let args = Args::parse();
    let cfg = args.config.as_deref().map(load_config);
    let _log_guard = debug::setup_logging_default(cfg.as_ref().and_then(|c| c.debug_log.clone()));
    if cfg.is_none() {
        eprintln!(" -> No configuration given, learning systems from traffic");
    }

    // Set up Ctrl+C handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("failed to set Ctrl+C handler");

    let (in_tx, in_rx) = bounded::<QueueMsg>(INBOUND_QUEUE_LEN);
    let (out_tx, out_rx) = bounded::<Outbound>(OUTBOUND_QUEUE_LEN);
    let reader = spawn_reader(open_input(args.input.as_deref()), in_tx);
    let writer = spawn_writer(out_rx);

    let sink = if args.heartbeats { ChannelSink::with_heartbeats(out_tx) } else { ChannelSink::new(out_tx) };
    let mut ctl = RxCtl::new(cfg, sink, timebase::now());

    let mut last_rx = timebase::now();
    let mut last_status = last_rx;
    while running.load(Ordering::SeqCst) {
        match in_rx.recv_timeout(POLL_INTERVAL) {
            Ok(msg) => {
                last_rx = timebase::now();
                ctl.process_qmsg(&msg, last_rx);
            }
            Err(RecvTimeoutError::Timeout) => {
                let now = timebase::now();
                if now - last_rx >= args.timeout {
                    ctl.process_qmsg(&QueueMsg::timeout(0), now);
                    last_rx = now;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = timebase::now();
        ctl.parallel_hunt_cc(now);

        if args.status_interval > 0.0 && now - last_status >= args.status_interval {
            last_status = now;
            match ctl.to_json(now) {
                Ok(status) => eprintln!("{}", status),
                Err(e) => tracing::warn!("status serialization failed: {}", e),
            }
        }
    }

    tracing::info!("{}", ctl.describe(timebase::now()));

    // Closing the sink ends the writer once the queue is drained
    drop(ctl);
    if writer.join().is_err() {
        tracing::error!("writer thread panicked");
    }
    // The reader may still be blocked on stdin after Ctrl+C
    if reader.is_finished() && reader.join().is_err() {
        tracing::error!("reader thread panicked");
    }
}
