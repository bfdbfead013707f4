#![deny(missing_docs)]
//! # Monitor
//! Connects to a GNSS receiver, decodes UBX, NMEA and RTCM3 traffic and
//! prints a periodic status summary.
mod config;
mod fanout;

use std::{
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError},
        Arc,
    },
    time::{Duration, Instant},
};

use chrono::Utc;
use crossterm::terminal;
use env_logger::{Builder, Target};
use gnss_stream::{
    reader::DEFAULT_READ_SIZE, stream::DEFAULT_STOP_TIMEOUT, Dispatcher, GnssStatus,
    ProtocolFilter, SharedStatus, StreamEvent, StreamHandler, StreamOptions, TransportConfig,
};
use log::{error, info, warn, LevelFilter};

pub use config::MonitorCfg;
use fanout::FanoutServer;

fn opt<T: std::fmt::Display>(val: Option<T>) -> String {
    val.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

fn print_summary(status: &GnssStatus, json: bool) {
    if json {
        match serde_json::to_string(status) {
            Ok(line) => println!("{line}"),
            Err(e) => error!("Could not serialize status: {e}"),
        }
        return;
    }
    let width = terminal::size().map(|(w, _)| w as usize).unwrap_or(80);
    println!(
        "\n{:-<width$}",
        format!(
            "{} [{}] ({}, {}, {} m) ",
            status
                .timestamp
                .unwrap_or_else(Utc::now)
                .format("%Y-%m-%d %H:%M:%S%Z"),
            opt(status.fix),
            opt(status.lat.map(|v| format!("{v:.7}"))),
            opt(status.lon.map(|v| format!("{v:.7}"))),
            opt(status.alt.map(|v| format!("{v:.3}"))),
        ),
        width = width
    );
    println!(
        "\tSIV {} SIP {} | PDOP {} HDOP {} VDOP {} | hAcc {} vAcc {} | {} m/s {} deg",
        opt(status.siv),
        opt(status.sip),
        opt(status.pdop),
        opt(status.hdop),
        opt(status.vdop),
        opt(status.hacc.map(|v| format!("{v:.3}"))),
        opt(status.vacc.map(|v| format!("{v:.3}"))),
        opt(status.speed.map(|v| format!("{v:.2}"))),
        opt(status.track.map(|v| format!("{v:.1}"))),
    );
    if let Some(station) = status.diff_station {
        println!(
            "\tDiff station {station} age {} s, base tracks {} satellites",
            opt(status.diff_age),
            status.base_satellites.len()
        );
    }
    if let Some(rel) = &status.relpos {
        println!(
            "\tRelPos {} m @ {} deg",
            opt(rel.length.map(|v| format!("{v:.4}"))),
            opt(rel.heading.map(|v| format!("{v:.2}")))
        );
    }
    // as many satellite cells as fit on one line each
    let per_line = (width / 22).max(1);
    for row in status.visible.chunks(per_line) {
        for sat in row {
            print!(
                "{:>5}-{:03} {:>3}/{:>2} {:>2} | ",
                sat.gnss.label(),
                sat.svid,
                opt(sat.azim.map(|v| v as i32)),
                opt(sat.elev.map(|v| v as i32)),
                opt(sat.cno.map(|v| v as i32)),
            );
        }
        println!();
    }
    println!("{:=<width$}", "", width = width);
}

/// Log pending loop notifications. True if the connection was lost.
fn drain_events(events: &Receiver<StreamEvent>) -> bool {
    let mut lost = false;
    for event in events.try_iter() {
        match event {
            StreamEvent::DataReady => {}
            StreamEvent::ConnectionLost(reason) => {
                error!("Connection lost: {reason}");
                lost = true;
            }
            StreamEvent::EndOfFile => info!("End of replay file"),
            StreamEvent::Stopped => info!("Read loop stopped"),
        }
    }
    lost
}

fn main() -> ExitCode {
    let cfg: MonitorCfg = argh::from_env();
    let cfg = if cfg.load {
        match MonitorCfg::load_default() {
            Ok(saved) => saved,
            Err(e) => {
                eprintln!("Could not load saved options: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        cfg
    };

    let mut builder = Builder::from_default_env();
    if cfg.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder
        .target(Target::Stderr)
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    if cfg.save {
        match cfg.store_default() {
            Ok(path) => info!("Options saved to {}", path.display()),
            Err(e) => warn!("Could not save options: {e}"),
        }
    }

    let config = match TransportConfig::from_settings(&cfg.to_settings()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let Some(filter) = ProtocolFilter::from_list(&cfg.protocols) else {
        error!("Unknown protocol in '{}'", cfg.protocols);
        return ExitCode::FAILURE;
    };
    let options = StreamOptions {
        filter,
        show_unused: cfg.show_unused,
        satellite_expiry: Duration::from_secs(cfg.expiry),
        read_size: DEFAULT_READ_SIZE,
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::Release)) {
            warn!("Ctrl-C handler not installed: {e}");
        }
    }

    let mut handler = StreamHandler::new(options.clone());
    let _fanout = match cfg.fanout_port {
        Some(port) => {
            let (tx, rx) = mpsc::channel();
            handler = handler.with_raw_sink(tx);
            match FanoutServer::start(port, rx) {
                Ok(server) => Some(server),
                Err(e) => {
                    error!("Fan-out on port {port}: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        None => None,
    };

    let mut handle = match handler.start(&config) {
        Ok(handle) => handle,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("Connected to {}", handle.describe());
    let mut dispatcher =
        Dispatcher::new(SharedStatus::new(), &options).with_commands(handle.commands());
    dispatcher.reset();

    let interval = Duration::from_secs(cfg.interval.max(1));
    let mut last_print = Instant::now();
    let mut code = ExitCode::SUCCESS;
    while running.load(Ordering::Acquire) {
        match handle.frames().recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => dispatcher.process(&frame),
            Err(RecvTimeoutError::Timeout) => {}
            // the loop has exited and every frame has been consumed
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if drain_events(handle.events()) {
            code = ExitCode::FAILURE;
        }
        if last_print.elapsed() >= interval {
            last_print = Instant::now();
            dispatcher.status().read(|s| print_summary(s, cfg.json));
        }
    }

    if let Err(e) = handle.stop(DEFAULT_STOP_TIMEOUT) {
        warn!("{e}");
    }
    // the exit notification is sent just before the frame channel closes
    if drain_events(handle.events()) {
        code = ExitCode::FAILURE;
    }
    dispatcher.status().read(|s| print_summary(s, cfg.json));
    code
}
