mod client;
mod command;
mod transport;

use clap::{builder::BoolishValueParser, Parser};
use client::{Client, ClientConfig};
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use stomp_core::frame::DEFAULT_MAX_FRAME_BYTES;
use tokio::{io::BufReader, sync::mpsc};
use tracing::info;
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    EnvFilter,
};

const DEFAULT_HOST_HEADER: &str = "stomp.cs.bgu.ac.il";

#[derive(Parser, Debug)]
#[command(name = "stomp-client")]
struct Args {
    /// Value of the CONNECT `host` header.
    #[arg(long, env = "STOMP_HOST_HEADER", default_value = DEFAULT_HOST_HEADER)]
    host_header: String,
    /// Shorthand for `--log-level debug`.
    #[arg(long, env = "STOMP_CLIENT_DEBUG", value_parser = BoolishValueParser::new())]
    debug: bool,
    #[arg(long, env = "STOMP_LOG_LEVEL", default_value = "warn")]
    log_level: String,
    /// Also write logs to `stomp-client-<pid>.log` under this directory.
    #[arg(long, env = "STOMP_LOG_DIR")]
    log_dir: Option<PathBuf>,
    #[arg(
        long,
        env = "STOMP_MAX_FRAME_BYTES",
        default_value_t = DEFAULT_MAX_FRAME_BYTES,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    max_frame_bytes: usize,
    /// Seconds a single frame write may take.
    #[arg(long, default_value_t = 5)]
    write_timeout: u64,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            host_header: self.host_header.clone(),
            max_frame_bytes: self.max_frame_bytes,
            write_timeout: Duration::from_secs(self.write_timeout.max(1)),
        }
    }

    fn level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args);
    info!(
        event = "client_start",
        host_header = %args.host_header,
        max_frame_bytes = args.max_frame_bytes
    );

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            println!("{line}");
        }
    });

    let mut client = Client::new(args.client_config(), out_tx);
    client.run(BufReader::new(tokio::io::stdin())).await;
    drop(client);
    let _ = printer.await;
    info!(event = "client_stop");
}

/// Stdout carries user-facing output, so logs go to stderr and, when a log
/// directory is configured, to a per-process file.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.level()));
    let file = match args.log_dir.as_deref().map(open_log_file).transpose() {
        Ok(file) => file,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            None
        }
    };
    let writer = match file {
        Some(file) => BoxMakeWriter::new(io::stderr.and(Mutex::new(file))),
        None => BoxMakeWriter::new(io::stderr),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
}

fn open_log_file(dir: &Path) -> io::Result<File> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("stomp-client-{}.log", std::process::id()));
    OpenOptions::new().create(true).append(true).open(path)
}
