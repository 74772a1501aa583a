//! Kinetic CLI Client
//!
//! Command-line interface for talking to a Kinetic drive.

use clap::{Parser, Subcommand};
use kinetic::network::client_config_from_pem;
use kinetic::protocol::LogType;
use kinetic::{BlockingConnection, ConnectionOptions, KineticRecord, PersistMode, WriteMode};
use tracing_subscriber::{fmt, EnvFilter};

/// Kinetic CLI
#[derive(Parser, Debug)]
#[command(name = "kinetic-cli")]
#[command(about = "CLI for Kinetic key-value drives")]
#[command(version)]
struct Args {
    /// Drive host name or address
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Drive port
    #[arg(short, long, default_value_t = kinetic::config::DEFAULT_PORT)]
    port: u16,

    /// PEM file with the CA certificate; enables TLS
    #[arg(long)]
    tls_ca: Option<String>,

    /// Identity to authenticate as
    #[arg(short, long, default_value_t = 1)]
    user: i64,

    /// HMAC key of the identity
    #[arg(short, long, default_value = "asdfasdf")]
    key: String,

    /// Cluster version of the drive
    #[arg(long, default_value_t = 0)]
    cluster_version: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the drive is reachable
    Noop,

    /// Get a value by key
    Get {
        key: String,
    },

    /// Store a value, ignoring any existing version
    Put {
        key: String,
        value: String,

        /// Version to store with the value
        #[arg(long, default_value = "")]
        version: String,
    },

    /// Delete a key, ignoring its version
    Delete {
        key: String,
    },

    /// Print the version stored for a key
    Version {
        key: String,
    },

    /// List keys between two keys, both inclusive
    Range {
        start: String,
        end: String,

        #[arg(short, long, default_value_t = 100)]
        max: u32,

        #[arg(short, long)]
        reverse: bool,
    },

    /// Print drive capacity, utilization and limits
    Log,

    /// Flush written data to persistent storage
    Flush,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,kinetic=info"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let mut builder = ConnectionOptions::builder()
        .host(&args.host)
        .port(args.port)
        .credentials(args.user, args.key.as_bytes())
        .cluster_version(args.cluster_version);

    if let Some(ca) = &args.tls_ca {
        match client_config_from_pem(ca) {
            Ok(config) => builder = builder.tls(config),
            Err(e) => {
                tracing::error!("Failed to load TLS configuration: {}", e);
                std::process::exit(1);
            }
        }
    }

    let options = builder.build();

    let mut connection = match BlockingConnection::connect(&options) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to connect to {}:{}: {}", args.host, args.port, e);
            std::process::exit(1);
        }
    };

    if let Err(status) = execute(&mut connection, args.command) {
        eprintln!("error: {}", status);
        std::process::exit(2);
    }
}

fn execute(connection: &mut BlockingConnection, command: Commands) -> Result<(), kinetic::KineticStatus> {
    match command {
        Commands::Noop => {
            connection.noop()?;
            println!("OK");
        }
        Commands::Get { key } => {
            let record = connection.get(key.as_bytes())?;
            println!("{}", String::from_utf8_lossy(record.value()));
        }
        Commands::Put { key, value, version } => {
            let record = KineticRecord::new(value.into_bytes(), version.into_bytes(), Vec::new(), None);
            connection.put(
                key.as_bytes(),
                b"",
                WriteMode::IgnoreVersion,
                &record,
                PersistMode::WriteBack,
            )?;
            println!("OK");
        }
        Commands::Delete { key } => {
            connection.delete(key.as_bytes(), b"", WriteMode::IgnoreVersion, PersistMode::WriteBack)?;
            println!("OK");
        }
        Commands::Version { key } => {
            let version = connection.get_version(key.as_bytes())?;
            println!("{}", String::from_utf8_lossy(&version));
        }
        Commands::Range { start, end, max, reverse } => {
            let keys = connection.get_key_range(start.as_bytes(), true, end.as_bytes(), true, reverse, max)?;
            for key in keys {
                println!("{}", String::from_utf8_lossy(&key));
            }
        }
        Commands::Log => {
            let log = connection.get_log(vec![
                LogType::Capacities,
                LogType::Utilizations,
                LogType::Limits,
            ])?;
            if let Some(capacity) = &log.capacity {
                println!(
                    "capacity: {} bytes, {:.1}% full",
                    capacity.nominal_capacity_in_bytes,
                    capacity.portion_full * 100.0
                );
            }
            for utilization in &log.utilizations {
                println!("{}: {:.1}%", utilization.name, utilization.value * 100.0);
            }
            if let Some(limits) = &log.limits {
                println!("max key size: {}", limits.max_key_size);
                println!("max value size: {}", limits.max_value_size);
            }
        }
        Commands::Flush => {
            connection.flush()?;
            println!("OK");
        }
    }
    Ok(())
}
