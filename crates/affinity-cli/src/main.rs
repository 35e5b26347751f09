use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "affinityctl",
    about = "Inspect and maintain sticky-routing route tables",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to affinity.toml
    #[arg(short, long, global = true, default_value = "affinity.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an affinity.toml scaffold
    Init {
        /// Route-key namespace (normally the target service name)
        #[arg(short, long)]
        namespace: String,
        /// Route table file (redb backend)
        #[arg(short, long, default_value = "routes.redb")]
        store: String,
        /// Use a shared Redis server instead of a local file
        #[arg(long, conflicts_with = "store")]
        redis_url: Option<String>,
    },
    /// Print the route key for an object
    Key {
        namespace: String,
        partition: String,
        #[arg(allow_negative_numbers = true)]
        oid: i64,
    },
    /// Split a route key into namespace, partition and object id
    Decode {
        key: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Show the address an object is bound to
    Get {
        #[arg(short, long)]
        partition: Option<String>,
        #[arg(allow_negative_numbers = true)]
        oid: i64,
    },
    /// List live route entries of the configured namespace
    List {
        /// Only entries of this partition
        #[arg(short, long)]
        partition: Option<String>,
        /// List every namespace in the store
        #[arg(long)]
        all: bool,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Remove an object's binding
    Del {
        #[arg(short, long)]
        partition: Option<String>,
        #[arg(allow_negative_numbers = true)]
        oid: i64,
        /// Only remove the binding if it still points at this address
        #[arg(long)]
        if_value: Option<String>,
    },
    /// Remove expired entries from the store (no-op on Redis)
    Purge,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("affinityctl=info".parse()?)
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { namespace, store, redis_url } => {
            commands::init::init(&cli.config, &namespace, &store, redis_url.as_deref())
        }
        Commands::Key { namespace, partition, oid } => {
            commands::key::key(&namespace, &partition, oid)
        }
        Commands::Decode { key, format } => commands::key::decode(&key, &format),
        Commands::Get { partition, oid } => {
            commands::table::get(&cli.config, partition.as_deref(), oid)
        }
        Commands::List { partition, all, format } => {
            commands::table::list(&cli.config, partition.as_deref(), all, &format)
        }
        Commands::Del { partition, oid, if_value } => {
            commands::table::del(&cli.config, partition.as_deref(), oid, if_value.as_deref())
        }
        Commands::Purge => commands::table::purge(&cli.config),
    }
}
