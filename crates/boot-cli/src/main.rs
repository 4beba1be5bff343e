use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use boot_broker::{
    load_topology, reconcile, AppPrincipal, HttpBrokerAdmin, PermissionScope, ReconcileSpec,
};
use boot_config::{BrokerOptions, DocStoreOptions, StorageOptions, TopicOptions, VectorOptions};
use boot_provision::{
    BlobStorageService, DocumentStoreService, EnsureOutcome, TopicService, VectorStoreService,
};

#[derive(Parser)]
#[command(name = "bootctl")]
#[command(about = "Environment bootstrapper", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Message broker topology
    Broker {
        #[command(subcommand)]
        cmd: BrokerCmd,
    },

    /// Blob storage containers
    Storage {
        #[command(subcommand)]
        cmd: EnsureCmd,
    },

    /// Event topics
    Topics {
        #[command(subcommand)]
        cmd: EnsureCmd,
    },

    /// Document database + containers
    Docstore {
        #[command(subcommand)]
        cmd: EnsureCmd,
    },

    /// Vector search collection
    Vectors {
        #[command(subcommand)]
        cmd: EnsureCmd,
    },

    /// Run every bootstrap step (storage, topics, docstore, vectors, broker)
    Up,
}

#[derive(Subcommand)]
enum BrokerCmd {
    /// Reconcile the vhost against the declared topology: create what is
    /// missing, remove what is undeclared.
    Reconcile,
}

#[derive(Subcommand)]
enum EnsureCmd {
    /// Create anything missing. Existing resources are left alone.
    Ensure,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Broker {
            cmd: BrokerCmd::Reconcile,
        } => run_broker().await?,
        Commands::Storage {
            cmd: EnsureCmd::Ensure,
        } => run_storage().await?,
        Commands::Topics {
            cmd: EnsureCmd::Ensure,
        } => run_topics().await?,
        Commands::Docstore {
            cmd: EnsureCmd::Ensure,
        } => run_docstore().await?,
        Commands::Vectors {
            cmd: EnsureCmd::Ensure,
        } => run_vectors().await?,
        Commands::Up => {
            run_storage().await?;
            run_topics().await?;
            run_docstore().await?;
            run_vectors().await?;
            run_broker().await?;
            println!("up=true");
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn run_broker() -> Result<()> {
    let opts = BrokerOptions::from_env().context("broker configuration")?;
    let topology =
        load_topology(opts.topology_file.as_deref()).context("load declared topology")?;

    let admin = HttpBrokerAdmin::new(&opts)?;
    let principal = AppPrincipal {
        username: opts.app_username.clone(),
        password: opts.app_password.clone(),
        scope: PermissionScope {
            configure: opts.app_configure.clone(),
            write: opts.app_write.clone(),
            read: opts.app_read.clone(),
        },
    };
    let spec = ReconcileSpec {
        vhost: &opts.vhost,
        principal: &principal,
        admin_username: &opts.admin_username,
    };

    let report = reconcile(&admin, &spec, &topology).await?;
    for action in &report.actions {
        println!("action={action}");
    }
    println!("vhost={}", opts.vhost);
    println!("actions={}", report.actions.len());
    println!("converged={}", report.is_converged());
    Ok(())
}

async fn run_storage() -> Result<()> {
    let opts = StorageOptions::from_env().context("storage configuration")?;
    let svc = BlobStorageService::new(opts)?;
    print_outcomes("container", &svc.ensure_all().await?);
    Ok(())
}

async fn run_topics() -> Result<()> {
    let opts = TopicOptions::from_env().context("topic configuration")?;
    let svc = TopicService::new(opts)?;
    print_outcomes("topic", &svc.ensure_all().await?);
    Ok(())
}

async fn run_docstore() -> Result<()> {
    let opts = DocStoreOptions::from_env().context("docstore configuration")?;
    let svc = DocumentStoreService::new(opts)?;
    print_outcomes("resource", &svc.ensure_all().await?);
    Ok(())
}

async fn run_vectors() -> Result<()> {
    let opts = VectorOptions::from_env().context("vector store configuration")?;
    let collection = opts.collection.clone();
    let svc = VectorStoreService::new(opts)?;
    let outcome = svc.ensure_collection().await?;
    println!("collection={} outcome={}", collection, outcome.as_str());
    Ok(())
}

fn print_outcomes(kind: &str, outcomes: &[(String, EnsureOutcome)]) {
    for (name, outcome) in outcomes {
        println!("{kind}={name} outcome={}", outcome.as_str());
    }
}
