//! chainaccount CLI: fetch, scan and watch Anchor accounts from the terminal.
//!
//! # Commands
//! ```bash
//! # Decode one account
//! chainaccount fetch --idl vaults.json --program <ID> --account Vault --address <ADDR>
//!
//! # Every Vault whose authority is 0x07..07
//! chainaccount all --idl vaults.json --program <ID> --account Vault --prefix-hex 0707..07
//!
//! # Stream changes to an account until Ctrl-C
//! chainaccount watch --idl vaults.json --program <ID> --account Vault --address <ADDR>
//!
//! # List the accounts an IDL declares
//! chainaccount accounts --idl vaults.json
//! ```

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use chainaccount_borsh::BorshAccountDecoder;
use chainaccount_client::{camel_case, AccountClient, AccountNamespace};
use chainaccount_core::{AccountDecoder, Address, Commitment, Idl, ProgramAccount, ScanFilter};
use chainaccount_rpc::{ConnectionConfig, RpcConnection};

use crate::logging::LogConfig;

#[derive(Parser)]
#[command(
    name = "chainaccount",
    about = "Fetch, scan and watch Anchor program accounts",
    long_about = "
chainaccount: decode Anchor program accounts straight from a Solana node.

ENVIRONMENT VARIABLES:
  ANCHOR_PROVIDER_URL   RPC endpoint used when --url is not given
  RUST_LOG              Log filter; overrides --log-level
",
    version
)]
struct Cli {
    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the accounts live and how to decode them.
#[derive(Args)]
struct Target {
    /// Anchor IDL JSON file
    #[arg(long)]
    idl: PathBuf,
    /// Program id (base-58)
    #[arg(long)]
    program: Address,
    /// IDL account name, e.g. Vault or vault
    #[arg(long)]
    account: String,
    /// RPC endpoint [default: $ANCHOR_PROVIDER_URL, then http://127.0.0.1:8899]
    #[arg(long)]
    url: Option<String>,
    /// processed | confirmed | finalized
    #[arg(long)]
    commitment: Option<Commitment>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and decode one account
    Fetch {
        #[command(flatten)]
        target: Target,
        /// Account address
        #[arg(long)]
        address: Address,
    },

    /// Fetch and decode several accounts (batched)
    #[command(name = "fetch-many")]
    FetchMany {
        #[command(flatten)]
        target: Target,
        /// Account addresses, comma-separated or repeated
        #[arg(long, value_delimiter = ',', num_args = 1.., required = true)]
        address: Vec<Address>,
    },

    /// Scan every account of a type owned by the program
    All {
        #[command(flatten)]
        target: Target,
        /// Bytes that must follow the discriminator (hex)
        #[arg(long)]
        prefix_hex: Option<String>,
        /// Print addresses only, no account data
        #[arg(long)]
        keys_only: bool,
    },

    /// Stream decoded changes to an account until Ctrl-C
    Watch {
        #[command(flatten)]
        target: Target,
        /// Account address
        #[arg(long)]
        address: Address,
    },

    /// List the accounts declared in an IDL
    Accounts {
        /// Anchor IDL JSON file
        #[arg(long)]
        idl: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_tracing(&LogConfig {
        level: cli.log_level,
        json: cli.json_logs,
    });

    match cli.command {
        Commands::Fetch { target, address } => cmd_fetch(&target, address).await,
        Commands::FetchMany { target, address } => cmd_fetch_many(&target, &address).await,
        Commands::All {
            target,
            prefix_hex,
            keys_only,
        } => cmd_all(&target, prefix_hex.as_deref(), keys_only).await,
        Commands::Watch { target, address } => cmd_watch(&target, address).await,
        Commands::Accounts { idl } => cmd_accounts(&idl),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_fetch(target: &Target, address: Address) -> Result<()> {
    let namespace = build_namespace(target)?;
    let client = account_client(&namespace, &target.account)?;

    let account = client.fetch(&address, None).await?;
    print_json(&ProgramAccount { address, account })
}

async fn cmd_fetch_many(target: &Target, addresses: &[Address]) -> Result<()> {
    let namespace = build_namespace(target)?;
    let client = account_client(&namespace, &target.account)?;

    let accounts = client.fetch_multiple(addresses, None).await?;
    let out: Vec<_> = addresses
        .iter()
        .zip(accounts)
        .map(|(address, account)| json!({ "publicKey": address, "account": account }))
        .collect();
    print_json(&out)
}

async fn cmd_all(target: &Target, prefix_hex: Option<&str>, keys_only: bool) -> Result<()> {
    let namespace = build_namespace(target)?;
    let client = account_client(&namespace, &target.account)?;
    let filter = scan_filter(prefix_hex)?;

    if keys_only {
        print_json(&client.all_addresses(filter).await?)
    } else {
        print_json(&client.all(filter).await?)
    }
}

async fn cmd_watch(target: &Target, address: Address) -> Result<()> {
    let namespace = build_namespace(target)?;
    let client = account_client(&namespace, &target.account)?;

    let events = client.subscribe(&address, None).await?;
    let mut rx = events.receiver();
    eprintln!("Watching {address} as {} (Ctrl-C to stop)", client.name());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            msg = rx.recv() => match msg {
                Ok(change) => println!("{}", serde_json::to_string(&change)?),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watcher fell behind; changes dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.unsubscribe(&address).await;
    Ok(())
}

fn cmd_accounts(path: &Path) -> Result<()> {
    let idl = load_idl(path)?;
    let decoder = BorshAccountDecoder::new(idl.clone());
    let out: Vec<_> = idl
        .accounts
        .iter()
        .map(|def| {
            json!({
                "name": def.name,
                "key": camel_case(&def.name),
                "size": 8 + decoder.size(def).unwrap_or(0),
                "discriminator": hex::encode(decoder.discriminator(&def.name)),
            })
        })
        .collect();
    print_json(&out)
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn load_idl(path: &Path) -> Result<Arc<Idl>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read IDL {}", path.display()))?;
    let idl = Idl::from_json(&json).with_context(|| format!("invalid IDL {}", path.display()))?;
    Ok(Arc::new(idl))
}

fn connection_config(target: &Target) -> ConnectionConfig {
    let config = match &target.url {
        Some(url) => ConnectionConfig::for_url(url.clone()),
        None => ConnectionConfig::from_env().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "falling back to the local validator");
            ConnectionConfig::default()
        }),
    };
    match target.commitment {
        Some(commitment) => config.with_commitment(commitment),
        None => config,
    }
}

fn build_namespace(target: &Target) -> Result<AccountNamespace> {
    let idl = load_idl(&target.idl)?;
    let config = connection_config(target);
    tracing::debug!(url = %config.url, "using RPC endpoint");
    let connection = Arc::new(RpcConnection::new(config)?);
    let decoder = Arc::new(BorshAccountDecoder::new(idl.clone()));
    Ok(AccountNamespace::build(idl, decoder, target.program, connection)?)
}

fn account_client<'a>(namespace: &'a AccountNamespace, name: &str) -> Result<&'a AccountClient> {
    match namespace.get(&camel_case(name)) {
        Some(client) => Ok(client),
        None => bail!(
            "IDL has no account '{name}' (known: {})",
            namespace.names().collect::<Vec<_>>().join(", ")
        ),
    }
}

fn scan_filter(prefix_hex: Option<&str>) -> Result<ScanFilter> {
    match prefix_hex {
        Some(prefix) => {
            let bytes = hex::decode(prefix.trim_start_matches("0x")).context("invalid --prefix-hex")?;
            Ok(ScanFilter::RawSuffix(bytes))
        }
        None => Ok(ScanFilter::None),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
