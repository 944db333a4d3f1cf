//! Command line client for unlocking paid treasury content.
//!
//! # Usage
//!
//! ```bash
//! # Unlock a resource on the home network for the last sign-in method
//! PRIVATE_KEY=0x... TREASURY_TOKEN=... treasury402 unlock --resource abc123
//!
//! # Pick network, currency and the wallet kind to present as
//! treasury402 unlock --resource abc123 --network xlayer --currency usdt --wallet okx
//!
//! # List the built-in networks
//! treasury402 networks
//! ```
//!
//! # Environment Variables
//!
//! - `PRIVATE_KEY` - Hex private key of the paying account
//! - `TREASURY_TOKEN` - Bearer token of the platform session
//! - `TREASURY_LAST_AUTH_METHOD` - Last sign-in method, selects the default network
//! - `TREASURY_CONFIG` - Path to the TOML configuration (default: `treasury.toml`)
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! A `.env` file in the working directory is read first.

use std::sync::Arc;

use alloy_signer_local::PrivateKeySigner;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use treasury402::networks::{Currency, NetworkId, NetworkRegistry};
use treasury402::wallet::{WalletHost, WalletKind};
use treasury402_evm::LocalWallet;
use treasury402_http::{ClientConfig, NegotiationClient, PaymentContext, StaticAuth};

#[derive(Debug, Parser)]
#[command(name = "treasury402", version, about = "Unlock paid treasury content over x402")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Pay for a resource and print the unlocked content URL
    Unlock(UnlockArgs),
    /// List the built-in networks and their tokens
    Networks,
}

#[derive(Debug, Args)]
struct UnlockArgs {
    /// Resource identifier
    #[arg(long)]
    resource: String,

    /// Network to pay on (default: home network of the last sign-in method)
    #[arg(long)]
    network: Option<String>,

    /// Token symbol (default: the network's default currency)
    #[arg(long)]
    currency: Option<String>,

    /// Wallet kind the local key presents as
    #[arg(long, default_value = "metamask")]
    wallet: WalletKind,

    /// Hex private key of the paying account
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Bearer token of the platform session
    #[arg(long, env = "TREASURY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Last sign-in method
    #[arg(long, env = "TREASURY_LAST_AUTH_METHOD")]
    last_auth_method: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Unlock(args) => unlock(args).await,
        Command::Networks => {
            list_networks(&NetworkRegistry::builtin());
            Ok(())
        }
    };
    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn unlock(args: UnlockArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::load()?;
    tracing::info!(api = %config.api_base_url, "Loaded configuration");

    let registry = NetworkRegistry::builtin();
    let mut auth = args
        .token
        .map_or_else(StaticAuth::anonymous, StaticAuth::bearer);
    if let Some(method) = args.last_auth_method {
        auth = auth.with_last_auth_method(method);
    }
    let client = NegotiationClient::new(config, Arc::new(auth))?;

    let signer: PrivateKeySigner = args.private_key.trim().parse()?;
    let home = treasury402::networks::default_network_for(client.auth().last_auth_method().as_deref());
    let network = args.network.map_or(home, NetworkId::new);
    let chain_id = registry.get_network_profile(&network)?.chain_id;
    let wallet = LocalWallet::new(signer, args.wallet, chain_id);
    let host = WalletHost::single(Arc::new(wallet));

    let context = PaymentContext::new(registry, host, client)?;
    let address = context.connect_wallet(args.wallet).await?;
    tracing::info!(%address, wallet = %args.wallet, "Wallet connected");

    context.select_network(network.clone()).await?;
    if let Some(currency) = args.currency {
        context.select_currency(Currency::new(&currency)).await?;
    }

    let challenge = context.fetch_payment_info(&network, &args.resource).await?;
    tracing::info!(
        amount = %challenge.amount,
        pay_to = %challenge.pay_to,
        asset = %challenge.asset,
        network = %challenge.network,
        "Payment required"
    );

    let url = context.execute_payment().await?;
    print_line(&url);
    Ok(())
}

fn list_networks(registry: &NetworkRegistry) {
    for profile in registry.networks() {
        print_line(&format!(
            "{} ({}, chain {})",
            profile.network_id, profile.display_name, profile.chain_id
        ));
        for (currency, token) in &profile.tokens {
            let marker = if *currency == profile.default_currency { " *" } else { "" };
            print_line(&format!(
                "  {:<5} {} {} v{}{marker}",
                currency.as_str(),
                token.address,
                token.name,
                token.version
            ));
        }
    }
}

#[allow(clippy::print_stdout)]
fn print_line(line: &str) {
    println!("{line}");
}
