#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use std::sync::Arc;

use borrowkit::{
    borrow::{BorrowOrchestrator, BorrowRequest, ConfirmationPolicy, NoSigner},
    config::{parse_address, BorrowkitConfig},
    paths::BorrowkitPaths,
    positions::{positions_calldata, PositionResolver},
    price::{CoinGeckoFeed, PriceOracle},
    rpc::{EthRpc, RpcTransport},
    store::ConfigStore,
    tokens::{TokenService, KNOWN_TOKENS},
    vault::{VaultConfigService, SAFE_DEFAULT_RISK},
};
use clap::{Parser, Subcommand};
use eyre::Context as _;
use rust_decimal::Decimal;
use serde_json::json;
use tracing_subscriber::prelude::*;

mod cli_output;

#[derive(Parser, Debug)]
#[command(name = "borrowkit", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the effective config to `config.toml` and print its path.
    Init,
    /// Print the encoded `positionsByUser(address)` calldata. Offline.
    Calldata {
        #[arg(long)]
        wallet: String,
    },
    /// Read a wallet's positions from the vault resolver.
    Positions {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        rpc_url: Option<String>,
        #[arg(long)]
        resolver: Option<String>,
        /// Skip TLS certificate verification.
        #[arg(long)]
        insecure: bool,
        /// Print the undecoded `eth_call` result.
        #[arg(long)]
        raw: bool,
    },
    /// Balances of the built-in token set.
    Balances {
        #[arg(long)]
        wallet: String,
    },
    /// Risk parameters of the configured vault.
    VaultConfig,
    /// Latest block number from the configured endpoints.
    BlockNumber,
    /// Validate a deposit-and-borrow against balance and vault risk limits. Sends nothing.
    CheckBorrow {
        #[arg(long)]
        wallet: String,
        /// Collateral in token units.
        #[arg(long)]
        collateral: Decimal,
        /// Debt in token units.
        #[arg(long)]
        borrow: Decimal,
    },
}

fn init_logging(paths: &BorrowkitPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("borrowkit.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

/// Services shared by the networked commands.
struct Engine {
    cfg: BorrowkitConfig,
    rpc: Arc<dyn EthRpc>,
    configs: Arc<VaultConfigService>,
    prices: Arc<PriceOracle>,
}

impl Engine {
    fn new(cfg: BorrowkitConfig) -> eyre::Result<Self> {
        let transport = RpcTransport::from_config(&cfg.rpc).context("rpc transport")?;
        let rpc: Arc<dyn EthRpc> = Arc::new(transport);
        let configs = Arc::new(VaultConfigService::new(
            Arc::clone(&rpc),
            cfg.market.resolver()?,
            cfg.cache.vault_config_ttl(),
            SAFE_DEFAULT_RISK,
        ));
        let prices = Arc::new(PriceOracle::new(
            Arc::new(CoinGeckoFeed::new(&cfg.http)?),
            cfg.cache.price_ttl(),
            cfg.cache.default_price,
        ));
        Ok(Self {
            cfg,
            rpc,
            configs,
            prices,
        })
    }

    fn resolver(&self) -> eyre::Result<PositionResolver> {
        Ok(PositionResolver::new(
            Arc::clone(&self.rpc),
            self.cfg.market.resolver()?,
            self.cfg.market.vault()?,
            self.cfg.market.price_asset.clone(),
            Arc::clone(&self.configs),
            Arc::clone(&self.prices),
        ))
    }
}

async fn positions(
    mut cfg: BorrowkitConfig,
    wallet: &str,
    rpc_url: Option<String>,
    resolver: Option<String>,
    insecure: bool,
    raw: bool,
) -> eyre::Result<()> {
    let wallet = parse_address(wallet).context("--wallet")?;
    if let Some(url) = rpc_url {
        cfg.rpc.url = url;
    }
    if let Some(r) = resolver {
        parse_address(&r).context("--resolver")?;
        cfg.market.resolver_address = r;
    }
    cfg.rpc.insecure |= insecure;

    let engine = Engine::new(cfg)?;
    let resolver = engine.resolver()?;
    let header = json!({
        "rpc_url": engine.cfg.rpc.url,
        "resolver": engine.cfg.market.resolver()?.to_string(),
        "wallet": wallet.to_string(),
        "calldata": positions_calldata(wallet)?,
    });
    let body = if raw {
        json!({ "result": resolver.fetch_raw_hex(wallet).await? })
    } else {
        json!({ "positions": resolver.fetch_positions(wallet).await? })
    };
    cli_output::print_json(&json!({ "request": header, "response": body }))
}

async fn check_borrow(
    cfg: BorrowkitConfig,
    wallet: &str,
    collateral: Decimal,
    borrow: Decimal,
) -> eyre::Result<()> {
    let user = parse_address(wallet).context("--wallet")?;
    let engine = Engine::new(cfg)?;
    let request = BorrowRequest {
        user,
        vault: engine.cfg.market.vault()?,
        collateral_amount: collateral,
        borrow_amount: borrow,
    };
    let orchestrator = BorrowOrchestrator::new(
        Arc::clone(&engine.rpc),
        Arc::clone(&engine.configs),
        Arc::clone(&engine.prices),
        Arc::new(NoSigner),
        engine.cfg.market.price_asset.clone(),
        engine.cfg.rpc.chain_id,
        ConfirmationPolicy::from(&engine.cfg.confirmation),
    );
    let plan = orchestrator.validate(&request).await?;
    cli_output::print_json(&json!({
        "wallet": user.to_string(),
        "price": plan.price,
        "vault_config": plan.config,
        "projected": plan.projected,
    }))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = BorrowkitPaths::discover()?;
    std::fs::create_dir_all(&paths.data_dir).context("create data dir")?;
    let _log_guard = init_logging(&paths);
    let store = ConfigStore::new(&paths);
    let cfg = store.load()?;

    match cli.cmd {
        Command::Init => {
            store.save(&cfg)?;
            cli_output::print_json(&json!({
                "config_file": store.path(),
                "data_dir": paths.data_dir,
                "log_file": paths.log_file,
            }))
        }
        Command::Calldata { wallet } => {
            let wallet = parse_address(&wallet).context("--wallet")?;
            cli_output::print_json(&json!({
                "wallet": wallet.to_string(),
                "calldata": positions_calldata(wallet)?,
            }))
        }
        Command::Positions {
            wallet,
            rpc_url,
            resolver,
            insecure,
            raw,
        } => positions(cfg, &wallet, rpc_url, resolver, insecure, raw)
            .await
            .context("positions failed"),
        Command::Balances { wallet } => {
            let wallet = parse_address(&wallet).context("--wallet")?;
            let engine = Engine::new(cfg)?;
            let balances = TokenService::new(Arc::clone(&engine.rpc))
                .balances_of(&KNOWN_TOKENS, wallet)
                .await
                .context("balances failed")?;
            cli_output::print_json(&balances)
        }
        Command::VaultConfig => {
            let engine = Engine::new(cfg)?;
            let vault = engine.cfg.market.vault()?;
            cli_output::print_json(&engine.configs.fetch_vault_config(vault).await)
        }
        Command::BlockNumber => {
            let transport = RpcTransport::from_config(&cfg.rpc).context("rpc transport")?;
            let endpoints: Vec<String> =
                transport.endpoints().iter().map(ToString::to_string).collect();
            let (chain_id, block, gas_price) = tokio::try_join!(
                transport.chain_id(),
                transport.block_number(),
                transport.gas_price(),
            )
            .context("block number failed")?;
            cli_output::print_json(&json!({
                "endpoints": endpoints,
                "chain_id": chain_id,
                "block_number": block,
                "gas_price_wei": gas_price.to_string(),
            }))
        }
        Command::CheckBorrow {
            wallet,
            collateral,
            borrow,
        } => check_borrow(cfg, &wallet, collateral, borrow)
            .await
            .context("check-borrow failed"),
    }
}
