//! Deposit-and-borrow flow: approve the collateral if needed, then `operate` on the vault.

use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, B256, U256};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{
    signer::{SigningProvider, TransactionSigner, UnsignedTransaction},
    state::{position_from_receipt, PositionRef, TransactionState},
};
use crate::{
    abi::{encode_call, selectors, AbiArg},
    amount::decimal_to_base_units,
    config::ConfirmationConfig,
    errors::{BorrowStep, CodecError, OrchestratorError, ServiceError},
    positions::{compute_metrics, RiskMetrics, DANGER_HEALTH_FACTOR},
    price::PriceOracle,
    rpc::{ContractCall, EthRpc, TxReceipt},
    tokens::TokenService,
    vault::{VaultConfig, VaultConfigService},
};

/// Percent added on top of `eth_estimateGas`.
const GAS_BUFFER_PERCENT: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowRequest {
    pub user: Address,
    pub vault: Address,
    /// Collateral in token units.
    pub collateral_amount: Decimal,
    /// Debt in token units.
    pub borrow_amount: Decimal,
}

impl BorrowRequest {
    fn check_shape(&self) -> Result<(), ServiceError> {
        if self.user == Address::ZERO || self.vault == Address::ZERO {
            return Err(ServiceError::InvalidRequest(
                "user and vault must be non-zero addresses".into(),
            ));
        }
        if self.collateral_amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidRequest(format!(
                "collateral amount must be positive, got {}",
                self.collateral_amount
            )));
        }
        if self.borrow_amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidRequest(format!(
                "borrow amount must be positive, got {}",
                self.borrow_amount
            )));
        }
        Ok(())
    }
}

/// A request that passed validation, with the inputs it was checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowPlan {
    pub config: VaultConfig,
    pub price: Decimal,
    pub projected: RiskMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl From<&ConfirmationConfig> for ConfirmationPolicy {
    fn from(cfg: &ConfirmationConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            interval: Duration::from_millis(cfg.poll_interval_ms),
        }
    }
}

/// `operate(nftId, newCol, newDebt, to)` with positive deltas. `nft_id` zero opens a position.
pub fn operate_calldata(
    nft_id: U256,
    collateral: U256,
    debt: U256,
    to: Address,
) -> Result<String, CodecError> {
    encode_call(
        selectors::OPERATE,
        &[
            AbiArg::Uint(nft_id),
            AbiArg::Int {
                magnitude: collateral,
                negative: false,
            },
            AbiArg::Int {
                magnitude: debt,
                negative: false,
            },
            AbiArg::Address(to),
        ],
    )
}

pub fn approve_calldata(spender: Address, amount: U256) -> Result<String, CodecError> {
    encode_call(
        selectors::APPROVE,
        &[AbiArg::Address(spender), AbiArg::Uint(amount)],
    )
}

pub struct BorrowOrchestrator {
    rpc: Arc<dyn EthRpc>,
    tokens: TokenService,
    configs: Arc<VaultConfigService>,
    prices: Arc<PriceOracle>,
    signers: Arc<dyn SigningProvider>,
    price_asset: String,
    chain_id: u64,
    confirmation: ConfirmationPolicy,
    state: watch::Sender<TransactionState>,
}

impl BorrowOrchestrator {
    pub fn new(
        rpc: Arc<dyn EthRpc>,
        configs: Arc<VaultConfigService>,
        prices: Arc<PriceOracle>,
        signers: Arc<dyn SigningProvider>,
        price_asset: impl Into<String>,
        chain_id: u64,
        confirmation: ConfirmationPolicy,
    ) -> Self {
        let (state, _) = watch::channel(TransactionState::Idle);
        Self {
            tokens: TokenService::new(Arc::clone(&rpc)),
            rpc,
            configs,
            prices,
            signers,
            price_asset: price_asset.into(),
            chain_id,
            confirmation,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TransactionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> TransactionState {
        self.state.borrow().clone()
    }

    /// Back to idle from a terminal state. Returns `false` (and changes nothing) otherwise.
    pub fn reset(&self) -> bool {
        self.state.send_if_modified(|s| {
            if s.is_terminal() {
                info!(from = s.label(), "borrow state reset");
                *s = TransactionState::Idle;
                true
            } else {
                false
            }
        })
    }

    /// Checks `req` against the wallet balance and the vault risk parameters.
    pub async fn validate(&self, req: &BorrowRequest) -> Result<BorrowPlan, ServiceError> {
        req.check_shape()?;
        let (config, price) = tokio::join!(
            self.configs.fetch_vault_config(req.vault),
            self.prices.fetch_price(&self.price_asset),
        );
        let balance = self
            .tokens
            .balance_of(&config.collateral_token, req.user)
            .await?;
        if req.collateral_amount > balance.value() {
            return Err(ServiceError::InsufficientBalance {
                requested: req.collateral_amount,
                available: balance.value(),
            });
        }
        let capacity = compute_metrics(req.collateral_amount, Decimal::ZERO, price, &config.risk)?;
        if req.borrow_amount > capacity.available_to_borrow_usd {
            return Err(ServiceError::InsufficientLiquidity {
                requested: req.borrow_amount,
                available: capacity.available_to_borrow_usd,
            });
        }
        let projected = compute_metrics(req.collateral_amount, req.borrow_amount, price, &config.risk)?;
        if projected.health_factor < DANGER_HEALTH_FACTOR {
            return Err(ServiceError::UnsafeHealthFactor {
                projected: projected.health_factor,
            });
        }
        Ok(BorrowPlan {
            config,
            price,
            projected,
        })
    }

    /// Validates, then drives the flow to a terminal state and returns it.
    ///
    /// Validation failures and a flow already in progress are returned as errors without touching
    /// the state. Failures inside the flow end in [`TransactionState::Failed`].
    pub async fn execute(&self, req: &BorrowRequest) -> Result<TransactionState, ServiceError> {
        let plan = self.validate(req).await?;
        let started = self.state.send_if_modified(|s| {
            if s.is_idle() {
                *s = TransactionState::CheckingApproval;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ServiceError::InvalidRequest(format!(
                "borrow flow is {}; reset before starting another",
                self.state.borrow().label()
            )));
        }
        info!(
            user = %req.user,
            vault = %req.vault,
            collateral = %req.collateral_amount,
            borrow = %req.borrow_amount,
            projected_hf = %plan.projected.health_factor,
            "borrow started"
        );

        match self.run(req, &plan).await {
            Ok(position) => self.transition(TransactionState::Success { position }),
            Err(e) => {
                warn!(error = %e, "borrow failed");
                self.transition(TransactionState::Failed {
                    step: e.step(),
                    reason: e.user_message(),
                });
            }
        }
        Ok(self.state())
    }

    fn transition(&self, next: TransactionState) {
        self.state.send_if_modified(|s| {
            if !s.can_transition_to(&next) {
                warn!(from = s.label(), to = next.label(), "ignoring invalid borrow transition");
                return false;
            }
            info!(from = s.label(), to = next.label(), "borrow state");
            *s = next;
            true
        });
    }

    async fn run(&self, req: &BorrowRequest, plan: &BorrowPlan) -> Result<PositionRef, OrchestratorError> {
        let step = BorrowStep::CheckingApproval;
        let collateral_token = plan.config.collateral_token;
        let collateral = decimal_to_base_units(req.collateral_amount, collateral_token.decimals)
            .map_err(|e| OrchestratorError::service(step, e))?;
        let debt = decimal_to_base_units(req.borrow_amount, plan.config.debt_token.decimals)
            .map_err(|e| OrchestratorError::service(step, e))?;
        let signer = self.signer(step, req.user).await?;

        let allowance = self
            .tokens
            .allowance_raw(&collateral_token, req.user, req.vault)
            .await
            .map_err(|e| OrchestratorError::service(step, e))?;
        if allowance < collateral {
            self.transition(TransactionState::ApprovingCollateral);
            let step = BorrowStep::ApprovingCollateral;
            let data = approve_calldata(req.vault, collateral)
                .map_err(|e| OrchestratorError::service(step, e))?;
            let tx_hash = self
                .submit(step, signer.as_ref(), collateral_token.address, data)
                .await?;
            self.wait_for_confirmation(step, tx_hash).await?;
            let allowance = self
                .tokens
                .allowance_raw(&collateral_token, req.user, req.vault)
                .await
                .map_err(|e| OrchestratorError::service(step, e))?;
            if allowance < collateral {
                return Err(OrchestratorError::service(
                    step,
                    ServiceError::ApprovalRequired {
                        allowance: allowance.to_string(),
                        required: collateral.to_string(),
                    },
                ));
            }
        } else {
            debug!(allowance = %allowance, required = %collateral, "allowance covers collateral");
        }

        self.transition(TransactionState::DepositingAndBorrowing);
        let step = BorrowStep::DepositingAndBorrowing;
        let data = operate_calldata(U256::ZERO, collateral, debt, req.user)
            .map_err(|e| OrchestratorError::service(step, e))?;
        let tx_hash = self.submit(step, signer.as_ref(), req.vault, data).await?;
        let receipt = self.wait_for_confirmation(step, tx_hash).await?;
        let position = position_from_receipt(&receipt, req.user);
        info!(position_id = %position.id, source = ?position.source, tx_hash = %tx_hash, "position opened");
        Ok(position)
    }

    async fn signer(
        &self,
        step: BorrowStep,
        user: Address,
    ) -> Result<Arc<dyn TransactionSigner>, OrchestratorError> {
        match self.signers.signer_for(user).await {
            Ok(Some(s)) => Ok(s),
            Ok(None) => Err(OrchestratorError::SignerUnavailable {
                step,
                address: user.to_string(),
            }),
            Err(e) => Err(OrchestratorError::Signing {
                step,
                message: format!("{e:#}"),
            }),
        }
    }

    async fn submit(
        &self,
        step: BorrowStep,
        signer: &dyn TransactionSigner,
        to: Address,
        data: String,
    ) -> Result<B256, OrchestratorError> {
        let from = signer.address();
        let estimate = self
            .rpc
            .estimate_gas(from, &ContractCall::new(to, data.clone()))
            .await
            .map_err(|e| OrchestratorError::service(step, e))?;
        let gas_limit = estimate.saturating_mul(100 + GAS_BUFFER_PERCENT) / 100;
        let tx = UnsignedTransaction {
            from,
            to,
            data,
            value: U256::ZERO,
            chain_id: self.chain_id,
            gas_limit,
        };
        let tx_hash = signer
            .sign_and_send(tx)
            .await
            .map_err(|e| OrchestratorError::Signing {
                step,
                message: format!("{e:#}"),
            })?;
        info!(step = %step, tx_hash = %tx_hash, gas_limit, "transaction submitted");
        Ok(tx_hash)
    }

    /// Polls for the receipt up to the attempt budget. Poll errors count as attempts.
    async fn wait_for_confirmation(
        &self,
        step: BorrowStep,
        tx_hash: B256,
    ) -> Result<TxReceipt, OrchestratorError> {
        let max = self.confirmation.max_attempts;
        for attempt in 1..=max {
            match self.rpc.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.status => {
                    debug!(tx_hash = %tx_hash, attempt, block = ?receipt.block_number, "confirmed");
                    return Ok(receipt);
                }
                Ok(Some(_)) => {
                    return Err(OrchestratorError::Reverted {
                        step,
                        tx_hash: tx_hash.to_string(),
                    });
                }
                Ok(None) => debug!(tx_hash = %tx_hash, attempt, "receipt pending"),
                Err(e) => warn!(tx_hash = %tx_hash, attempt, error = %e, "receipt poll failed"),
            }
            if attempt < max {
                tokio::time::sleep(self.confirmation.interval).await;
            }
        }
        Err(OrchestratorError::ConfirmationTimeout {
            step,
            tx_hash: tx_hash.to_string(),
            attempts: max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abi::{decode_uint, layout::fixtures::vault_config_payload},
        borrow::state::PositionIdSource,
        errors::TransportError,
        rpc::RpcValue,
        testing::{call_data, call_selector, selector_hex, MockPriceFeed, MockRpc, RecordingSigner, SingleSignerProvider},
        tokens::{USDC, WETH},
        vault::SAFE_DEFAULT_RISK,
    };
    use std::{
        str::FromStr as _,
        sync::atomic::{AtomicBool, Ordering},
    };

    const HOUR: Duration = Duration::from_secs(3600);

    fn user() -> Address {
        Address::repeat_byte(0x77)
    }

    fn vault() -> Address {
        Address::repeat_byte(0x44)
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap_or_default()
    }

    fn word(v: u128) -> RpcValue {
        RpcValue::from(format!("0x{v:064x}"))
    }

    fn receipt(hash: &str, status: &str, logs: Vec<RpcValue>) -> RpcValue {
        RpcValue::object([
            ("transactionHash", RpcValue::from(hash)),
            ("status", RpcValue::from(status)),
            ("blockNumber", RpcValue::from("0x10")),
            ("logs", RpcValue::Array(logs)),
        ])
    }

    fn mint_log(id: u64) -> RpcValue {
        RpcValue::object([
            ("address", RpcValue::from(Address::repeat_byte(0x99).to_string())),
            (
                "topics",
                RpcValue::Array(vec![
                    RpcValue::from(selectors::TRANSFER_TOPIC.to_string()),
                    RpcValue::from(B256::ZERO.to_string()),
                    RpcValue::from(user().into_word().to_string()),
                    RpcValue::from(B256::from(U256::from(id)).to_string()),
                ]),
            ),
            ("data", RpcValue::from("0x")),
        ])
    }

    /// Scripted chain: 1 WETH balance, configurable allowance, receipts via `receipt_for`.
    struct Chain {
        allowance_before: u128,
        allowance_after: u128,
        receipt: Box<dyn Fn(&str) -> Result<RpcValue, TransportError> + Send + Sync>,
    }

    fn node(chain: Chain) -> Arc<MockRpc> {
        let approved = Arc::new(AtomicBool::new(false));
        Arc::new(MockRpc::new(move |method, params| match method {
            "eth_call" => {
                let sel = call_selector(params).unwrap_or_default();
                if sel == selector_hex(selectors::GET_VAULT_CONFIG) {
                    Ok(RpcValue::from(vault_config_payload(7500, 8500, 500)))
                } else if sel == selector_hex(selectors::BALANCE_OF) {
                    Ok(word(1_000_000_000_000_000_000))
                } else if sel == selector_hex(selectors::ALLOWANCE) {
                    Ok(word(if approved.load(Ordering::SeqCst) {
                        chain.allowance_after
                    } else {
                        chain.allowance_before
                    }))
                } else {
                    Ok(RpcValue::from("0x"))
                }
            }
            "eth_estimateGas" => {
                if call_data(params).is_some_and(|d| d.starts_with(&selector_hex(selectors::APPROVE))) {
                    approved.store(true, Ordering::SeqCst);
                }
                Ok(RpcValue::from("0xc350"))
            }
            "eth_getTransactionReceipt" => {
                let hash = params.first().and_then(RpcValue::as_str).unwrap_or_default();
                (chain.receipt)(hash)
            }
            other => Err(TransportError::Rpc {
                code: -32601,
                message: format!("unexpected {other}"),
            }),
        }))
    }

    fn confirmed_with_mint() -> Box<dyn Fn(&str) -> Result<RpcValue, TransportError> + Send + Sync> {
        Box::new(|hash| Ok(receipt(hash, "0x1", vec![mint_log(4242)])))
    }

    fn orchestrator(rpc: Arc<MockRpc>, signer: Arc<RecordingSigner>) -> BorrowOrchestrator {
        let configs = Arc::new(
            VaultConfigService::new(rpc.clone(), Address::repeat_byte(0x55), HOUR, SAFE_DEFAULT_RISK)
                .with_tokens(WETH, USDC),
        );
        let prices = Arc::new(PriceOracle::new(
            Arc::new(MockPriceFeed::ok(Decimal::from(4000_u32))),
            HOUR,
            Decimal::from(3000_u32),
        ));
        BorrowOrchestrator::new(
            rpc,
            configs,
            prices,
            Arc::new(SingleSignerProvider::new(signer)),
            "ethereum",
            1,
            ConfirmationPolicy {
                max_attempts: 3,
                interval: Duration::ZERO,
            },
        )
    }

    fn request(collateral: &str, borrow: &str) -> BorrowRequest {
        BorrowRequest {
            user: user(),
            vault: vault(),
            collateral_amount: d(collateral),
            borrow_amount: d(borrow),
        }
    }

    #[tokio::test]
    async fn sufficient_allowance_skips_approval() -> eyre::Result<()> {
        let rpc = node(Chain {
            allowance_before: u128::MAX,
            allowance_after: u128::MAX,
            receipt: confirmed_with_mint(),
        });
        let signer = Arc::new(RecordingSigner::new(user()));
        let o = orchestrator(rpc, Arc::clone(&signer));

        let end = o.execute(&request("0.1", "100")).await?;
        let TransactionState::Success { position } = end else {
            eyre::bail!("expected success, got {end:?}");
        };
        assert_eq!(position.id, U256::from(4242_u64));
        assert_eq!(position.source, PositionIdSource::MintLog);

        let sent = signer.sent();
        assert_eq!(sent.len(), 1, "only the operate call is sent");
        let tx = &sent[0];
        assert_eq!(tx.to, vault());
        assert_eq!(tx.gas_limit, 60_000, "50k estimate plus 20%");
        assert_eq!(
            tx.data,
            operate_calldata(
                U256::ZERO,
                decode_uint("0x16345785d8a0000")?,
                decode_uint("0x5f5e100")?,
                user()
            )?
        );
        Ok(())
    }

    #[tokio::test]
    async fn short_allowance_approves_then_borrows() -> eyre::Result<()> {
        let rpc = node(Chain {
            allowance_before: 0,
            allowance_after: 100_000_000_000_000_000,
            receipt: confirmed_with_mint(),
        });
        let signer = Arc::new(RecordingSigner::new(user()));
        let o = orchestrator(rpc, Arc::clone(&signer));
        let mut rx = o.subscribe();

        let end = o.execute(&request("0.1", "100")).await?;
        assert!(matches!(end, TransactionState::Success { .. }), "got {end:?}");
        assert!(rx.has_changed()?, "subscribers see updates");
        assert_eq!(*rx.borrow_and_update(), end);

        let sent = signer.sent();
        assert_eq!(sent.len(), 2, "approve then operate");
        assert_eq!(sent[0].to, WETH.address);
        assert_eq!(
            sent[0].data,
            approve_calldata(vault(), decode_uint("0x16345785d8a0000")?)?
        );
        assert_eq!(sent[1].to, vault());
        Ok(())
    }

    #[tokio::test]
    async fn approval_that_does_not_land_fails() -> eyre::Result<()> {
        let rpc = node(Chain {
            allowance_before: 0,
            allowance_after: 0,
            receipt: confirmed_with_mint(),
        });
        let signer = Arc::new(RecordingSigner::new(user()));
        let o = orchestrator(rpc, Arc::clone(&signer));

        let end = o.execute(&request("0.1", "100")).await?;
        let TransactionState::Failed { step, reason } = end else {
            eyre::bail!("expected failure, got {end:?}");
        };
        assert_eq!(step, BorrowStep::ApprovingCollateral);
        assert!(reason.contains("approval did not take effect"), "got: {reason}");
        assert_eq!(signer.sent().len(), 1, "operate never sent");
        Ok(())
    }

    #[tokio::test]
    async fn reverted_operate_fails_with_step() -> eyre::Result<()> {
        let rpc = node(Chain {
            allowance_before: u128::MAX,
            allowance_after: u128::MAX,
            receipt: Box::new(|hash| Ok(receipt(hash, "0x0", vec![]))),
        });
        let o = orchestrator(rpc, Arc::new(RecordingSigner::new(user())));

        let end = o.execute(&request("0.1", "100")).await?;
        let TransactionState::Failed { step, reason } = end else {
            eyre::bail!("expected failure, got {end:?}");
        };
        assert_eq!(step, BorrowStep::DepositingAndBorrowing);
        assert!(reason.contains("reverted"), "got: {reason}");
        Ok(())
    }

    #[tokio::test]
    async fn pending_receipt_times_out_after_budget() -> eyre::Result<()> {
        let rpc = node(Chain {
            allowance_before: u128::MAX,
            allowance_after: u128::MAX,
            receipt: Box::new(|_| Ok(RpcValue::Null)),
        });
        let o = orchestrator(rpc.clone(), Arc::new(RecordingSigner::new(user())));

        let end = o.execute(&request("0.1", "100")).await?;
        assert!(
            matches!(end, TransactionState::Failed { step: BorrowStep::DepositingAndBorrowing, .. }),
            "got {end:?}"
        );
        assert_eq!(rpc.count("eth_getTransactionReceipt"), 3, "bounded by max_attempts");
        Ok(())
    }

    #[tokio::test]
    async fn receipt_poll_errors_are_retried() -> eyre::Result<()> {
        let polls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = Arc::clone(&polls);
        let rpc = node(Chain {
            allowance_before: u128::MAX,
            allowance_after: u128::MAX,
            receipt: Box::new(move |hash| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TransportError::AllEndpointsFailed {
                        method: "eth_getTransactionReceipt".into(),
                    })
                } else {
                    Ok(receipt(hash, "0x1", vec![]))
                }
            }),
        });
        let o = orchestrator(rpc, Arc::new(RecordingSigner::new(user())));

        let end = o.execute(&request("0.1", "100")).await?;
        let TransactionState::Success { position } = end else {
            eyre::bail!("expected success, got {end:?}");
        };
        assert_eq!(position.source, PositionIdSource::TxHash, "no mint log in receipt");
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn missing_signer_fails_checking_approval() -> eyre::Result<()> {
        let rpc = node(Chain {
            allowance_before: u128::MAX,
            allowance_after: u128::MAX,
            receipt: confirmed_with_mint(),
        });
        let o = orchestrator(rpc, Arc::new(RecordingSigner::new(Address::repeat_byte(0x01))));

        let end = o.execute(&request("0.1", "100")).await?;
        let TransactionState::Failed { step, reason } = end else {
            eyre::bail!("expected failure, got {end:?}");
        };
        assert_eq!(step, BorrowStep::CheckingApproval);
        assert!(reason.contains("not available for signing"), "got: {reason}");
        Ok(())
    }

    #[tokio::test]
    async fn signing_failure_is_reported() -> eyre::Result<()> {
        let rpc = node(Chain {
            allowance_before: u128::MAX,
            allowance_after: u128::MAX,
            receipt: confirmed_with_mint(),
        });
        let o = orchestrator(rpc, Arc::new(RecordingSigner::failing(user(), "user rejected")));

        let end = o.execute(&request("0.1", "100")).await?;
        let TransactionState::Failed { reason, .. } = end else {
            eyre::bail!("expected failure, got {end:?}");
        };
        assert!(reason.contains("user rejected"), "got: {reason}");
        Ok(())
    }

    #[tokio::test]
    async fn validation_failures_never_enter_the_flow() -> eyre::Result<()> {
        let rpc = node(Chain {
            allowance_before: u128::MAX,
            allowance_after: u128::MAX,
            receipt: confirmed_with_mint(),
        });
        let o = orchestrator(rpc, Arc::new(RecordingSigner::new(user())));

        let zero = o.execute(&request("0", "100")).await;
        assert!(matches!(zero, Err(ServiceError::InvalidRequest(_))), "got {zero:?}");

        let too_much = o.execute(&request("2", "100")).await;
        assert!(
            matches!(too_much, Err(ServiceError::InsufficientBalance { .. })),
            "balance is 1 WETH, got {too_much:?}"
        );

        // 0.1 WETH at 4000 allows 300 USD.
        let over_ltv = o.execute(&request("0.1", "301")).await;
        assert!(
            matches!(over_ltv, Err(ServiceError::InsufficientLiquidity { .. })),
            "got {over_ltv:?}"
        );

        // hf = 340 / 290 < 1.2 while still under max LTV.
        let unsafe_hf = o.execute(&request("0.1", "290")).await;
        assert!(
            matches!(unsafe_hf, Err(ServiceError::UnsafeHealthFactor { .. })),
            "got {unsafe_hf:?}"
        );

        assert_eq!(o.state(), TransactionState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn terminal_state_blocks_until_reset() -> eyre::Result<()> {
        let rpc = node(Chain {
            allowance_before: u128::MAX,
            allowance_after: u128::MAX,
            receipt: confirmed_with_mint(),
        });
        let o = orchestrator(rpc, Arc::new(RecordingSigner::new(user())));

        assert!(!o.reset(), "idle is not terminal");
        o.execute(&request("0.1", "100")).await?;
        assert!(o.state().is_terminal());

        let again = o.execute(&request("0.1", "100")).await;
        assert!(matches!(again, Err(ServiceError::InvalidRequest(_))), "got {again:?}");

        assert!(o.reset());
        assert_eq!(o.state(), TransactionState::Idle);
        let end = o.execute(&request("0.1", "100")).await?;
        assert!(matches!(end, TransactionState::Success { .. }), "got {end:?}");
        Ok(())
    }

    #[test]
    fn operate_calldata_encodes_positive_deltas() -> eyre::Result<()> {
        let data = operate_calldata(U256::ZERO, U256::from(5_u64), U256::from(7_u64), user())?;
        assert_eq!(
            data,
            format!(
                "0x032d2276{:064x}{:064x}{:064x}{:0>64}",
                0,
                5,
                7,
                "77".repeat(20)
            )
        );
        Ok(())
    }

    #[test]
    fn confirmation_policy_from_config() {
        let p = ConfirmationPolicy::from(&ConfirmationConfig {
            max_attempts: 0,
            poll_interval_ms: 250,
        });
        assert_eq!(p.max_attempts, 1, "at least one poll");
        assert_eq!(p.interval, Duration::from_millis(250));
    }
}
