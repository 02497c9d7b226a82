mod error;

pub use error::{DeploymentError, DeploymentOutcome};

use std::{sync::Arc, time::Duration};

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, U256},
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use moka::future::Cache;
use relay_aa_core::{
    account_factory::{AccountInit, resolve_init_code},
    smart_account::DeterminedSmartAccount,
    userop::{
        builder::{UserOpBuilder, UserOpBuilderConfig},
        call_data::CallDataEncoder,
        hasher::{HashSource, OperationHasher},
        nonce::NonceResolver,
        paymaster::PaymasterDataBuilder,
        sender_lock::{SenderGuard, SenderLocks},
    },
};
use relay_aa_types::{DeploymentStatus, GasOverrides, Operation, OperationHash};
use relay_core::{
    abi::AbiRegistry,
    chain::Chain,
    credentials::SessionKey,
    entrypoint::EntryPointReader,
    error::RelayError,
    rpc_clients::{OutcomeReport, RecordBackend},
    signer::SessionKeySigner,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    poller::{PollOutcome, StatusPoller},
    reconcile::{HashReconciler, ReconcileOutcome},
};

/// One target contract call to route through `sender`.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub sender: Address,
    pub contract: Address,
    pub function: String,
    pub args: Vec<DynSolValue>,
    /// Factory call used when `sender` has no code yet.
    pub account_init: Option<AccountInit>,
    pub gas_overrides: Option<GasOverrides>,
}

/// Step a fatal error happened in, with the error itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReason {
    pub step: DeploymentStatus,
    pub error: RelayError,
}

/// Progress of one logical action. Every intermediate value is kept so a
/// failure can be diagnosed and a retry resumes at the failed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub id: Uuid,
    pub target: String,
    pub sender: Address,
    pub status: DeploymentStatus,
    pub init_code: Option<Bytes>,
    pub session_key: Option<Address>,
    pub call_data: Option<Bytes>,
    pub nonce: Option<U256>,
    pub operation: Option<Operation>,
    pub client_hash: Option<OperationHash>,
    pub hash_source: Option<HashSource>,
    pub signature: Option<Bytes>,
    pub relayer_hash: Option<OperationHash>,
    pub link: Option<ReconcileOutcome>,
    pub tx_hash: Option<B256>,
    pub failure: Option<FailureReason>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn new(target: impl Into<String>, sender: Address) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            sender,
            status: DeploymentStatus::NotStarted,
            init_code: None,
            session_key: None,
            call_data: None,
            nonce: None,
            operation: None,
            client_hash: None,
            hash_source: None,
            signature: None,
            relayer_hash: None,
            link: None,
            tx_hash: None,
            failure: None,
            message: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn report(&self) -> OutcomeReport {
        OutcomeReport {
            record_id: self.id,
            target: self.target.clone(),
            sender: self.sender,
            status: self.status,
            nonce: self.nonce,
            client_hash: self.client_hash,
            relayer_hash: self.relayer_hash,
            tx_hash: self.tx_hash,
            signature: self.signature.clone(),
            message: self.message.clone(),
        }
    }
}

fn missing(field: &str) -> RelayError {
    RelayError::InternalError {
        message: format!("deployment record has no {field}"),
    }
}

const MAX_SESSION_KEYS: u64 = 10_000;
const DEFAULT_SESSION_KEY_IDLE: Duration = Duration::from_secs(6 * 3_600);

fn session_key_cache(idle: Duration) -> Cache<Address, SessionKey> {
    Cache::builder()
        .max_capacity(MAX_SESSION_KEYS)
        .time_to_idle(idle)
        .build()
}

/// Drives deployment records of one target through their lifecycle.
pub struct DeploymentOrchestrator<C: Chain> {
    name: String,
    chain: Arc<C>,
    encoder: CallDataEncoder,
    signer: SessionKeySigner,
    reconciler: HashReconciler,
    poller: StatusPoller,
    locks: SenderLocks,
    session_keys: Cache<Address, SessionKey>,
    issue_session_keys: bool,
}

impl<C: Chain> DeploymentOrchestrator<C> {
    pub fn new(name: impl Into<String>, chain: Arc<C>, registry: Arc<AbiRegistry>) -> Self {
        let poller = StatusPoller::from_config(&chain.target().poll);
        Self {
            name: name.into(),
            chain,
            encoder: CallDataEncoder::new(registry),
            signer: SessionKeySigner::new(),
            reconciler: HashReconciler::new(),
            poller,
            locks: SenderLocks::new(),
            session_keys: session_key_cache(DEFAULT_SESSION_KEY_IDLE),
            issue_session_keys: true,
        }
    }

    /// Share sender locks with other orchestrators submitting for the same senders.
    pub fn with_sender_locks(mut self, locks: SenderLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_poller(mut self, poller: StatusPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Forget held session keys unused for `idle`.
    pub fn with_session_key_idle(mut self, idle: Duration) -> Self {
        self.session_keys = session_key_cache(idle);
        self
    }

    /// Whether missing or expired keys are fetched from the backend of record.
    pub fn with_session_key_issuance(mut self, enabled: bool) -> Self {
        self.issue_session_keys = enabled;
        self
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// Hold an operator supplied key for its account.
    pub async fn install_session_key(&self, key: SessionKey) {
        tracing::debug!(
            account = ?key.account,
            signer = ?key.address(),
            expires_at = %key.expires_at,
            "Installed session key"
        );
        self.session_keys.insert(key.account, key).await;
    }

    pub fn new_record(&self, request: &DeploymentRequest) -> DeploymentRecord {
        DeploymentRecord::new(self.name.clone(), request.sender)
    }

    /// Run `record` from its current status until a terminal answer, an
    /// exhausted polling budget, cancellation, or an error.
    ///
    /// Fatal errors leave the record `Failed`. Retryable errors leave it at
    /// the step that failed, so running it again resumes there.
    #[tracing::instrument(skip_all, fields(record_id = %record.id, deployment = %self.name))]
    pub async fn run(
        &self,
        record: &mut DeploymentRecord,
        request: &DeploymentRequest,
        cancel: &CancellationToken,
    ) -> Result<DeploymentOutcome, DeploymentError> {
        if record.status.is_terminal() {
            return Err(DeploymentError::AlreadyTerminal {
                status: record.status,
            });
        }

        let mut guard: Option<SenderGuard> = None;

        loop {
            let step = record.status;

            match self.advance(record, request, &mut guard, cancel).await {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => {
                    if record.status != step {
                        record.updated_at = Utc::now();
                        tracing::info!(from = ?step, to = ?record.status, "Deployment advanced");
                    }
                }
                Err(error) => return Err(self.fail(record, step, error).await),
            }
        }
    }

    /// Run every request as its own record. Records of the same sender
    /// serialize on the sender lock, others proceed concurrently.
    pub async fn run_bulk(
        &self,
        requests: Vec<DeploymentRequest>,
        cancel: &CancellationToken,
    ) -> Vec<(DeploymentRecord, Result<DeploymentOutcome, DeploymentError>)> {
        tracing::info!(deployment = %self.name, count = requests.len(), "Starting bulk run");

        let runs = requests.into_iter().map(|request| async move {
            let mut record = self.new_record(&request);
            let result = self.run(&mut record, &request, cancel).await;
            (record, result)
        });

        join_all(runs).await
    }

    async fn advance(
        &self,
        record: &mut DeploymentRecord,
        request: &DeploymentRequest,
        guard: &mut Option<SenderGuard>,
        cancel: &CancellationToken,
    ) -> Result<Option<DeploymentOutcome>, RelayError> {
        match record.status {
            DeploymentStatus::NotStarted => {
                record.status = DeploymentStatus::CheckingRequirements;
            }
            DeploymentStatus::CheckingRequirements => {
                self.check_requirements(record, request).await?;
                record.status = DeploymentStatus::CreatingSessionKey;
            }
            DeploymentStatus::CreatingSessionKey => {
                let key = self.session_key(request.sender).await?;
                record.session_key = Some(key.address());
                record.status = if record.operation.is_some() {
                    DeploymentStatus::Signing
                } else {
                    DeploymentStatus::PreparingCallData
                };
            }
            DeploymentStatus::PreparingCallData => {
                let account = DeterminedSmartAccount {
                    address: request.sender,
                };
                let call = self.encoder.encode(
                    &account,
                    request.contract,
                    &request.function,
                    &request.args,
                )?;
                record.call_data = Some(call.execute);
                record.status = DeploymentStatus::CreatingOperation;
            }
            DeploymentStatus::CreatingOperation => {
                let state = match guard.take() {
                    Some(state) => state,
                    None => self.locks.acquire(self.chain.chain_id(), request.sender).await,
                };
                self.create_operation(record, request, &state).await?;
                *guard = Some(state);
                record.status = DeploymentStatus::Signing;
            }
            DeploymentStatus::Signing => {
                if !self.sign(record, request).await? {
                    record.status = DeploymentStatus::CreatingSessionKey;
                    return Ok(None);
                }
                record.status = DeploymentStatus::Submitting;
            }
            DeploymentStatus::Submitting => {
                let state = match guard.take() {
                    Some(state) => state,
                    None => self.locks.acquire(self.chain.chain_id(), request.sender).await,
                };
                if !self.submit(record, state).await? {
                    record.status = DeploymentStatus::CreatingOperation;
                    return Ok(None);
                }
                record.status = DeploymentStatus::WaitingConfirmation;
            }
            DeploymentStatus::WaitingConfirmation => {
                return self.wait_for_confirmation(record, cancel).await.map(Some);
            }
            DeploymentStatus::Success | DeploymentStatus::Failed => {
                return Err(RelayError::InternalError {
                    message: format!("no step follows {:?}", record.status),
                });
            }
        }

        Ok(None)
    }

    async fn check_requirements(
        &self,
        record: &mut DeploymentRecord,
        request: &DeploymentRequest,
    ) -> Result<(), RelayError> {
        if request.sender == Address::ZERO {
            return Err(RelayError::ValidationError {
                message: "sender must not be the zero address".to_string(),
            });
        }
        if self.encoder.registry().function(&request.function).is_none() {
            return Err(RelayError::EncodingError {
                function: request.function.clone(),
                message: "function is not registered".to_string(),
            });
        }

        let account = DeterminedSmartAccount {
            address: request.sender,
        };
        let init_code = resolve_init_code(
            &account,
            request.account_init.as_ref(),
            self.chain.entrypoint(),
        )
        .await?;

        record.init_code = Some(init_code);
        Ok(())
    }

    /// Active key for `account`, issued by the backend when missing or expired.
    async fn session_key(&self, account: Address) -> Result<SessionKey, RelayError> {
        let now = Utc::now();

        if let Some(key) = self.session_keys.get(&account).await {
            if !key.is_expired_at(now) {
                return Ok(key);
            }
            if !self.issue_session_keys {
                key.ensure_active(now)?;
            }
        }

        if !self.issue_session_keys {
            return Err(RelayError::ValidationError {
                message: format!("no session key held for {account}"),
            });
        }

        let grant = self.chain.backend().issue_session_key(account).await?;
        let key = SessionKey::from_grant(&grant, now)?;
        if key.account != account {
            return Err(RelayError::ValidationError {
                message: format!(
                    "session key issued for {} instead of {account}",
                    key.account
                ),
            });
        }
        key.ensure_active(now)?;

        tracing::info!(
            account = ?account,
            signer = ?key.address(),
            expires_at = %key.expires_at,
            "Issued session key"
        );

        self.session_keys.insert(account, key.clone()).await;
        Ok(key)
    }

    async fn create_operation(
        &self,
        record: &mut DeploymentRecord,
        request: &DeploymentRequest,
        state: &SenderGuard,
    ) -> Result<(), RelayError> {
        let target = self.chain.target();
        let reader = self.chain.entrypoint();

        let chain_nonce = NonceResolver::new(reader).resolve(request.sender).await?;
        let nonce = state.reserve(chain_nonce);
        if nonce != chain_nonce {
            tracing::debug!(
                sender = ?request.sender,
                chain_nonce = %chain_nonce,
                nonce = %nonce,
                "Chain nonce lags submitted operations, reserving next nonce"
            );
        }

        let paymaster_and_data = PaymasterDataBuilder::new(target.paymaster).build(Utc::now())?;
        let call_data = record.call_data.clone().ok_or_else(|| missing("call data"))?;

        let op = UserOpBuilder::new(UserOpBuilderConfig {
            sender: request.sender,
            nonce,
            init_code: record.init_code.clone().unwrap_or_default(),
            call_data,
            gas: target.gas,
            gas_overrides: request.gas_overrides,
            paymaster_and_data,
        })
        .build();

        let hashed = OperationHasher::new(reader, self.chain.chain_id(), target.hash_scheme())
            .hash(&op)
            .await?;

        tracing::debug!(
            sender = ?request.sender,
            nonce = %nonce,
            client_hash = ?hashed.hash,
            hash_source = ?hashed.source,
            "Operation created"
        );

        record.nonce = Some(nonce);
        record.operation = Some(op);
        record.client_hash = Some(hashed.hash);
        record.hash_source = Some(hashed.source);
        record.signature = None;
        Ok(())
    }

    /// Sign the operation. `false` when the held key expired and a new one
    /// must be issued first.
    async fn sign(
        &self,
        record: &mut DeploymentRecord,
        request: &DeploymentRequest,
    ) -> Result<bool, RelayError> {
        let client_hash = record.client_hash.ok_or_else(|| missing("client hash"))?;
        let now = Utc::now();

        let held = self.session_keys.get(&request.sender).await;
        let key = match held {
            Some(key) if !key.is_expired_at(now) => key,
            _ if self.issue_session_keys => {
                tracing::info!(sender = ?request.sender, "Session key expired before signing");
                return Ok(false);
            }
            Some(key) => key,
            None => {
                return Err(RelayError::ValidationError {
                    message: format!("no session key held for {}", request.sender),
                });
            }
        };

        let signature = self.signer.sign_at(client_hash, &key, now)?;

        let op = record.operation.as_mut().ok_or_else(|| missing("operation"))?;
        op.signature = signature.clone();
        record.session_key = Some(key.address());
        record.signature = Some(signature);
        Ok(true)
    }

    /// Submit while holding the sender lock. `false` when another flow took
    /// the reserved nonce in the meantime.
    async fn submit(
        &self,
        record: &mut DeploymentRecord,
        mut state: SenderGuard,
    ) -> Result<bool, RelayError> {
        let nonce = record.nonce.ok_or_else(|| missing("nonce"))?;
        let client_hash = record.client_hash.ok_or_else(|| missing("client hash"))?;
        let op = record.operation.as_ref().ok_or_else(|| missing("operation"))?;

        if state.last_submitted().is_some_and(|last| last >= nonce) {
            tracing::warn!(
                sender = ?record.sender,
                nonce = %nonce,
                last_submitted = ?state.last_submitted(),
                "Reserved nonce already used by another submission, rebuilding operation"
            );
            return Ok(false);
        }

        let bundler = self.chain.bundler_client();
        let response = bundler
            .submit(
                op,
                client_hash,
                self.chain.entrypoint().address(),
                self.chain.chain_id(),
            )
            .await?;

        state.mark_submitted(nonce);
        drop(state);

        let relayer_hash = response.relayer_hash.unwrap_or(client_hash);
        if relayer_hash != client_hash {
            tracing::warn!(
                client_hash = ?client_hash,
                relayer_hash = ?relayer_hash,
                "Relayer assigned a different operation hash"
            );
        }

        record.relayer_hash = Some(relayer_hash);
        record.tx_hash = response.tx_hash;
        record.link = Some(
            self.reconciler
                .reconcile(bundler, client_hash, Some(relayer_hash), record.sender)
                .await,
        );
        Ok(true)
    }

    async fn wait_for_confirmation(
        &self,
        record: &mut DeploymentRecord,
        cancel: &CancellationToken,
    ) -> Result<DeploymentOutcome, RelayError> {
        let client_hash = record.client_hash.ok_or_else(|| missing("client hash"))?;

        let polled = self
            .poller
            .poll(
                self.chain.bundler_client(),
                self.chain.backend(),
                client_hash,
                record.relayer_hash,
                cancel,
            )
            .await;

        match polled {
            PollOutcome::Success { tx_hash, .. } => {
                record.tx_hash = tx_hash.or(record.tx_hash);
                self.finish(record, DeploymentStatus::Success).await;
                Ok(DeploymentOutcome::Confirmed {
                    tx_hash: record.tx_hash,
                })
            }
            PollOutcome::Failed { message, .. } => {
                record.message = message.clone();
                self.finish(record, DeploymentStatus::Failed).await;
                Ok(DeploymentOutcome::Reverted { message })
            }
            PollOutcome::Exhausted { attempts } => Ok(DeploymentOutcome::StillPending { attempts }),
            PollOutcome::Cancelled { .. } => Ok(DeploymentOutcome::Cancelled),
        }
    }

    async fn fail(
        &self,
        record: &mut DeploymentRecord,
        step: DeploymentStatus,
        error: RelayError,
    ) -> DeploymentError {
        let error = DeploymentError::from_step(step, error);

        match &error {
            DeploymentError::Fatal { error: cause, .. } => {
                tracing::error!(step = ?step, error = %cause, "Deployment failed");
                record.failure = Some(FailureReason {
                    step,
                    error: cause.clone(),
                });
                record.message = Some(cause.to_string());
                self.finish(record, DeploymentStatus::Failed).await;
            }
            _ => {
                tracing::warn!(step = ?step, error = %error, "Deployment step failed, retry possible");
            }
        }

        error
    }

    async fn finish(&self, record: &mut DeploymentRecord, status: DeploymentStatus) {
        record.status = status;
        record.updated_at = Utc::now();

        tracing::info!(
            status = ?status,
            client_hash = ?record.client_hash,
            relayer_hash = ?record.relayer_hash,
            tx_hash = ?record.tx_hash,
            "Deployment finished"
        );

        if let Err(e) = self.chain.backend().record_outcome(&record.report()).await {
            tracing::warn!(error = %e, "Failed to persist deployment outcome");
        }
    }
}
