//! Common test utilities shared across integration tests.
#![allow(dead_code, missing_docs)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use paperwallet_core::chain::{
    encode_transfer, ChainClient, ChainError, SimulatedCall, TokenUnit, TxReceipt,
};
use paperwallet_core::credential::{KdfParams, UnlockedAccount};
use paperwallet_core::provisioning::{ProvisioningMachine, ProvisioningObserver, ProvisioningStep};
use paperwallet_core::registration::{
    Registrar, RegistrationError, RegistrationInfo, RegistrationRequest,
};
use paperwallet_core::transport::{NfcAdapter, NfcTag, QrAdapter, QrSurface, TransportError};
use uuid::Uuid;

/// Cheap Argon2id parameters so tests run fast.
pub const FAST_KDF: KdfParams = KdfParams {
    m_cost_kib: 64,
    t_cost: 1,
    p_cost: 1,
};

pub const NFC_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory NFC tag that records every write attempt.
pub struct RecordingTag {
    supported: bool,
    contents: Mutex<Option<Vec<u8>>>,
    write_attempts: Mutex<Vec<Vec<u8>>>,
    write_failures: Mutex<VecDeque<TransportError>>,
    land_failed_writes: bool,
    sessions_open: AtomicUsize,
}

impl RecordingTag {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(true, None, false))
    }

    pub fn unsupported() -> Arc<Self> {
        Arc::new(Self::build(false, None, false))
    }

    pub fn holding(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self::build(true, Some(bytes), false))
    }

    /// A tag whose failed writes still store the payload, as when the connection drops after
    /// the tag committed.
    pub fn landing_failed_writes() -> Arc<Self> {
        Arc::new(Self::build(true, None, true))
    }

    fn build(supported: bool, contents: Option<Vec<u8>>, land_failed_writes: bool) -> Self {
        Self {
            supported,
            contents: Mutex::new(contents),
            write_attempts: Mutex::new(Vec::new()),
            write_failures: Mutex::new(VecDeque::new()),
            land_failed_writes,
            sessions_open: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_write(&self, error: TransportError) {
        self.write_failures.lock().unwrap().push_back(error);
    }

    pub fn write_attempts(&self) -> Vec<Vec<u8>> {
        self.write_attempts.lock().unwrap().clone()
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents.lock().unwrap().clone()
    }

    pub fn sessions_open(&self) -> usize {
        self.sessions_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NfcTag for RecordingTag {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn begin_session(&self) -> Result<(), TransportError> {
        self.sessions_open.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn end_session(&self) {
        self.sessions_open.fetch_sub(1, Ordering::SeqCst);
    }

    async fn read_tag(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.contents())
    }

    async fn write_tag(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.write_attempts.lock().unwrap().push(payload.clone());
        let failure = self.write_failures.lock().unwrap().pop_front();
        match failure {
            Some(error) => {
                if self.land_failed_writes {
                    *self.contents.lock().unwrap() = Some(payload);
                }
                Err(error)
            }
            None => {
                *self.contents.lock().unwrap() = Some(payload);
                Ok(())
            }
        }
    }
}

/// Camera that plays back scripted frames and records rendered codes.
#[derive(Default)]
pub struct ScriptedCamera {
    frames: Mutex<VecDeque<Option<String>>>,
    rendered: Mutex<Vec<String>>,
    render_failures: Mutex<VecDeque<TransportError>>,
    open: AtomicUsize,
}

impl ScriptedCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn showing(frames: Vec<Option<String>>) -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(frames.into()),
            ..Self::default()
        })
    }

    pub fn fail_next_render(&self, error: TransportError) {
        self.render_failures.lock().unwrap().push_back(error);
    }

    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl QrSurface for ScriptedCamera {
    fn open_camera(&self) -> Result<(), TransportError> {
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close_camera(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }

    async fn next_frame(&self) -> Result<Option<String>, TransportError> {
        let frame = self.frames.lock().unwrap().pop_front();
        match frame {
            Some(frame) => Ok(frame),
            None => Err(TransportError::DeviceUnavailable {
                reason: "feed ended".to_string(),
            }),
        }
    }

    async fn render(&self, text: String) -> Result<(), TransportError> {
        let failure = self.render_failures.lock().unwrap().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        self.rendered.lock().unwrap().push(text);
        Ok(())
    }
}

/// Registrar answering from a script; succeeds with an empty info once the script runs out.
#[derive(Default)]
pub struct ScriptedRegistrar {
    responses: Mutex<VecDeque<Result<RegistrationInfo, RegistrationError>>>,
    requests: Mutex<Vec<RegistrationRequest>>,
}

impl ScriptedRegistrar {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answering(
        responses: Vec<Result<RegistrationInfo, RegistrationError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<RegistrationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Registrar for ScriptedRegistrar {
    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationInfo, RegistrationError> {
        self.requests.lock().unwrap().push(request.clone());
        let response = self.responses.lock().unwrap().pop_front();
        response.unwrap_or_else(|| Ok(RegistrationInfo::default()))
    }
}

/// Records every step a machine passes through.
#[derive(Default)]
pub struct StepLog {
    steps: Mutex<Vec<(Uuid, ProvisioningStep)>>,
}

impl StepLog {
    pub fn steps(&self) -> Vec<ProvisioningStep> {
        self.steps
            .lock()
            .unwrap()
            .iter()
            .map(|(_, step)| step.clone())
            .collect()
    }

    pub fn session_ids(&self) -> Vec<Uuid> {
        self.steps.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }
}

impl ProvisioningObserver for StepLog {
    fn on_step_changed(&self, session_id: Uuid, step: &ProvisioningStep) {
        self.steps.lock().unwrap().push((session_id, step.clone()));
    }
}

pub fn machine(
    registrar: Arc<ScriptedRegistrar>,
    camera: Arc<ScriptedCamera>,
    tag: Option<Arc<RecordingTag>>,
) -> ProvisioningMachine {
    let nfc = tag.map(|tag| Arc::new(NfcAdapter::new(tag, NFC_TIMEOUT)));
    ProvisioningMachine::new(registrar, Arc::new(QrAdapter::new(camera)), nfc, FAST_KDF)
}

pub const TOKEN: Address = Address::repeat_byte(0x70);

pub fn token() -> TokenUnit {
    TokenUnit {
        address: TOKEN,
        decimals: 6,
        symbol: "SRF".to_string(),
    }
}

/// How the fake chain answers `simulate_transfer`.
#[derive(Clone)]
pub enum Simulation {
    Honest,
    Tampered(fn(&mut SimulatedCall)),
    Fails(String),
}

/// Chain client that records every call in order.
pub struct RecordingChain {
    balance: U256,
    simulation: Simulation,
    send_error: Option<ChainError>,
    calls: Mutex<Vec<&'static str>>,
    signers: Mutex<Vec<Address>>,
}

impl RecordingChain {
    pub fn new(balance: U256) -> Arc<Self> {
        Self::with(balance, Simulation::Honest, None)
    }

    pub fn with(
        balance: U256,
        simulation: Simulation,
        send_error: Option<ChainError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            balance,
            simulation,
            send_error,
            calls: Mutex::new(Vec::new()),
            signers: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn signers(&self) -> Vec<Address> {
        self.signers.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChainClient for RecordingChain {
    async fn get_balance(&self, _address: Address, _unit: &TokenUnit) -> Result<U256, ChainError> {
        self.record("get_balance");
        Ok(self.balance)
    }

    async fn simulate_transfer(
        &self,
        from: Address,
        to: Address,
        amount: U256,
        unit: &TokenUnit,
    ) -> Result<SimulatedCall, ChainError> {
        self.record("simulate_transfer");
        let mut call = SimulatedCall {
            from,
            to: unit.address,
            input: encode_transfer(to, amount),
            gas_estimate: Some(51_234),
        };
        match &self.simulation {
            Simulation::Honest => Ok(call),
            Simulation::Tampered(tamper) => {
                tamper(&mut call);
                Ok(call)
            }
            Simulation::Fails(reason) => Err(ChainError::from_rpc_message(reason)),
        }
    }

    async fn sign_and_send(
        &self,
        account: &UnlockedAccount,
        call: &SimulatedCall,
    ) -> Result<TxReceipt, ChainError> {
        self.record("sign_and_send");
        self.signers.lock().unwrap().push(account.address());
        if let Some(error) = &self.send_error {
            return Err(error.clone());
        }
        let signature = account
            .sign_hash(&alloy_primitives::keccak256(&call.input))
            .map_err(|err| ChainError::Rpc {
                reason: err.to_string(),
            })?;
        Ok(TxReceipt {
            transaction_hash: alloy_primitives::keccak256(signature.as_bytes()),
            block_number: Some(1),
        })
    }

    async fn invalidate_views(&self, _address: Address) -> Result<(), ChainError> {
        self.record("invalidate_views");
        Ok(())
    }
}

pub fn receipt_hash_is_set(receipt: &TxReceipt) -> bool {
    receipt.transaction_hash != B256::ZERO
}
