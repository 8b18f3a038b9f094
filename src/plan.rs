//! Batch planner.
//!
//! A plan is an ordered list of `(action tag, params)` pairs. The planner only assembles
//! intent; nothing runs until the manager replays the encoded payload inside a session.
//! Params are opaque bytes at this level so the tag and parameter sequences can travel as
//! one payload and be decoded back into exactly the same pairing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Currency, PoolKey, Range, ReceiptId, Timestamp};

// 2.0: action tags
/// Operation tags. Liquidity steps first, delta resolution steps from 0x10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    Mint = 0x00,
    IncreaseLiquidity = 0x01,
    DecreaseLiquidity = 0x02,
    Collect = 0x03,
    Burn = 0x04,
    Swap = 0x05,
    CloseCurrency = 0x10,
    SettleAll = 0x11,
    TakeAll = 0x12,
}

impl Action {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self, PlanError> {
        Ok(match tag {
            0x00 => Action::Mint,
            0x01 => Action::IncreaseLiquidity,
            0x02 => Action::DecreaseLiquidity,
            0x03 => Action::Collect,
            0x04 => Action::Burn,
            0x05 => Action::Swap,
            0x10 => Action::CloseCurrency,
            0x11 => Action::SettleAll,
            0x12 => Action::TakeAll,
            other => return Err(PlanError::UnsupportedAction(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintParams {
    pub range: Range,
    pub liquidity: u128,
    pub deadline: Timestamp,
    pub owner: AccountId,
    #[serde(default)]
    pub hook_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyLiquidityParams {
    pub receipt: ReceiptId,
    pub liquidity: u128,
    pub deadline: Timestamp,
    #[serde(default)]
    pub hook_data: Vec<u8>,
    #[serde(default)]
    pub use_credit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectParams {
    pub receipt: ReceiptId,
    pub recipient: AccountId,
    #[serde(default)]
    pub hook_data: Vec<u8>,
    #[serde(default)]
    pub use_credit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnParams {
    pub receipt: ReceiptId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
    pub pool: PoolKey,
    pub zero_for_one: bool,
    pub amount_in: u128,
    pub min_amount_out: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseCurrencyParams {
    pub currency: Currency,
    #[serde(default)]
    pub use_credit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleAllParams {
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeAllParams {
    pub currency: Currency,
    pub recipient: AccountId,
}

// 2.1: typed steps, then the plan encoding and finalizers
/// A decoded plan step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Mint(MintParams),
    IncreaseLiquidity(ModifyLiquidityParams),
    DecreaseLiquidity(ModifyLiquidityParams),
    Collect(CollectParams),
    Burn(BurnParams),
    Swap(SwapParams),
    CloseCurrency(CloseCurrencyParams),
    SettleAll(SettleAllParams),
    TakeAll(TakeAllParams),
}

impl Step {
    pub fn action(&self) -> Action {
        match self {
            Step::Mint(_) => Action::Mint,
            Step::IncreaseLiquidity(_) => Action::IncreaseLiquidity,
            Step::DecreaseLiquidity(_) => Action::DecreaseLiquidity,
            Step::Collect(_) => Action::Collect,
            Step::Burn(_) => Action::Burn,
            Step::Swap(_) => Action::Swap,
            Step::CloseCurrency(_) => Action::CloseCurrency,
            Step::SettleAll(_) => Action::SettleAll,
            Step::TakeAll(_) => Action::TakeAll,
        }
    }

    pub fn encode_params(&self) -> Result<Vec<u8>, PlanError> {
        let encoded = match self {
            Step::Mint(p) => serde_json::to_vec(p),
            Step::IncreaseLiquidity(p) | Step::DecreaseLiquidity(p) => serde_json::to_vec(p),
            Step::Collect(p) => serde_json::to_vec(p),
            Step::Burn(p) => serde_json::to_vec(p),
            Step::Swap(p) => serde_json::to_vec(p),
            Step::CloseCurrency(p) => serde_json::to_vec(p),
            Step::SettleAll(p) => serde_json::to_vec(p),
            Step::TakeAll(p) => serde_json::to_vec(p),
        };
        encoded.map_err(|e| PlanError::Malformed(e.to_string()))
    }

    pub fn decode(index: usize, action: Action, params: &[u8]) -> Result<Self, PlanError> {
        Ok(match action {
            Action::Mint => Step::Mint(parse(index, action, params)?),
            Action::IncreaseLiquidity => Step::IncreaseLiquidity(parse(index, action, params)?),
            Action::DecreaseLiquidity => Step::DecreaseLiquidity(parse(index, action, params)?),
            Action::Collect => Step::Collect(parse(index, action, params)?),
            Action::Burn => Step::Burn(parse(index, action, params)?),
            Action::Swap => Step::Swap(parse(index, action, params)?),
            Action::CloseCurrency => Step::CloseCurrency(parse(index, action, params)?),
            Action::SettleAll => Step::SettleAll(parse(index, action, params)?),
            Action::TakeAll => Step::TakeAll(parse(index, action, params)?),
        })
    }
}

fn parse<T: DeserializeOwned>(index: usize, action: Action, params: &[u8]) -> Result<T, PlanError> {
    serde_json::from_slice(params).map_err(|e| PlanError::InvalidParams {
        index,
        action,
        reason: e.to_string(),
    })
}

// wire form: two positionally aligned sequences
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncodedPlan {
    actions: Vec<u8>,
    params: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    actions: Vec<u8>,
    params: Vec<Vec<u8>>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one raw step at the tail.
    #[must_use]
    pub fn append(mut self, action: Action, params: Vec<u8>) -> Self {
        self.actions.push(action.tag());
        self.params.push(params);
        self
    }

    /// Appends a typed step, encoding its params.
    pub fn with(self, step: Step) -> Result<Self, PlanError> {
        let params = step.encode_params()?;
        Ok(self.append(step.action(), params))
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> Result<Vec<Action>, PlanError> {
        self.actions.iter().map(|tag| Action::from_tag(*tag)).collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>, PlanError> {
        let wire = EncodedPlan {
            actions: self.actions.clone(),
            params: self.params.clone(),
        };
        serde_json::to_vec(&wire).map_err(|e| PlanError::Malformed(e.to_string()))
    }

    /// Closes both pool currencies for the caller, then encodes.
    pub fn finalize_liquidity(self, pool: &PoolKey) -> Result<Vec<u8>, PlanError> {
        let mut plan = self;
        for currency in pool.currencies() {
            plan = plan.with(Step::CloseCurrency(CloseCurrencyParams {
                currency,
                use_credit: false,
            }))?;
        }
        plan.encode()
    }

    /// Pays the whole input debt and takes the whole output credit, then encodes.
    pub fn finalize_swap(self, input: Currency, output: Currency, recipient: AccountId) -> Result<Vec<u8>, PlanError> {
        self.with(Step::SettleAll(SettleAllParams { currency: input }))?
            .with(Step::TakeAll(TakeAllParams {
                currency: output,
                recipient,
            }))?
            .encode()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PlanError> {
        let wire: EncodedPlan = serde_json::from_slice(bytes).map_err(|e| PlanError::Malformed(e.to_string()))?;
        if wire.actions.len() != wire.params.len() {
            return Err(PlanError::InputLengthMismatch {
                actions: wire.actions.len(),
                params: wire.params.len(),
            });
        }
        Ok(Self {
            actions: wire.actions,
            params: wire.params,
        })
    }

    pub fn steps(&self) -> Result<Vec<Step>, PlanError> {
        self.actions
            .iter()
            .zip(&self.params)
            .enumerate()
            .map(|(index, (tag, params))| Step::decode(index, Action::from_tag(*tag)?, params))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("Plan carries {actions} actions but {params} parameter blocks")]
    InputLengthMismatch { actions: usize, params: usize },

    #[error("Unsupported action tag 0x{0:02x}")]
    UnsupportedAction(u8),

    #[error("Invalid params for step {index} ({action:?}): {reason}")]
    InvalidParams { index: usize, action: Action, reason: String },

    #[error("Malformed plan payload: {0}")]
    Malformed(String),

    #[error("Plan has {count} actions, limit is {max}")]
    TooManyActions { count: usize, max: usize },
}
