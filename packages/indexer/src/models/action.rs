//! Transaction actions.
//!
//! The node encodes an action either as a bare discriminator string
//! (`"CreateAccount"`) or as a single-key object (`{"Transfer": {...}}`).
//! Decoding goes through `DECODERS`; discriminators missing from the table
//! become `Action::Unknown` so new protocol actions never stop the indexer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::amount;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Action {
    CreateAccount,
    DeployContract {
        /// Size of the base64 encoded code
        code_size: usize,
    },
    FunctionCall {
        method_name: String,
        gas: u64,
        #[serde(with = "amount")]
        deposit: u128,
    },
    Transfer {
        #[serde(with = "amount")]
        deposit: u128,
    },
    Stake {
        #[serde(with = "amount")]
        stake: u128,
        public_key: String,
    },
    AddKey {
        public_key: String,
        access_key: Value,
    },
    DeleteKey {
        public_key: String,
    },
    DeleteAccount {
        beneficiary_id: String,
    },
    Unknown {
        kind: String,
        data: Value,
    },
}

type Decoder = fn(Value) -> Result<Action, serde_json::Error>;

const DECODERS: &[(&str, Decoder)] = &[
    ("CreateAccount", decode_create_account),
    ("DeployContract", decode_deploy_contract),
    ("FunctionCall", decode_function_call),
    ("Transfer", decode_transfer),
    ("Stake", decode_stake),
    ("AddKey", decode_add_key),
    ("DeleteKey", decode_delete_key),
    ("DeleteAccount", decode_delete_account),
];

#[derive(Deserialize)]
struct DeployContractBody {
    #[serde(default)]
    code: String,
}

#[derive(Deserialize)]
struct FunctionCallBody {
    method_name: String,
    gas: u64,
    #[serde(with = "amount")]
    deposit: u128,
}

#[derive(Deserialize)]
struct TransferBody {
    #[serde(with = "amount")]
    deposit: u128,
}

#[derive(Deserialize)]
struct StakeBody {
    #[serde(with = "amount")]
    stake: u128,
    public_key: String,
}

#[derive(Deserialize)]
struct AddKeyBody {
    public_key: String,
    access_key: Value,
}

#[derive(Deserialize)]
struct DeleteKeyBody {
    public_key: String,
}

#[derive(Deserialize)]
struct DeleteAccountBody {
    beneficiary_id: String,
}

fn decode_create_account(_body: Value) -> Result<Action, serde_json::Error> {
    Ok(Action::CreateAccount)
}

fn decode_deploy_contract(body: Value) -> Result<Action, serde_json::Error> {
    let body: DeployContractBody = serde_json::from_value(body)?;
    Ok(Action::DeployContract {
        code_size: body.code.len(),
    })
}

fn decode_function_call(body: Value) -> Result<Action, serde_json::Error> {
    let body: FunctionCallBody = serde_json::from_value(body)?;
    Ok(Action::FunctionCall {
        method_name: body.method_name,
        gas: body.gas,
        deposit: body.deposit,
    })
}

fn decode_transfer(body: Value) -> Result<Action, serde_json::Error> {
    let body: TransferBody = serde_json::from_value(body)?;
    Ok(Action::Transfer {
        deposit: body.deposit,
    })
}

fn decode_stake(body: Value) -> Result<Action, serde_json::Error> {
    let body: StakeBody = serde_json::from_value(body)?;
    Ok(Action::Stake {
        stake: body.stake,
        public_key: body.public_key,
    })
}

fn decode_add_key(body: Value) -> Result<Action, serde_json::Error> {
    let body: AddKeyBody = serde_json::from_value(body)?;
    Ok(Action::AddKey {
        public_key: body.public_key,
        access_key: body.access_key,
    })
}

fn decode_delete_key(body: Value) -> Result<Action, serde_json::Error> {
    let body: DeleteKeyBody = serde_json::from_value(body)?;
    Ok(Action::DeleteKey {
        public_key: body.public_key,
    })
}

fn decode_delete_account(body: Value) -> Result<Action, serde_json::Error> {
    let body: DeleteAccountBody = serde_json::from_value(body)?;
    Ok(Action::DeleteAccount {
        beneficiary_id: body.beneficiary_id,
    })
}

impl Action {
    /// Decode one raw action. A known discriminator with a malformed body is
    /// an error; an unknown discriminator is not.
    pub fn decode(raw: &Value) -> Result<Action, String> {
        let (kind, body) = match raw {
            Value::String(kind) => (kind.as_str(), Value::Null),
            Value::Object(map) if map.len() == 1 => {
                let (kind, body) = map.iter().next().ok_or("empty action object")?;
                (kind.as_str(), body.clone())
            }
            other => return Err(format!("unexpected action encoding: {}", other)),
        };

        match DECODERS.iter().find(|(name, _)| *name == kind) {
            Some((_, decode)) => {
                decode(body).map_err(|e| format!("malformed {} action: {}", kind, e))
            }
            None => Ok(Action::Unknown {
                kind: kind.to_string(),
                data: body,
            }),
        }
    }

    /// Tokens attached to the action
    pub fn deposit(&self) -> u128 {
        match self {
            Action::Transfer { deposit } | Action::FunctionCall { deposit, .. } => *deposit,
            _ => 0,
        }
    }
}
