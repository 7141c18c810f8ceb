//! API Methods - request handlers independent of the HTTP framing
//!
//! Each handler takes the shared context and a decoded request and returns a
//! serialisable response or an `ApiError`.

use case_runtime::{
    rng::SharedRng, withdraw, BetReceipt, CaseCatalog, CaseDefinition, CashOutReceipt, ErrorKind,
    GameError, InventoryItem, RoundHandle, RoundSnapshot, Session, SessionStore, WithdrawError,
    WithdrawalPolicy, WithdrawalReceipt,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// Context shared across handlers
pub struct ApiContext {
    pub sessions: Arc<SessionStore>,
    pub catalog: Arc<CaseCatalog>,
    pub round: RoundHandle,
    pub rng: SharedRng,
    pub withdrawal_policy: WithdrawalPolicy,
    /// Cosmetic pause before a case opening response is sent
    pub case_open_delay: Duration,
}

// ============ Request/Response Types ============

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    #[serde(default, alias = "wallet_address")]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}

/// Request naming only the acting wallet
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    #[serde(default, alias = "wallet_address")]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetRequest {
    #[serde(default, alias = "wallet_address")]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenCaseResponse {
    pub case_id: u32,
    pub item: InventoryItem,
    pub balance: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CasesResponse {
    pub cases: Vec<CaseDefinition>,
}

/// Error body returned with every non-2xx response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

// ============ Handlers ============

/// Handle a withdrawal request: validate, then debit the wallet's session
pub fn handle_withdraw(
    ctx: &ApiContext,
    request: WithdrawRequest,
) -> Result<WithdrawalReceipt, ApiError> {
    let validated = ctx
        .withdrawal_policy
        .validate(request.wallet_address.as_deref(), request.amount)?;
    let wallet = validated.wallet_address.clone();
    let now_ms = chrono::Utc::now().timestamp_millis();

    let receipt = ctx.sessions.with_session(&wallet, |session| {
        let mut rng = ctx.rng.lock();
        withdraw::settle(validated, session, now_ms, &mut *rng)
    })??;
    Ok(receipt)
}

/// Handle case catalog listing
pub fn handle_list_cases(ctx: &ApiContext) -> CasesResponse {
    CasesResponse {
        cases: ctx.catalog.cases().to_vec(),
    }
}

/// Handle case opening.
///
/// Charge, draw and grant happen together under the session lock; the reveal
/// delay only holds back the response.
pub async fn handle_open_case(
    ctx: &ApiContext,
    case_id: u32,
    request: WalletRequest,
) -> Result<OpenCaseResponse, ApiError> {
    let wallet = required_wallet(request.wallet_address.as_deref())?;
    let case = ctx.catalog.require(case_id)?;

    let (item, balance) = ctx.sessions.with_session(wallet, |session| {
        let mut rng = ctx.rng.lock();
        case.open(session, &mut *rng).map(|item| (item, session.balance))
    })??;

    tracing::info!(
        "{} opened {} for {} and won {} ({:?}, {})",
        wallet,
        case.name,
        case.price,
        item.name,
        item.rarity,
        item.value
    );

    if !ctx.case_open_delay.is_zero() {
        tokio::time::sleep(ctx.case_open_delay).await;
    }

    Ok(OpenCaseResponse {
        case_id,
        item,
        balance,
    })
}

/// Handle crash round state query
pub fn handle_round_state(ctx: &ApiContext) -> RoundSnapshot {
    ctx.round.snapshot()
}

/// Handle crash bet
pub async fn handle_place_bet(
    ctx: &ApiContext,
    request: BetRequest,
) -> Result<BetReceipt, ApiError> {
    let wallet = required_wallet(request.wallet_address.as_deref())?;
    let amount = request
        .amount
        .filter(|a| *a > 0)
        .ok_or(GameError::InvalidAmount)?;
    Ok(ctx.round.place_bet(wallet, amount).await?)
}

/// Handle crash cash-out
pub async fn handle_cash_out(
    ctx: &ApiContext,
    request: WalletRequest,
) -> Result<CashOutReceipt, ApiError> {
    let wallet = required_wallet(request.wallet_address.as_deref())?;
    Ok(ctx.round.cash_out(wallet).await?)
}

/// Handle session lookup; unseen wallets get a fresh view that is not stored
pub fn handle_get_session(ctx: &ApiContext, wallet: &str) -> Result<Session, ApiError> {
    let wallet = SessionStore::normalize_wallet(wallet)?;
    Ok(ctx
        .sessions
        .get(wallet)
        .unwrap_or_else(|| Session::new(wallet, ctx.sessions.starting_balance())))
}

fn required_wallet(wallet: Option<&str>) -> Result<&str, GameError> {
    SessionStore::normalize_wallet(wallet.unwrap_or_default())
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Withdraw(#[from] WithdrawError),
    #[error("{0}")]
    Game(#[from] GameError),
    #[error("Malformed request: {0}")]
    Malformed(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Withdraw(WithdrawError::InvalidRequest) => ErrorKind::InvalidRequest,
            ApiError::Withdraw(WithdrawError::AmountTooSmall { .. }) => ErrorKind::AmountTooSmall,
            ApiError::Withdraw(WithdrawError::InsufficientBalance { .. }) => {
                ErrorKind::InsufficientBalance
            }
            ApiError::Game(e) => e.kind(),
            ApiError::Malformed(_) => ErrorKind::InvalidRequest,
            ApiError::MethodNotAllowed => ErrorKind::MethodNotAllowed,
        }
    }

    /// Short label carried in the `error` field
    pub fn label(&self) -> &'static str {
        error_label(self.kind())
    }

    /// Body for this error; the method-not-allowed body carries no message
    pub fn body(&self) -> ErrorBody {
        let message = match self {
            ApiError::MethodNotAllowed => None,
            other => Some(other.to_string()),
        };
        ErrorBody {
            error: self.label().to_string(),
            message,
        }
    }
}

/// Map taxonomy entries to the labels clients match on
pub fn error_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidRequest => "Invalid request",
        ErrorKind::AmountTooSmall => "Amount too small",
        ErrorKind::MethodNotAllowed => "Method not allowed",
        ErrorKind::WalletDeclined => "Wallet declined",
        ErrorKind::NetworkError => "Network error",
        ErrorKind::InsufficientBalance => "Insufficient balance",
        ErrorKind::Conflict => "Conflict",
        ErrorKind::NotFound => "Not found",
        ErrorKind::Internal => "Internal error",
        ErrorKind::Unavailable => "Service unavailable",
    }
}

/// Reverse of `error_label`
pub fn kind_from_label(label: &str) -> Option<ErrorKind> {
    let kind = match label {
        "Invalid request" => ErrorKind::InvalidRequest,
        "Amount too small" => ErrorKind::AmountTooSmall,
        "Method not allowed" => ErrorKind::MethodNotAllowed,
        "Wallet declined" => ErrorKind::WalletDeclined,
        "Network error" => ErrorKind::NetworkError,
        "Insufficient balance" => ErrorKind::InsufficientBalance,
        "Conflict" => ErrorKind::Conflict,
        "Not found" => ErrorKind::NotFound,
        "Internal error" => ErrorKind::Internal,
        "Service unavailable" => ErrorKind::Unavailable,
        _ => return None,
    };
    Some(kind)
}
