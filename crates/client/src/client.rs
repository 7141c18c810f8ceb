use crate::{Error, Result};
use api_server::{
    methods::{BetRequest, CasesResponse, OpenCaseResponse, WalletRequest, WithdrawRequest},
    ErrorBody,
};
use case_runtime::{
    BetReceipt, CaseDefinition, CashOutReceipt, RoundSnapshot, Session, WithdrawalReceipt,
};
use reqwest::Client as HttpClient;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Timeout for connections and requests
const TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the case game API.
///
/// Each call is a single attempt; failures are returned to the caller as-is.
#[derive(Clone)]
pub struct GameClient {
    pub base_url: Url,
    pub http_client: HttpClient,
}

impl GameClient {
    /// Create a new client
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let http_client = HttpClient::builder().timeout(TIMEOUT).build()?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Request a withdrawal
    pub async fn withdraw(&self, wallet_address: &str, amount: f64) -> Result<WithdrawalReceipt> {
        let request = WithdrawRequest {
            wallet_address: Some(wallet_address.to_string()),
            amount: Some(amount),
        };
        self.post("withdraw", &request).await
    }

    /// List the case catalog
    pub async fn cases(&self) -> Result<Vec<CaseDefinition>> {
        let response: CasesResponse = self.get("cases").await?;
        Ok(response.cases)
    }

    /// Buy and open a case
    pub async fn open_case(&self, case_id: u32, wallet_address: &str) -> Result<OpenCaseResponse> {
        self.post(&format!("cases/{case_id}/open"), &wallet(wallet_address))
            .await
    }

    /// Current crash round
    pub async fn round(&self) -> Result<RoundSnapshot> {
        self.get("crash").await
    }

    /// Bet on the running crash round
    pub async fn place_bet(&self, wallet_address: &str, amount: u64) -> Result<BetReceipt> {
        let request = BetRequest {
            wallet_address: Some(wallet_address.to_string()),
            amount: Some(amount),
        };
        self.post("crash/bet", &request).await
    }

    /// Cash out the active crash bet
    pub async fn cash_out(&self, wallet_address: &str) -> Result<CashOutReceipt> {
        self.post("crash/cashout", &wallet(wallet_address)).await
    }

    /// Fetch a wallet's session
    pub async fn session(&self, wallet_address: &str) -> Result<Session> {
        let mut url = self.base_url.join("session/")?;
        url.path_segments_mut()
            .map_err(|_| Error::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(wallet_address);
        let response = self.http_client.get(url).send().await?;
        decode(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path)?;
        debug!("GET {}", url);
        let response = self.http_client.get(url).send().await?;
        decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path)?;
        debug!("POST {}", url);
        let response = self.http_client.post(url).json(body).send().await?;
        decode(response).await
    }
}

fn wallet(wallet_address: &str) -> WalletRequest {
    WalletRequest {
        wallet_address: Some(wallet_address.to_string()),
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await?;
    let (error, message) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(body) => (body.error, body.message),
        Err(_) => (status.canonical_reason().unwrap_or("error").to_string(), None),
    };
    debug!("Request failed with {}: {}", status, error);

    Err(Error::Api {
        status,
        error,
        message,
    })
}
