pub mod client;

pub use client::GameClient;
use case_runtime::ErrorKind;
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{error} ({status})")]
    Api {
        status: reqwest::StatusCode,
        error: String,
        message: Option<String>,
    },
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Taxonomy entry a caller should present for this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) => ErrorKind::NetworkError,
            Error::Api { status, error, .. } => {
                api_server::kind_from_label(error).unwrap_or(if status.is_server_error() {
                    ErrorKind::Internal
                } else {
                    ErrorKind::InvalidRequest
                })
            }
            Error::Url(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Human readable detail sent by the server, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            Error::Api { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use api_server::{methods::ApiContext, HttpApiServer};
    use case_runtime::{
        rng::{make_rng, shared_rng},
        CaseCatalog, RoundDriver, RoundState, RoundTimings, SessionStore, WithdrawalPolicy,
    };
    use std::{net::SocketAddr, sync::Arc, time::Duration};

    struct TestContext {
        client: GameClient,
        server_handle: tokio::task::JoinHandle<()>,
        driver_handle: tokio::task::JoinHandle<()>,
    }

    impl TestContext {
        async fn new(timings: RoundTimings) -> Self {
            let sessions = Arc::new(SessionStore::with_starting_balance(1_000));
            let driver = RoundDriver::new(timings, make_rng(Some(11)), sessions.clone());
            let context = Arc::new(ApiContext {
                sessions,
                catalog: Arc::new(CaseCatalog::builtin()),
                round: driver.handle(),
                rng: shared_rng(Some(12)),
                withdrawal_policy: WithdrawalPolicy::default(),
                case_open_delay: Duration::ZERO,
            });

            // Start server on random port
            let addr = SocketAddr::from(([127, 0, 0, 1], 0));
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            let actual_addr = listener.local_addr().unwrap();
            let base_url = format!("http://{actual_addr}");

            let server_handle = tokio::spawn(async move {
                HttpApiServer::new(context).serve(listener).await.unwrap();
            });
            let driver_handle = tokio::spawn(driver.run_async());

            Self {
                client: GameClient::new(&base_url).unwrap(),
                server_handle,
                driver_handle,
            }
        }
    }

    impl Drop for TestContext {
        fn drop(&mut self) {
            self.server_handle.abort();
            self.driver_handle.abort();
        }
    }

    #[tokio::test]
    async fn test_withdraw() {
        let ctx = TestContext::new(RoundTimings::default()).await;

        let receipt = ctx.client.withdraw("EQaddr", 250.0).await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.fee, 2);
        assert_eq!(receipt.net_amount, 248.0);

        let err = ctx.client.withdraw("EQaddr", 5.0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmountTooSmall);
        assert_eq!(err.message(), Some("Minimum withdrawal is 100 TON"));

        let err = ctx.client.withdraw("", 500.0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_cases_and_session() {
        let ctx = TestContext::new(RoundTimings::default()).await;

        let cases = ctx.client.cases().await.unwrap();
        assert_eq!(cases.len(), 4);

        let opened = ctx.client.open_case(cases[0].id, "carol").await.unwrap();
        assert_eq!(opened.balance, 1_000 - cases[0].price);

        let session = ctx.client.session("carol").await.unwrap();
        assert_eq!(session.balance, opened.balance);
        assert_eq!(session.inventory, vec![opened.item]);

        let err = ctx.client.open_case(42, "carol").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_crash_round_flow() {
        let timings = RoundTimings {
            waiting_delay_ms: 0,
            tick_ms: 10,
            crashed_delay_ms: 0,
        };
        let ctx = TestContext::new(timings).await;

        // Nothing to cash out yet
        let receipt = ctx.client.cash_out("dave").await.unwrap();
        assert!(!receipt.cashed_out);
        assert_eq!(receipt.balance, 1_000);

        let mut state = ctx.client.round().await.unwrap().state;
        for _ in 0..100 {
            if state == RoundState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            state = ctx.client.round().await.unwrap().state;
        }
        assert_eq!(state, RoundState::Running);

        // The round may crash between the poll and the bet
        match ctx.client.place_bet("dave", 100).await {
            Ok(bet) => assert_eq!(bet.balance, 900),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GameClient::new(&format!("http://{addr}")).unwrap();
        let err = client.round().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }

    #[test]
    fn test_bad_base_url() {
        assert!(matches!(GameClient::new("not a url"), Err(Error::Url(_))));
    }
}
