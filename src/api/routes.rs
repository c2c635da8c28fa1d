//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        // Accounts and transfers
        .route("/wallet/create", post(handlers::create_wallet))
        .route("/wallet/balance/{address}", get(handlers::get_balance))
        .route("/wallet/transfer", post(handlers::transfer))
        // Multisig
        .route("/wallet/multisig/deploy", post(handlers::deploy_multisig))
        .route("/wallet/multisig/submit", post(handlers::submit_multisig))
        .route("/wallet/multisig/confirm", post(handlers::confirm_multisig))
        .route("/wallet/multisig/execute", post(handlers::execute_multisig))
        .route("/wallet/multisig/{address}", get(handlers::get_multisig))
        .route(
            "/wallet/multisig/{address}/transactions",
            get(handlers::list_pending),
        )
        .route(
            "/wallet/multisig/{address}/transactions/{index}",
            get(handlers::get_multisig_transaction),
        )
        // Add state and middleware
        .with_state(state)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuilderConfig, TransactionBuilder};
    use crate::core::{to_base_units, Address};
    use crate::ledger::{InMemoryLedger, RetryPolicy};
    use crate::multisig::{InMemoryMultisigHost, MultisigCoordinator};
    use crate::wallet::Account;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct TestServer {
        base: String,
        http: reqwest::Client,
        ledger: Arc<InMemoryLedger>,
        host: InMemoryMultisigHost,
    }

    impl TestServer {
        async fn get(&self, path: &str) -> (u16, Value) {
            let resp = self
                .http
                .get(format!("{}{}", self.base, path))
                .send()
                .await
                .unwrap();
            let status = resp.status().as_u16();
            (status, resp.json().await.unwrap_or(Value::Null))
        }

        async fn post(&self, path: &str, body: Value) -> (u16, Value) {
            let resp = self
                .http
                .post(format!("{}{}", self.base, path))
                .json(&body)
                .send()
                .await
                .unwrap();
            let status = resp.status().as_u16();
            (status, resp.json().await.unwrap_or(Value::Null))
        }
    }

    async fn spawn_server(with_deployer: bool) -> TestServer {
        let ledger = Arc::new(InMemoryLedger::default());
        let host = InMemoryMultisigHost::new(ledger.clone());
        let builder = Arc::new(TransactionBuilder::new(
            ledger.clone(),
            BuilderConfig {
                retry: RetryPolicy::none(),
                ..BuilderConfig::default()
            },
        ));
        let coordinator = Arc::new(MultisigCoordinator::new(
            Arc::new(host.clone()),
            Arc::new(host.clone()),
            RetryPolicy::none(),
        ));
        let state = ApiState {
            builder,
            coordinator,
            deployer: with_deployer.then(|| Arc::new(Account::generate())),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });

        TestServer {
            base: format!("http://{}", addr),
            http: reqwest::Client::new(),
            ledger,
            host,
        }
    }

    fn private_key(account: &Account) -> String {
        account.export_key().unwrap().private_key
    }

    #[tokio::test]
    async fn test_health_and_root() {
        let server = spawn_server(false).await;
        let body = server
            .http
            .get(format!("{}/health", server.base))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "OK");

        let resp = server.http.get(&server.base).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_create_wallet() {
        let server = spawn_server(false).await;
        let (status, body) = server.post("/wallet/create", json!({})).await;
        assert_eq!(status, 200);

        let private_key = body["privateKey"].as_str().unwrap();
        let account = Account::from_private_key(private_key).unwrap();
        let address: Address = body["address"].as_str().unwrap().parse().unwrap();
        assert_eq!(account.address(), address);
        assert!(body["publicKey"].is_string());
    }

    #[tokio::test]
    async fn test_transfer_and_balance() {
        let server = spawn_server(false).await;
        let alice = Account::generate();
        let bob = Account::generate();
        server
            .ledger
            .fund(&alice.address(), to_base_units("10").unwrap());

        let (status, body) = server
            .post(
                "/wallet/transfer",
                json!({
                    "privateKey": private_key(&alice),
                    "toAddress": bob.address().to_checksum(),
                    "amount": "1.5",
                }),
            )
            .await;
        assert_eq!(status, 200, "{}", body);
        assert!(body["txHash"].as_str().unwrap().starts_with("0x"));

        let (status, body) = server
            .get(&format!("/wallet/balance/{}", bob.address().to_lower_hex()))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["balance"], "1.5");
        assert_eq!(body["address"], bob.address().to_checksum());
    }

    #[tokio::test]
    async fn test_transfer_errors_map_to_status() {
        let server = spawn_server(false).await;
        let broke = Account::generate();
        let to = Account::generate().address().to_checksum();

        let (status, body) = server
            .post(
                "/wallet/transfer",
                json!({"privateKey": private_key(&broke), "toAddress": to, "amount": "1.2.3"}),
            )
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["kind"], "validation");

        let (status, _) = server
            .post(
                "/wallet/transfer",
                json!({"privateKey": "zz", "toAddress": to, "amount": "1"}),
            )
            .await;
        assert_eq!(status, 400);

        let (status, body) = server
            .post(
                "/wallet/transfer",
                json!({"privateKey": private_key(&broke), "toAddress": to, "amount": "1"}),
            )
            .await;
        assert_eq!(status, 422);
        assert_eq!(body["kind"], "chain");
        assert!(server.ledger.accepted_transactions().is_empty());

        let (status, _) = server.get("/wallet/balance/0x1234").await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn test_multisig_flow() {
        let server = spawn_server(true).await;
        let owners: Vec<Account> = (0..3).map(|_| Account::generate()).collect();
        let recipient = Account::generate().address();

        let (status, body) = server
            .post(
                "/wallet/multisig/deploy",
                json!({
                    "owners": owners.iter().map(|o| o.address().to_checksum()).collect::<Vec<_>>(),
                    "requiredConfirmations": 2,
                }),
            )
            .await;
        assert_eq!(status, 200, "{}", body);
        let contract = body["contractAddress"].as_str().unwrap().to_string();
        let contract_address: Address = contract.parse().unwrap();

        let funder = Account::generate();
        server
            .ledger
            .fund(&funder.address(), to_base_units("10").unwrap());
        server
            .host
            .deposit(&funder.address(), &contract_address, to_base_units("5").unwrap())
            .unwrap();

        let (status, body) = server
            .post(
                "/wallet/multisig/submit",
                json!({
                    "contractAddress": contract,
                    "to": recipient.to_checksum(),
                    "value": "1",
                    "senderPrivateKey": private_key(&owners[0]),
                }),
            )
            .await;
        assert_eq!(status, 200, "{}", body);
        assert_eq!(body["index"], 0);
        assert_eq!(body["deduplicated"], false);

        let action = |signer: &Account| {
            json!({"contractAddress": contract, "index": 0, "senderPrivateKey": private_key(signer)})
        };

        // One confirmation of two
        let (status, body) = server
            .post("/wallet/multisig/execute", action(&owners[0]))
            .await;
        assert_eq!(status, 422, "{}", body);

        let (status, _) = server
            .post("/wallet/multisig/confirm", action(&owners[1]))
            .await;
        assert_eq!(status, 200);

        let (status, body) = server
            .get(&format!("/wallet/multisig/{}/transactions/0", contract))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["confirmations"], 2);
        assert_eq!(body["state"], "QuorumReached");

        let (status, _) = server
            .post("/wallet/multisig/execute", action(&owners[1]))
            .await;
        assert_eq!(status, 200);
        assert_eq!(server.ledger.balance(&recipient), to_base_units("1").unwrap());

        let (status, _) = server
            .post("/wallet/multisig/execute", action(&owners[2]))
            .await;
        assert_eq!(status, 422);

        let (status, body) = server
            .get(&format!("/wallet/multisig/{}/transactions", contract))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body.as_array().unwrap().len(), 0);

        let (status, body) = server
            .get(&format!("/wallet/multisig/{}", contract))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["owners"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_multisig_rejections() {
        let server = spawn_server(true).await;
        let owner = Account::generate();
        let stranger = Account::generate();

        let (status, _) = server
            .post(
                "/wallet/multisig/deploy",
                json!({"owners": [owner.address().to_checksum()], "requiredConfirmations": 2}),
            )
            .await;
        assert_eq!(status, 400);

        let (status, body) = server
            .post(
                "/wallet/multisig/deploy",
                json!({"owners": [owner.address().to_checksum()], "requiredConfirmations": 1}),
            )
            .await;
        assert_eq!(status, 200);
        let contract = body["contractAddress"].as_str().unwrap().to_string();

        let (status, body) = server
            .post(
                "/wallet/multisig/submit",
                json!({
                    "contractAddress": contract,
                    "to": owner.address().to_checksum(),
                    "value": "1",
                    "senderPrivateKey": private_key(&stranger),
                    "data": "0x",
                }),
            )
            .await;
        assert_eq!(status, 403);
        assert_eq!(body["kind"], "authorization");
    }

    #[tokio::test]
    async fn test_deploy_requires_deployer_key() {
        let server = spawn_server(false).await;
        let (status, _) = server
            .post(
                "/wallet/multisig/deploy",
                json!({"owners": [Account::generate().address().to_checksum()], "requiredConfirmations": 1}),
            )
            .await;
        assert_eq!(status, 503);
    }
}
