//! JSON-RPC client for the bitcoind-family chain back-ends.
//!
//! Only three operations are required of a back-end: tip height, block by
//! height and raw transaction by id (the latter also backs lazy payloads and
//! mempool sweeps). The trait is the seam scanners and the materializer
//! depend on; tests substitute an in-memory chain.

use async_trait::async_trait;
use metafs_types::tx::{BlockMeta, RawBlock, RawTransaction};
use metafs_types::ChainKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },
    #[error("empty result for {0}")]
    EmptyResult(&'static str),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The chain back-end surface consumed by the core.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    fn chain(&self) -> ChainKind;

    /// Cheap, no-payload tip query.
    async fn get_block_count(&self) -> Result<u64, RpcError>;

    /// Verbose block: header plus fully decoded transactions.
    async fn get_block(&self, height: u64) -> Result<RawBlock, RpcError>;

    /// Block summary: header plus txid list. Used to size up a block before
    /// deciding between a full and a lazy payload.
    async fn get_block_meta(&self, height: u64) -> Result<BlockMeta, RpcError>;

    async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, RpcError>;

    async fn get_raw_mempool(&self) -> Result<Vec<String>, RpcError>;
}

#[derive(Debug, Clone)]
pub struct RpcEndpoint {
    pub url: String,
    pub user: String,
    pub pass: String,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize, Debug)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Concrete client speaking JSON-RPC 1.0 with basic auth.
#[derive(Clone)]
pub struct ChainRpcClient {
    chain: ChainKind,
    http: reqwest::Client,
    endpoint: RpcEndpoint,
}

impl ChainRpcClient {
    pub fn new(chain: ChainKind, endpoint: RpcEndpoint) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            chain,
            http,
            endpoint,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, RpcError> {
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: "metafs",
            method,
            params,
        };
        let mut builder = self.http.post(&self.endpoint.url).json(&request);
        if !self.endpoint.user.is_empty() {
            builder = builder.basic_auth(&self.endpoint.user, Some(&self.endpoint.pass));
        }
        let response: RpcResponse<T> = builder.send().await?.error_for_status()?.json().await?;
        if let Some(err) = response.error {
            return Err(RpcError::Node {
                code: err.code,
                message: err.message,
            });
        }
        response.result.ok_or(RpcError::EmptyResult(method))
    }

    async fn block_hash(&self, height: u64) -> Result<String, RpcError> {
        self.call("getblockhash", json!([height])).await
    }
}

#[async_trait]
impl ChainRpc for ChainRpcClient {
    fn chain(&self) -> ChainKind {
        self.chain
    }

    async fn get_block_count(&self) -> Result<u64, RpcError> {
        self.call("getblockcount", json!([])).await
    }

    async fn get_block(&self, height: u64) -> Result<RawBlock, RpcError> {
        let hash = self.block_hash(height).await?;
        self.call("getblock", json!([hash, 2])).await
    }

    async fn get_block_meta(&self, height: u64) -> Result<BlockMeta, RpcError> {
        let hash = self.block_hash(height).await?;
        self.call("getblock", json!([hash, 1])).await
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, RpcError> {
        self.call("getrawtransaction", json!([txid, true])).await
    }

    async fn get_raw_mempool(&self) -> Result<Vec<String>, RpcError> {
        self.call("getrawmempool", json!([])).await
    }
}

impl RpcError {
    /// Transient errors make the scanner retry the same height after the
    /// poll interval; anything else makes it skip that height with an error
    /// (an operator rescan recovers it).
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Transport(_) => true,
            // "Block not found" while the node is still indexing the tip.
            RpcError::Node { code, .. } => matches!(code, -5 | -8 | -28),
            RpcError::EmptyResult(_) => true,
            RpcError::Decode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    fn client_for(server: &Server) -> ChainRpcClient {
        ChainRpcClient::new(
            ChainKind::Btc,
            RpcEndpoint {
                url: server.url("/").to_string(),
                user: "user".into(),
                pass: "pass".into(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn block_count_round_trips_the_envelope() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/"),
                request::body(json_decoded(eq(json!({
                    "jsonrpc": "1.0",
                    "id": "metafs",
                    "method": "getblockcount",
                    "params": []
                })))),
            ])
            .respond_with(json_encoded(json!({
                "result": 840_000,
                "error": null,
                "id": "metafs"
            }))),
        );
        assert_eq!(client_for(&server).get_block_count().await.unwrap(), 840_000);
    }

    #[tokio::test]
    async fn node_errors_surface_code_and_message() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/")).respond_with(json_encoded(
                json!({
                    "result": null,
                    "error": {"code": -28, "message": "Loading block index..."},
                    "id": "metafs"
                }),
            )),
        );
        let err = client_for(&server).get_block_count().await.unwrap_err();
        match &err {
            RpcError::Node { code, message } => {
                assert_eq!(*code, -28);
                assert!(message.contains("Loading"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn get_block_chains_hash_then_body() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::body(json_decoded(eq(json!({
                "jsonrpc": "1.0",
                "id": "metafs",
                "method": "getblockhash",
                "params": [7]
            })))))
            .respond_with(json_encoded(json!({
                "result": "deadbeef",
                "error": null,
                "id": "metafs"
            }))),
        );
        server.expect(
            Expectation::matching(request::body(json_decoded(eq(json!({
                "jsonrpc": "1.0",
                "id": "metafs",
                "method": "getblock",
                "params": ["deadbeef", 2]
            })))))
            .respond_with(json_encoded(json!({
                "result": {
                    "hash": "deadbeef",
                    "height": 7,
                    "time": 1_700_000_000u64,
                    "tx": [{"txid": "t0"}]
                },
                "error": null,
                "id": "metafs"
            }))),
        );
        let block = client_for(&server).get_block(7).await.unwrap();
        assert_eq!(block.height, 7);
        assert_eq!(block.tx.len(), 1);
    }

    #[tokio::test]
    async fn missing_result_is_an_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/")).respond_with(json_encoded(
                json!({"result": null, "error": null, "id": "metafs"}),
            )),
        );
        let err = client_for(&server).get_raw_mempool().await.unwrap_err();
        assert!(matches!(err, RpcError::EmptyResult("getrawmempool")));
    }
}

