use crate::api::wire::{
    error_from_wire, ErrorBody, GetNoncesRequestWire, GetNoncesResponseWire, LeaderResponseWire,
    SetNoncesAndSignRequestWire, SetNoncesAndSignResponseWire, SignBlockRequestWire, SignResponse,
    TransferLeadershipRequestWire, TransferLeadershipResponseWire, UuidNoncesWire,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use vigil_core::foundation::{CosignerId, Result, SignerError};
use vigil_core::infrastructure::transport::{
    GetNoncesRequest, GetNoncesResponse, PeerClient, SetNoncesAndSignRequest, SetNoncesAndSignResponse,
    SignBlockRequest, SignBlockResponse, TransferLeadershipRequest, TransferLeadershipResponse,
};

// Backstop for requests whose deadline is owned elsewhere (nonce cache,
// remote cosigner); keeps a wedged connection from pinning a task forever.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-over-HTTP implementation of the cosigner peer surface, speaking to a
/// peer's `/v1/cosigner/*` endpoints.
pub struct HttpPeerClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|err| SignerError::TransportError { operation: "build_http_client".to_string(), details: err.to_string() })?;
        Ok(Self { base_url: base_url.into().trim_end_matches('/').to_string(), client })
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(&self, path: &str, body: &Req) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| SignerError::TransportError { operation: path.to_string(), details: err.to_string() })?;
        decode_response(path, response).await
    }

    async fn get<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| SignerError::TransportError { operation: path.to_string(), details: err.to_string() })?;
        decode_response(path, response).await
    }
}

async fn decode_response<Resp: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<Resp> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<Resp>()
            .await
            .map_err(|err| SignerError::SerializationError { format: "json".to_string(), details: err.to_string() });
    }
    match response.json::<ErrorBody>().await {
        Ok(body) => Err(error_from_wire(&body.error.code, body.error.message)),
        Err(_) => Err(SignerError::TransportError {
            operation: path.to_string(),
            details: format!("peer returned status {status}"),
        }),
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn get_nonces(&self, request: GetNoncesRequest) -> Result<GetNoncesResponse> {
        let wire: GetNoncesResponseWire =
            self.post("/v1/cosigner/nonces", &GetNoncesRequestWire { uuids: request.uuids }).await?;
        Ok(GetNoncesResponse { nonces: wire.nonces.into_iter().map(UuidNoncesWire::into_set).collect() })
    }

    async fn set_nonces_and_sign(&self, request: SetNoncesAndSignRequest) -> Result<SetNoncesAndSignResponse> {
        let wire: SetNoncesAndSignResponseWire =
            self.post("/v1/cosigner/sign", &SetNoncesAndSignRequestWire::from_request(&request)).await?;
        Ok(wire.into_response())
    }

    async fn sign_block(&self, request: SignBlockRequest) -> Result<SignBlockResponse> {
        let wire: SignResponse = self.post("/v1/cosigner/block", &SignBlockRequestWire::from_request(&request)).await?;
        Ok(SignBlockResponse { signature: wire.signature, timestamp_nanos: wire.timestamp_nanos })
    }

    async fn transfer_leadership(&self, request: TransferLeadershipRequest) -> Result<TransferLeadershipResponse> {
        let wire: TransferLeadershipResponseWire = self
            .post("/v1/cosigner/leadership", &TransferLeadershipRequestWire { leader_id: request.leader_id.value() })
            .await?;
        Ok(TransferLeadershipResponse {
            leader_id: wire.leader_id.map(CosignerId::new),
            leader_address: wire.leader_address,
        })
    }

    async fn get_leader(&self) -> Result<Option<CosignerId>> {
        let wire: LeaderResponseWire = self.get("/v1/cosigner/leader").await?;
        Ok(wire.leader_id.map(CosignerId::new))
    }

    async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self.get("/health").await?;
        Ok(())
    }
}
