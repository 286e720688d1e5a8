//! Cached gRPC client to peer nodes. One [`tonic::transport::Channel`] per
//! address, created lazily and reused — mirrors the connection-pool
//! pattern used by the peer RPC client this was distilled from.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use strangedb_cluster::merkle::KeyRange;
use strangedb_cluster::{AntiEntropyTransport, GossipTransport, PeerClient};
use strangedb_core::hlc::Timestamp;
use strangedb_core::{Error, Record, Result};
use tonic::transport::Channel;

use super::proto::peer_service_client::PeerServiceClient;
use super::proto::{DeleteRequest, FetchRangeRequest, GetRequest, GossipDigest, SetRequest};

pub struct GrpcPeerClient {
    channels: RwLock<HashMap<String, Channel>>,
    timeout: Duration,
}

impl GrpcPeerClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    async fn client_for(&self, peer: &str) -> std::result::Result<PeerServiceClient<Channel>, String> {
        if let Some(channel) = self.channels.read().get(peer).cloned() {
            return Ok(PeerServiceClient::new(channel));
        }

        let endpoint = format!("http://{peer}");
        let channel = Channel::from_shared(endpoint)
            .map_err(|e| e.to_string())?
            .connect()
            .await
            .map_err(|e| e.to_string())?;

        self.channels
            .write()
            .insert(peer.to_string(), channel.clone());
        Ok(PeerServiceClient::new(channel))
    }
}

#[async_trait]
impl PeerClient for GrpcPeerClient {
    async fn get(&self, peer: &str, key: &[u8]) -> Result<Option<Record>> {
        let mut client = self
            .client_for(peer)
            .await
            .map_err(Error::Transport)?;
        let mut request = tonic::Request::new(GetRequest { key: key.to_vec() });
        request.set_timeout(self.timeout);

        let response = client
            .get(request)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?
            .into_inner();

        if !response.found {
            return Ok(None);
        }
        let record = response
            .record
            .ok_or_else(|| Error::Serialization("missing record in GetResponse".into()))?;
        Ok(Some(record.try_into()?))
    }

    async fn set(&self, peer: &str, record: Record) -> Result<()> {
        let mut client = self
            .client_for(peer)
            .await
            .map_err(Error::Transport)?;
        let mut request = tonic::Request::new(SetRequest {
            record: Some((&record).into()),
        });
        request.set_timeout(self.timeout);

        client
            .set(request)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, peer: &str, key: &[u8], timestamp: Timestamp) -> Result<()> {
        let mut client = self
            .client_for(peer)
            .await
            .map_err(Error::Transport)?;
        let mut request = tonic::Request::new(DeleteRequest {
            key: key.to_vec(),
            timestamp: Some((&timestamp).into()),
        });
        request.set_timeout(self.timeout);

        client
            .delete(request)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl GossipTransport for GrpcPeerClient {
    async fn exchange_digest(
        &self,
        peer: &str,
        local_digest: HashMap<String, i64>,
    ) -> std::result::Result<HashMap<String, i64>, String> {
        let mut client = self.client_for(peer).await?;
        let mut request = tonic::Request::new(GossipDigest {
            heartbeats: local_digest,
        });
        request.set_timeout(self.timeout);

        let response = client
            .gossip_exchange(request)
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.into_inner().heartbeats)
    }
}

#[async_trait]
impl AntiEntropyTransport for GrpcPeerClient {
    async fn fetch_range(&self, peer: &str, range: &KeyRange) -> std::result::Result<Vec<Record>, String> {
        let mut client = self.client_for(peer).await?;
        let mut request = tonic::Request::new(FetchRangeRequest {
            start: range.start.clone(),
            end: range.end.clone(),
        });
        request.set_timeout(self.timeout);

        let response = client
            .fetch_range(request)
            .await
            .map_err(|e| e.to_string())?
            .into_inner();

        response
            .records
            .into_iter()
            .map(|r| r.try_into().map_err(|e: Error| e.to_string()))
            .collect()
    }
}
