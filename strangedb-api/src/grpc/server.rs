//! Replica-facing gRPC service: every method here operates on this node's
//! local store or local gossip state. The caller is always a remote
//! coordinator or anti-entropy loop, never a client application — those go
//! through `strangedb-api::http` instead.

use std::sync::Arc;

use strangedb_cluster::Gossiper;
use strangedb_core::Record;
use strangedb_storage::RecordStore;
use tonic::{Request, Response, Status};

use super::proto::peer_service_server::PeerService;
use super::proto::{
    DeleteRequest, DeleteResponse, FetchRangeRequest, FetchRangeResponse, GetRequest,
    GetResponse, GossipDigest, SetRequest, SetResponse,
};

pub struct PeerServer<S: RecordStore> {
    store: Arc<S>,
    gossiper: Arc<Gossiper>,
}

impl<S: RecordStore> PeerServer<S> {
    pub fn new(store: Arc<S>, gossiper: Arc<Gossiper>) -> Self {
        Self { store, gossiper }
    }
}

fn storage_err(e: strangedb_core::Error) -> Status {
    Status::internal(e.to_string())
}

#[tonic::async_trait]
impl<S: RecordStore + 'static> PeerService for PeerServer<S> {
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let key = request.into_inner().key;
        match self.store.get(&key).await {
            Ok(record) => Ok(Response::new(GetResponse {
                found: true,
                record: Some((&record).into()),
            })),
            Err(strangedb_core::Error::KeyNotFound) => Ok(Response::new(GetResponse {
                found: false,
                record: None,
            })),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn set(&self, request: Request<SetRequest>) -> Result<Response<SetResponse>, Status> {
        let proto_record = request
            .into_inner()
            .record
            .ok_or_else(|| Status::invalid_argument("missing record"))?;
        let record: Record = proto_record
            .try_into()
            .map_err(|e: strangedb_core::Error| Status::invalid_argument(e.to_string()))?;

        self.store.set(record).await.map_err(storage_err)?;
        Ok(Response::new(SetResponse { success: true }))
    }

    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        let req = request.into_inner();
        let timestamp = req
            .timestamp
            .ok_or_else(|| Status::invalid_argument("missing timestamp"))?;

        self.store
            .delete(&req.key, timestamp.into())
            .await
            .map_err(storage_err)?;
        Ok(Response::new(DeleteResponse { success: true }))
    }

    async fn gossip_exchange(
        &self,
        request: Request<GossipDigest>,
    ) -> Result<Response<GossipDigest>, Status> {
        let incoming = request.into_inner().heartbeats;
        self.gossiper.apply_digest(incoming);
        Ok(Response::new(GossipDigest {
            heartbeats: self.gossiper.local_digest(),
        }))
    }

    async fn fetch_range(
        &self,
        request: Request<FetchRangeRequest>,
    ) -> Result<Response<FetchRangeResponse>, Status> {
        let req = request.into_inner();
        let all = self.store.list(b"", usize::MAX).await.map_err(storage_err)?;

        let records = all
            .into_iter()
            .filter(|r| {
                r.key.as_slice() >= req.start.as_slice()
                    && req.end.as_deref().map_or(true, |end| r.key.as_slice() < end)
            })
            .map(|r| (&r).into())
            .collect();

        Ok(Response::new(FetchRangeResponse { records }))
    }
}
