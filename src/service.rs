//! The gRPC surface every node exposes to its peers. Each handler is a thin
//! wrapper: Chord routing calls defer to [`NodeCore`], key-value calls defer
//! to the local store, and anti-entropy calls defer to [`crate::replicator`].

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::hashing::is_between;
use crate::node::{NodeCore, NodeInfo};
use crate::proto::chord_server::Chord;
use crate::proto::{
    AckMsg, Empty, IdMsg, KeyMsg, KeyValueList, KeyValueMsg, NodeSummaryMsg, PartitionMsg,
    PartitionResultMsg, TimeStampMsg, ValueMsg,
};
use crate::replicator;
use crate::store::is_meta_key;

pub struct RingService {
    pub core: Arc<NodeCore>,
}

impl RingService {
    pub fn new(core: Arc<NodeCore>) -> Self {
        RingService { core }
    }
}

#[tonic::async_trait]
impl Chord for RingService {
    async fn find_successor(
        &self,
        request: Request<IdMsg>,
    ) -> Result<Response<crate::proto::NodeInfo>, Status> {
        let id = request.into_inner().id;
        let successor = self
            .core
            .find_successor(id)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(successor.into()))
    }

    async fn get_predecessor(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<crate::proto::NodeInfo>, Status> {
        let pred = self.core.predecessor().unwrap_or(NodeInfo::new(0, ""));
        Ok(Response::new(pred.into()))
    }

    async fn update_predecessor(
        &self,
        request: Request<crate::proto::NodeInfo>,
    ) -> Result<Response<Empty>, Status> {
        let candidate: NodeInfo = request.into_inner().into();
        let current = self.core.predecessor();

        let accept = match &current {
            None => true,
            Some(pred) => is_between(candidate.id, pred.id, self.core.id(), false, false),
        };
        if accept {
            self.core.set_predecessor(Some(candidate));
        }
        Ok(Response::new(Empty {}))
    }

    async fn ping(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        Ok(Response::new(Empty {}))
    }

    async fn get(&self, request: Request<KeyMsg>) -> Result<Response<ValueMsg>, Status> {
        let key = request.into_inner().key;
        match self.core.store.get(&key) {
            Some(value) => Ok(Response::new(ValueMsg { value, found: true })),
            None => Ok(Response::new(ValueMsg {
                value: Vec::new(),
                found: false,
            })),
        }
    }

    async fn put(&self, request: Request<KeyValueMsg>) -> Result<Response<Empty>, Status> {
        let msg = request.into_inner();
        if is_meta_key(&msg.key) {
            // Meta keys written directly over the wire (replication pushes)
            // bypass version stamping — the version lives in a sibling key.
            self.core.store.put(&msg.key, msg.value);
        } else {
            let version = self.core.clock.now_ms();
            self.core.store.put_with_version(&msg.key, msg.value, version);
        }
        Ok(Response::new(Empty {}))
    }

    async fn delete(&self, request: Request<KeyMsg>) -> Result<Response<Empty>, Status> {
        let key = request.into_inner().key;
        if is_meta_key(&key) {
            self.core.store.delete(&key);
        } else {
            let version = self.core.clock.now_ms();
            self.core.store.delete_with_version(&key, version);
        }
        Ok(Response::new(Empty {}))
    }

    async fn get_all_keys(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<KeyValueList>, Status> {
        let items = self
            .core
            .store
            .all_keys()
            .into_iter()
            .filter_map(|key| {
                self.core.store.get(&key).map(|value| KeyValueMsg { key, value })
            })
            .collect();
        Ok(Response::new(KeyValueList { items }))
    }

    async fn set_partition(
        &self,
        request: Request<PartitionMsg>,
    ) -> Result<Response<AckMsg>, Status> {
        let msg = request.into_inner();
        replicator::apply_partition(&self.core, msg.values, msg.versions, msg.removed);
        Ok(Response::new(AckMsg { ok: true }))
    }

    async fn resolve_data(
        &self,
        request: Request<PartitionMsg>,
    ) -> Result<Response<PartitionResultMsg>, Status> {
        let msg = request.into_inner();
        let (values, versions, removed) =
            replicator::resolve_data(&self.core, msg.values, msg.versions, msg.removed);
        Ok(Response::new(PartitionResultMsg {
            ok: true,
            partition: Some(PartitionMsg {
                values,
                versions,
                removed,
            }),
        }))
    }

    async fn get_time(&self, _request: Request<Empty>) -> Result<Response<TimeStampMsg>, Status> {
        Ok(Response::new(TimeStampMsg {
            millis: self.core.clock.now_ms(),
        }))
    }

    async fn get_node_summary(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<NodeSummaryMsg>, Status> {
        if !self.core.dev_mode {
            return Err(Status::permission_denied("dev_mode is disabled on this node"));
        }
        Ok(Response::new(NodeSummaryMsg {
            self_info: Some((&self.core.self_info).into()),
            predecessor: Some(self.core.predecessor().unwrap_or(NodeInfo::new(0, "")).into()),
            fingers: self.core.finger_snapshot().into_iter().map(Into::into).collect(),
            stored_keys: self.core.store.base_keys().len() as u32,
        }))
    }
}
