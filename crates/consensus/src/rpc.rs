//! Wire types and tonic glue for the inter-master peer service.
//!
//! One gRPC service (`strata.master.PeerService`) carries all master-to-
//! master traffic: peer UUID discovery plus the three raft RPCs. The raft
//! payloads are postcard-encoded openraft request/response values in a
//! single bytes field; the workspace carries no protoc toolchain, so the
//! message structs derive `prost::Message` directly and the client/server
//! glue below is written by hand against tonic's low-level API, in the shape
//! tonic's code generator produces for a unary-only service.

/// Request for a peer's identity.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetNodeInstanceRequest {}

/// A peer's identity: its permanent UUID and the RPC address it advertises.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetNodeInstanceResponse {
    /// The peer's permanent UUID, in canonical string form.
    #[prost(string, tag = "1")]
    pub permanent_uuid: ::prost::alloc::string::String,
    /// The `host:port` the peer serves RPCs on.
    #[prost(string, tag = "2")]
    pub rpc_addr: ::prost::alloc::string::String,
}

/// A raft RPC payload addressed to one tablet's consensus group.
///
/// `body` is a postcard-encoded openraft request on the way in and a
/// postcard-encoded openraft response on the way out.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConsensusPayload {
    /// The tablet whose raft instance should handle this RPC.
    #[prost(string, tag = "1")]
    pub tablet_id: ::prost::alloc::string::String,
    /// Postcard-encoded openraft message.
    #[prost(bytes = "vec", tag = "2")]
    pub body: ::prost::alloc::vec::Vec<u8>,
}

/// Client for the inter-master peer service.
pub mod peer_service_client {
    #![allow(unused_variables, dead_code, missing_docs)]

    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::codegen::*;

    use super::{ConsensusPayload, GetNodeInstanceRequest, GetNodeInstanceResponse};

    #[derive(Debug, Clone)]
    pub struct PeerServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl PeerServiceClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> PeerServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        async fn unary<Req, Resp>(
            &mut self,
            path: &'static str,
            method: &'static str,
            request: impl tonic::IntoRequest<Req>,
        ) -> std::result::Result<tonic::Response<Resp>, tonic::Status>
        where
            Req: prost::Message + Send + Sync + 'static,
            Resp: prost::Message + Default + Send + Sync + 'static,
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("strata.master.PeerService", method));
            self.inner
                .unary(req, PathAndQuery::from_static(path), codec)
                .await
        }

        /// Resolves the remote peer's permanent UUID and advertised address.
        pub async fn get_node_instance(
            &mut self,
            request: impl tonic::IntoRequest<GetNodeInstanceRequest>,
        ) -> std::result::Result<tonic::Response<GetNodeInstanceResponse>, tonic::Status> {
            self.unary(
                "/strata.master.PeerService/GetNodeInstance",
                "GetNodeInstance",
                request,
            )
            .await
        }

        /// Raft vote RPC.
        pub async fn vote(
            &mut self,
            request: impl tonic::IntoRequest<ConsensusPayload>,
        ) -> std::result::Result<tonic::Response<ConsensusPayload>, tonic::Status> {
            self.unary("/strata.master.PeerService/Vote", "Vote", request).await
        }

        /// Raft append-entries RPC.
        pub async fn append_entries(
            &mut self,
            request: impl tonic::IntoRequest<ConsensusPayload>,
        ) -> std::result::Result<tonic::Response<ConsensusPayload>, tonic::Status> {
            self.unary("/strata.master.PeerService/AppendEntries", "AppendEntries", request)
                .await
        }

        /// Raft install-snapshot RPC.
        pub async fn install_snapshot(
            &mut self,
            request: impl tonic::IntoRequest<ConsensusPayload>,
        ) -> std::result::Result<tonic::Response<ConsensusPayload>, tonic::Status> {
            self.unary(
                "/strata.master.PeerService/InstallSnapshot",
                "InstallSnapshot",
                request,
            )
            .await
        }
    }
}

/// Server for the inter-master peer service.
pub mod peer_service_server {
    #![allow(unused_variables, dead_code, missing_docs)]

    use tonic::codegen::*;

    use super::{ConsensusPayload, GetNodeInstanceRequest, GetNodeInstanceResponse};

    /// The service-side trait implemented by the master's RPC handler.
    #[async_trait]
    pub trait PeerService: Send + Sync + 'static {
        /// Resolves this peer's permanent UUID and advertised address.
        async fn get_node_instance(
            &self,
            request: tonic::Request<GetNodeInstanceRequest>,
        ) -> std::result::Result<tonic::Response<GetNodeInstanceResponse>, tonic::Status>;

        /// Raft vote RPC.
        async fn vote(
            &self,
            request: tonic::Request<ConsensusPayload>,
        ) -> std::result::Result<tonic::Response<ConsensusPayload>, tonic::Status>;

        /// Raft append-entries RPC.
        async fn append_entries(
            &self,
            request: tonic::Request<ConsensusPayload>,
        ) -> std::result::Result<tonic::Response<ConsensusPayload>, tonic::Status>;

        /// Raft install-snapshot RPC.
        async fn install_snapshot(
            &self,
            request: tonic::Request<ConsensusPayload>,
        ) -> std::result::Result<tonic::Response<ConsensusPayload>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct PeerServiceServer<T: PeerService> {
        inner: Arc<T>,
    }

    impl<T: PeerService> PeerServiceServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: PeerService> Clone for PeerServiceServer<T> {
        fn clone(&self) -> Self {
            Self { inner: Arc::clone(&self.inner) }
        }
    }

    impl<T, B> tonic::codegen::Service<http::Request<B>> for PeerServiceServer<T>
    where
        T: PeerService,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = Arc::clone(&self.inner);
            match req.uri().path() {
                "/strata.master.PeerService/GetNodeInstance" => Box::pin(async move {
                    struct GetNodeInstanceSvc<T: PeerService>(Arc<T>);
                    impl<T: PeerService> tonic::server::UnaryService<GetNodeInstanceRequest>
                        for GetNodeInstanceSvc<T>
                    {
                        type Response = GetNodeInstanceResponse;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<GetNodeInstanceRequest>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            Box::pin(async move { inner.get_node_instance(request).await })
                        }
                    }
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    let res = grpc.unary(GetNodeInstanceSvc(inner), req).await;
                    Ok(res)
                }),
                "/strata.master.PeerService/Vote" => Box::pin(async move {
                    struct VoteSvc<T: PeerService>(Arc<T>);
                    impl<T: PeerService> tonic::server::UnaryService<ConsensusPayload> for VoteSvc<T> {
                        type Response = ConsensusPayload;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<ConsensusPayload>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            Box::pin(async move { inner.vote(request).await })
                        }
                    }
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    let res = grpc.unary(VoteSvc(inner), req).await;
                    Ok(res)
                }),
                "/strata.master.PeerService/AppendEntries" => Box::pin(async move {
                    struct AppendEntriesSvc<T: PeerService>(Arc<T>);
                    impl<T: PeerService> tonic::server::UnaryService<ConsensusPayload>
                        for AppendEntriesSvc<T>
                    {
                        type Response = ConsensusPayload;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<ConsensusPayload>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            Box::pin(async move { inner.append_entries(request).await })
                        }
                    }
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    let res = grpc.unary(AppendEntriesSvc(inner), req).await;
                    Ok(res)
                }),
                "/strata.master.PeerService/InstallSnapshot" => Box::pin(async move {
                    struct InstallSnapshotSvc<T: PeerService>(Arc<T>);
                    impl<T: PeerService> tonic::server::UnaryService<ConsensusPayload>
                        for InstallSnapshotSvc<T>
                    {
                        type Response = ConsensusPayload;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<ConsensusPayload>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            Box::pin(async move { inner.install_snapshot(request).await })
                        }
                    }
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    let res = grpc.unary(InstallSnapshotSvc(inner), req).await;
                    Ok(res)
                }),
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(empty_body())
                        .unwrap())
                }),
            }
        }
    }

    impl<T: PeerService> tonic::server::NamedService for PeerServiceServer<T> {
        const NAME: &'static str = "strata.master.PeerService";
    }
}
