//! Generated by `tonic-build` from `proto/health.proto` at build time.
pub mod grpc_health_v1 {
    tonic::include_proto!("grpc.health.v1");
}
