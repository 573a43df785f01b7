//! Decoder engine behind `grpcsnoop`: turns raw kernel-probe byte records
//! into rendered gRPC call lines. No knowledge of the kernel probe itself
//! or of process arguments lives here — see `grpcsnoop-probe` and the
//! `grpcsnoop` binary crate for those.

pub mod connection;
pub mod decoder;
pub mod error;
pub mod event;
pub mod frame;
pub mod hpack;
pub mod preface;
pub mod reassembly;
pub mod render;
pub mod schema;
pub mod stream;

pub use decoder::Decoder;
pub use error::DecodeError;
pub use render::RenderOptions;
