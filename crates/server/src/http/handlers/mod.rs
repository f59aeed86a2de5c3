pub mod admin;
pub mod comments;
pub mod rpc;
pub mod sse;
