//! HTTP plumbing: request descriptors, responses and the transport seam.

#[cfg(test)]
pub mod mock;
mod transport;
mod types;

pub use transport::{ReqwestTransport, Transport, TransportError};
pub use types::{Headers, HttpResponse, Method, RequestDescriptor};
