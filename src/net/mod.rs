//! HTTP plumbing: client, headers and the transport.

pub mod client;
pub mod headers;
pub mod transport;

pub use client::{HttpClient, HttpClientBuilder};
pub use transport::{HttpTransport, RequestDescriptor, Transport};
