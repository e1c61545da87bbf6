//! Upstream I/O and response assembly shared by the chat completion handler.

mod io;
mod non_streaming;
mod streaming;

pub(crate) use io::{open_upstream_body, LeasedBody, UpstreamIoRequest};
pub(crate) use non_streaming::handle_buffered_request;
pub(crate) use streaming::handle_streaming_request;
