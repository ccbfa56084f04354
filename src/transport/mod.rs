mod upstream;

pub(crate) use upstream::forwarded_response;
pub use upstream::{chat_completions_url, UpstreamClient, UpstreamResult};
