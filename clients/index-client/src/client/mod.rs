mod builder;
mod http_client;

pub use builder::IndexClientBuilder;
pub use http_client::HttpClient;
