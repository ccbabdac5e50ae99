//! 外部の認証局（identity authority）との連携

mod http;

pub use http::HttpIdentityResolver;
