//! Client identity resolution for rate limiting.
//!
//! # Trust Model
//!
//! The gateway is assumed to run behind exactly one reverse proxy in
//! production. With `trust_proxy` enabled the identity comes from, in order:
//!
//! 1. the **rightmost** entry of `X-Forwarded-For` (the address the trusted
//!    proxy appended; anything left of it is client-controlled)
//! 2. `X-Real-IP`
//! 3. the socket peer address from [`ConnectInfo`]
//!
//! Without `trust_proxy` (development) the forwarding headers are ignored and
//! only the peer address is used, so a local client cannot dodge the limiter
//! by spoofing headers.
//!
//! When nothing is available every such request shares the
//! [`UNKNOWN_CLIENT`] key.
//!
//! # Performance
//!
//! Returns `Cow<'static, str>` so the fallback does not allocate.

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::trace;

/// Shared key for requests whose origin cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Where an identity was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentitySource<'a> {
    ForwardedFor(&'a str),
    RealIp(&'a str),
    Peer(SocketAddr),
    Unknown,
}

#[inline]
fn forwarded_identity<B>(req: &Request<B>) -> Option<IdentitySource<'_>> {
    // Format: "client, proxy1, proxy2"; the last hop is the one our proxy wrote.
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(last) = value.rsplit(',').map(str::trim).find(|s| !s.is_empty())
    {
        return Some(IdentitySource::ForwardedFor(last));
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return Some(IdentitySource::RealIp(value.trim()));
    }

    None
}

#[inline]
fn resolve<B>(req: &Request<B>, trust_proxy: bool) -> IdentitySource<'_> {
    if trust_proxy && let Some(source) = forwarded_identity(req) {
        return source;
    }

    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => IdentitySource::Peer(*addr),
        None => IdentitySource::Unknown,
    }
}

/// Resolve the rate-limit key for a request.
///
/// # Example
///
/// ```ignore
/// let client = client_identity(&req, config.trust_proxy());
/// let key = client.into_owned(); // for use in async blocks
/// ```
#[inline]
pub fn client_identity<B>(req: &Request<B>, trust_proxy: bool) -> Cow<'static, str> {
    match resolve(req, trust_proxy) {
        IdentitySource::ForwardedFor(ip) => {
            trace!(client = %ip, "Client identity from X-Forwarded-For");
            Cow::Owned(ip.to_string())
        }
        IdentitySource::RealIp(ip) => {
            trace!(client = %ip, "Client identity from X-Real-IP");
            Cow::Owned(ip.to_string())
        }
        // Port is dropped: one client opens many connections.
        IdentitySource::Peer(addr) => Cow::Owned(addr.ip().to_string()),
        IdentitySource::Unknown => Cow::Borrowed(UNKNOWN_CLIENT),
    }
}
