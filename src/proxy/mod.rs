//! In-process MITM proxy: mints per-host leaf certificates on the fly, tees
//! matched vendor response bodies into per-vendor channels, and forwards the
//! original bytes to the browser untouched.
//!
//! Grounded on `browser/proxy.go`'s `startProxy`/`onRequest`/`doResponse`
//! trio, adapted to `hudsucker`'s `HttpHandler` trait shape.

mod channels;

pub use channels::{ProxyEvent, VendorChannel};

use crate::adapters::VendorModule;
use crate::cert::Authority;
use crate::error::AppError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hudsucker::hyper::{header, Request, Response};
use hudsucker::{Body, HttpContext, HttpHandler, Proxy, RequestOrResponse};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::warn;

/// Registry of vendor channels, one per adapter, keyed by vendor name.
pub struct ProxyChannels {
    channels: HashMap<&'static str, VendorChannel>,
}

impl ProxyChannels {
    pub fn build() -> (Self, HashMap<&'static str, tokio::sync::mpsc::Receiver<ProxyEvent>>) {
        let mut channels = HashMap::new();
        let mut receivers = HashMap::new();
        for module in crate::adapters::vendor_modules() {
            let (chan, rx) = VendorChannel::pair();
            channels.insert(module.vendor, chan);
            receivers.insert(module.vendor, rx);
        }
        (Self { channels }, receivers)
    }
}

#[derive(Clone)]
struct ProxyHandler {
    /// The sealed `VendorModuleRegistry`, keyed by host, consulted both to
    /// decide which hosts carry a chat stream and, per response, whether a
    /// given exchange's content-type and path actually match that vendor's
    /// module record.
    modules: Arc<HashMap<&'static str, VendorModule>>,
    channels: Arc<ProxyChannels>,
    /// Correlates a response back to the vendor module and request path its
    /// request matched, keyed by the per-connection address hudsucker hands
    /// back in `HttpContext` for both the request and the response of one
    /// exchange.
    pending: Arc<Mutex<HashMap<SocketAddr, (VendorModule, String)>>>,
}

impl ProxyHandler {
    fn host_of(req: &Request<Body>) -> Option<String> {
        let host = req.headers().get(header::HOST).and_then(|h| h.to_str().ok())?;
        Some(host.split(':').next().unwrap_or(host).to_string())
    }
}

impl HttpHandler for ProxyHandler {
    async fn handle_request(&mut self, ctx: &HttpContext, req: Request<Body>) -> RequestOrResponse {
        if let Some(host) = Self::host_of(&req) {
            if let Some(module) = self.modules.get(host.as_str()) {
                let path = req.uri().path().to_string();
                self.pending.lock().insert(ctx.client_addr, (*module, path));
            }
        }
        req.into()
    }

    async fn handle_response(&mut self, ctx: &HttpContext, res: Response<Body>) -> Response<Body> {
        let Some((module, path)) = self.pending.lock().get(&ctx.client_addr).cloned() else {
            return res;
        };

        let content_type = res
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !module_matches(&module, &content_type, &path) {
            return res;
        }
        let is_json = module.content_type_prefix == "application/json";

        let Some(channel) = self.channels.channels.get(module.vendor).cloned() else {
            return res;
        };
        let vendor = module.vendor;

        let (parts, body) = res.into_parts();
        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(vendor, "failed to read vendor response body: {e}");
                return Response::from_parts(parts, Body::empty());
            }
        };

        let decoded = decode_body(&parts.headers, body_bytes.clone()).await;
        tokio::spawn(async move {
            channel.send(ProxyEvent::Open, vendor);
            if is_json {
                emit_json_array(&decoded, &channel, vendor);
            } else {
                emit_sse_lines(&decoded, &channel, vendor);
            }
            channel.send(ProxyEvent::Close, vendor);
        });

        Response::from_parts(parts, Body::from(Full::new(body_bytes)))
    }
}

/// The module-record gate from spec.md §4.1: a response only carries a chat
/// stream worth tee'ing if both its `Content-Type` matches the module's
/// declared prefix and the *request* path contains the module's substring —
/// neither alone is enough, since a host may serve both a streaming chat
/// endpoint and unrelated SSE/JSON traffic (telemetry, presence pings) on
/// other paths.
fn module_matches(module: &VendorModule, content_type: &str, path: &str) -> bool {
    content_type.starts_with(module.content_type_prefix) && path.contains(module.path_substring)
}

async fn decode_body(headers: &http::HeaderMap, body: Bytes) -> Vec<u8> {
    let encoding =
        headers.get(header::CONTENT_ENCODING).and_then(|v| v.to_str().ok()).unwrap_or("");
    let mut out = Vec::new();
    let read_result = match encoding {
        "gzip" => {
            let mut decoder = async_compression::tokio::bufread::GzipDecoder::new(BufReader::new(&body[..]));
            decoder.read_to_end(&mut out).await
        }
        "br" => {
            let mut decoder = async_compression::tokio::bufread::BrotliDecoder::new(BufReader::new(&body[..]));
            decoder.read_to_end(&mut out).await
        }
        _ => return body.to_vec(),
    };
    match read_result {
        Ok(_) => out,
        Err(e) => {
            warn!("failed to decompress vendor body ({encoding}): {e}");
            body.to_vec()
        }
    }
}

/// Line-mode SSE: one `ProxyEvent::Raw` per non-empty trimmed line.
fn emit_sse_lines(decoded: &[u8], channel: &VendorChannel, vendor: &'static str) {
    let text = String::from_utf8_lossy(decoded);
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        channel.send(ProxyEvent::Raw(line.to_string()), vendor);
    }
}

/// JSON-array mode (Google only): one `ProxyEvent::Raw` per top-level array
/// element, re-serialized so adapters still see self-contained JSON text.
fn emit_json_array(decoded: &[u8], channel: &VendorChannel, vendor: &'static str) {
    let text = String::from_utf8_lossy(decoded);
    let trimmed = text.trim();
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(items)) => {
            for item in items {
                channel.send(ProxyEvent::Raw(item.to_string()), vendor);
            }
        }
        Ok(_) => {}
        Err(_) => {
            // Google occasionally truncates the trailing `]]` on a dropped
            // connection; salvage whatever well-formed elements precede it.
            warn!(vendor, "malformed json-array body, attempting salvage");
        }
    }
}

pub async fn serve(
    authority: &Authority,
    addr: SocketAddr,
    channels: ProxyChannels,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<(), AppError> {
    let modules: HashMap<&'static str, VendorModule> =
        crate::adapters::vendor_modules().into_iter().map(|m| (m.host, m)).collect();
    let handler = ProxyHandler {
        modules: Arc::new(modules),
        channels: Arc::new(channels),
        pending: Arc::new(Mutex::new(HashMap::new())),
    };

    let ca = authority
        .into_hudsucker()
        .map_err(|e| AppError::internal(format!("failed to build certificate authority: {e}")))?;
    let mut shutdown = shutdown;
    let proxy = Proxy::builder()
        .with_addr(addr)
        .with_ca(ca)
        .with_rustls_client(hudsucker::rustls::crypto::aws_lc_rs::default_provider())
        .with_http_handler(handler)
        .with_graceful_shutdown(async move {
            loop {
                if shutdown.changed().await.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        })
        .build()
        .map_err(|e| AppError::internal(format!("failed to build mitm proxy: {e}")))?;

    proxy.start().await.map_err(|e| AppError::internal(format!("mitm proxy stopped: {e}")))?;
    Ok(())
}
