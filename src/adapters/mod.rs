//! Vendor adapter registry.
//!
//! Grounded on `browser/chat_handler.go`'s `chatHandlers` map + `registerChatHandler`,
//! generalized per SPEC_FULL.md §4: the registry holds adapter *factories*
//! rather than singletons, so `orchestrator::handle_chat` can construct a
//! fresh adapter instance per session (the redesign spec.md §9 recommends,
//! driven by the fact that adapters like DeepSeek/Qwen/ZhiPu carry
//! reasoning-phase state across their own lifetime).

mod baidu;
mod deepseek;
mod doubao;
mod google;
mod kimi;
mod qwen;
mod yuanbao;
mod zhipu;

use crate::error::AppError;
use crate::message::NormalizedMessage;
use async_trait::async_trait;
use fantoccini::Client;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Toggle {
    #[default]
    Enabled,
    Disabled,
}

impl Toggle {
    pub fn is_enabled(self) -> bool {
        self == Toggle::Enabled
    }
}

#[derive(Clone)]
pub struct AdapterOptions {
    pub client: Client,
    pub thinking: Toggle,
    pub websearch: Toggle,
}

/// A vendor-specific driver for one chat session in one browser page.
///
/// One fresh instance is created per session (see [`make`]); any per-event
/// state an adapter accumulates (e.g. a reasoning-phase flag, or ZhiPu's
/// tail-diff block history) lives on `self` and is discarded with the
/// session.
#[async_trait]
pub trait ChatAdapter: Send {
    fn name(&self) -> &'static str;
    fn url(&self) -> &'static str;

    async fn setup(&mut self, options: AdapterOptions);
    async fn input(&mut self, prompt: &str) -> Result<(), AppError>;
    async fn send(&mut self) -> Result<(), AppError>;

    /// Parses one raw tee'd event line/frame into a normalized message, or
    /// `None` if the event carries nothing worth surfacing (a status ping,
    /// a suggestion block, an unparsable fragment).
    fn unmarshal(&mut self, raw: &str) -> Option<NormalizedMessage>;
}

type Factory = fn() -> Box<dyn ChatAdapter>;

const REGISTRY: &[Factory] = &[
    || Box::new(doubao::DoubaoAdapter::default()),
    || Box::new(deepseek::DeepSeekAdapter::default()),
    || Box::new(qwen::QwenAdapter::default()),
    || Box::new(kimi::KimiAdapter::default()),
    || Box::new(yuanbao::YuanbaoAdapter::default()),
    || Box::new(zhipu::ZhiPuAdapter::default()),
    || Box::new(baidu::BaiduAdapter::default()),
    || Box::new(google::GoogleAdapter::default()),
];

/// All registered model names, sorted.
pub fn models() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.iter().map(|f| f().name()).collect();
    names.sort_unstable();
    names
}

pub fn exists(model: &str) -> bool {
    REGISTRY.iter().any(|f| f().name() == model)
}

/// Constructs a fresh adapter instance for `model`, or `None` if unknown.
pub fn make(model: &str) -> Option<Box<dyn ChatAdapter>> {
    REGISTRY.iter().map(|f| f()).find(|a| a.name() == model)
}

/// One entry of the MITM module record from spec.md §3: the host a vendor's
/// traffic arrives on, plus the `Content-Type` prefix and request-path
/// substring that together gate which responses on that host actually carry
/// a chat stream worth tee'ing (as opposed to, say, a static asset fetch or
/// an unrelated XHR to the same domain).
#[derive(Clone, Copy)]
pub struct VendorModule {
    pub vendor: &'static str,
    pub host: &'static str,
    pub content_type_prefix: &'static str,
    pub path_substring: &'static str,
}

/// Content-type/path discriminators per vendor. Doubao's pair is reproduced
/// verbatim from the original's single hardcoded `mitmHosts` entry
/// (`strings.HasSuffix(path, "/chat/completion")` +
/// `strings.HasPrefix(contentType, "text/event-stream")`); the original only
/// ever MITM'd Doubao, so the remaining vendors' path substrings are this
/// crate's own extrapolation from each vendor's known streaming-completion
/// route, kept as a narrow substring rather than a full path so minor query
/// string or versioning changes upstream don't break interception. Google
/// alone replies as a JSON body rather than SSE.
const MODULE_TABLE: &[(&str, &str, &str)] = &[
    ("doubao", "text/event-stream", "/chat/completion"),
    ("deepseek", "text/event-stream", "/completion"),
    ("qwen", "text/event-stream", "/conversation"),
    ("kimi", "text/event-stream", "/chat/completion"),
    ("yuanbao", "text/event-stream", "/chat"),
    ("zhipu", "text/event-stream", "/chat/completion"),
    ("baidu", "text/event-stream", "/chat"),
    ("google", "application/json", "/StreamGenerate"),
];

/// The sealed `VendorModuleRegistry`, built once from the adapter registry
/// and [`MODULE_TABLE`]; consulted by the proxy to decide both which CONNECT
/// hosts to intercept and, per response, whether it actually belongs to a
/// chat stream.
pub fn vendor_modules() -> Vec<VendorModule> {
    REGISTRY
        .iter()
        .map(|f| {
            let adapter = f();
            let without_scheme = adapter.url().splitn(2, "://").nth(1).unwrap_or(adapter.url());
            let host = without_scheme.split('/').next().unwrap_or(without_scheme);
            let (_, content_type_prefix, path_substring) = MODULE_TABLE
                .iter()
                .find(|(vendor, _, _)| *vendor == adapter.name())
                .unwrap_or_else(|| panic!("no module table entry for vendor {}", adapter.name()));
            VendorModule {
                vendor: adapter.name(),
                host: Box::leak(host.to_string().into_boxed_str()),
                content_type_prefix,
                path_substring,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_are_sorted_and_complete() {
        let names = models();
        assert_eq!(names.len(), 8);
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(names.contains(&"doubao"));
        assert!(names.contains(&"google"));
    }

    #[test]
    fn exists_matches_registry() {
        assert!(exists("deepseek"));
        assert!(!exists("gpt-4"));
    }

    #[test]
    fn make_returns_fresh_instance_each_call() {
        let a = make("kimi").expect("kimi registered");
        assert_eq!(a.name(), "kimi");
        assert!(make("unknown-vendor").is_none());
    }

    #[test]
    fn vendor_modules_cover_every_adapter_with_doubao_matching_the_original() {
        let modules = vendor_modules();
        assert_eq!(modules.len(), 8);
        let doubao = modules.iter().find(|m| m.vendor == "doubao").unwrap();
        assert_eq!(doubao.content_type_prefix, "text/event-stream");
        assert_eq!(doubao.path_substring, "/chat/completion");
        assert!(modules.iter().all(|m| !m.path_substring.is_empty() && !m.host.is_empty()));
    }
}
