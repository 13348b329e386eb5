// src/core/net.rs
//
// Blocking HTTP GET: direct first, proxy race as fallback.

use std::sync::Arc;
use std::time::Duration;

use crate::config::options::NetOptions;
use crate::error::{Error, Result};

use super::proxy::ProxyRace;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// One GET, optionally through a proxy. Non-200 statuses are responses,
/// not errors; only transport failures are `Err`.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, proxy: Option<&str>) -> Result<Response>;
}

pub struct UreqTransport {
    direct: ureq::Agent,
    proxy_timeout: Duration,
    user_agent: String,
}

fn build_agent(timeout: Duration, user_agent: &str, proxy: Option<ureq::Proxy>) -> ureq::Agent {
    let mut builder = ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(user_agent)
        .try_proxy_from_env(false);
    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy);
    }
    builder.build()
}

impl UreqTransport {
    pub fn new(opts: &NetOptions) -> Self {
        let timeout = Duration::from_secs(opts.timeout_secs.max(1));
        Self {
            direct: build_agent(timeout, &opts.user_agent, None),
            proxy_timeout: Duration::from_secs(opts.proxy_timeout_secs.max(1)),
            user_agent: opts.user_agent.clone(),
        }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, proxy: Option<&str>) -> Result<Response> {
        let agent = match proxy {
            None => self.direct.clone(),
            Some(p) => {
                let proxy = ureq::Proxy::new(p).map_err(|e| Error::fetch(url, format!("bad proxy {p}: {e}")))?;
                build_agent(self.proxy_timeout, &self.user_agent, Some(proxy))
            }
        };

        match agent.get(url).call() {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.into_string().map_err(|e| Error::fetch(url, e))?;
                Ok(Response { status, body })
            }
            Err(ureq::Error::Status(status, resp)) => {
                Ok(Response { status, body: resp.into_string().unwrap_or_default() })
            }
            Err(ureq::Error::Transport(t)) => Err(Error::fetch(url, t)),
        }
    }
}

/// What the site adapter fetches through.
pub struct HttpFetcher {
    transport: Arc<dyn Transport>,
    race: ProxyRace,
    proxies: Vec<String>,
    force_proxy: bool,
}

impl HttpFetcher {
    pub fn new(transport: Arc<dyn Transport>, opts: &NetOptions) -> Self {
        Self {
            race: ProxyRace::new(Arc::clone(&transport), opts.proxy_pool),
            transport,
            proxies: opts.proxies.clone(),
            force_proxy: opts.force_proxy,
        }
    }

    pub fn from_options(opts: &NetOptions) -> Self {
        Self::new(Arc::new(UreqTransport::new(opts)), opts)
    }

    /// Body of a 200 response for `url`.
    pub fn get(&self, url: &str) -> Result<String> {
        let direct_err = if self.force_proxy {
            Error::fetch(url, "direct fetch disabled")
        } else {
            match self.transport.get(url, None) {
                Ok(resp) if resp.is_ok() => return Ok(resp.body),
                Ok(resp) => {
                    logw!("Direct fetch of {url} returned {}, trying proxies", resp.status);
                    Error::HttpStatus { url: s!(url), status: resp.status }
                }
                Err(e) => {
                    logw!("Direct fetch failed: {e}, trying proxies");
                    e
                }
            }
        };

        if self.proxies.is_empty() {
            return Err(direct_err);
        }
        match self.race.fetch(url, &self.proxies) {
            Some(resp) => Ok(resp.body),
            None => Err(Error::fetch(url, format!("all {} proxies failed", self.proxies.len()))),
        }
    }
}
