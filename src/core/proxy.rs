// src/core/proxy.rs
//
// Race the same GET through many proxies; first HTTP 200 wins.

use std::{
    sync::{mpsc, Arc, atomic::{AtomicBool, AtomicUsize, Ordering}},
    thread,
};

use super::net::{Response, Transport};

pub struct ProxyRace {
    transport: Arc<dyn Transport>,
    pool: usize,
}

impl ProxyRace {
    pub fn new(transport: Arc<dyn Transport>, pool: usize) -> Self {
        Self { transport, pool: pool.max(1) }
    }

    /// Try `url` through every proxy on at most `pool` worker threads.
    /// Returns the first 200 and tells the remaining workers to stop picking
    /// up proxies; requests already in flight run out their own timeout in
    /// the background. `None` when no proxy produced a 200.
    pub fn fetch(&self, url: &str, proxies: &[String]) -> Option<Response> {
        if proxies.is_empty() {
            return None;
        }

        let list = Arc::new(proxies.to_vec());
        let next = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<(String, Option<Response>)>();

        let workers = self.pool.min(list.len());
        for _ in 0..workers {
            let list = Arc::clone(&list);
            let next = Arc::clone(&next);
            let done = Arc::clone(&done);
            let transport = Arc::clone(&self.transport);
            let tx = tx.clone();
            let url = s!(url);

            thread::spawn(move || {
                loop {
                    if done.load(Ordering::Relaxed) {
                        break;
                    }
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    if i >= list.len() {
                        break;
                    }
                    let proxy = &list[i];
                    let resp = match transport.get(&url, Some(proxy.as_str())) {
                        Ok(r) => Some(r),
                        Err(e) => {
                            if !done.load(Ordering::Relaxed) {
                                logd!("Proxy {proxy} failed: {e}");
                            }
                            None
                        }
                    };
                    if tx.send((proxy.clone(), resp)).is_err() {
                        break; // caller already returned
                    }
                }
            });
        }
        drop(tx);

        for (proxy, resp) in rx.iter() {
            match resp {
                Some(r) if r.is_ok() => {
                    done.store(true, Ordering::Relaxed);
                    logf!("Fetched {url} via proxy {proxy}");
                    return Some(r);
                }
                Some(r) => logd!("Proxy {proxy} returned {}", r.status),
                None => {}
            }
        }
        loge!("All {} proxies failed for {url}", list.len());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use std::time::Duration;

    /// Only `good` answers 200; `slow` sleeps first.
    struct Proxies {
        good: &'static str,
        slow: &'static str,
    }

    impl Transport for Proxies {
        fn get(&self, url: &str, proxy: Option<&str>) -> Result<Response> {
            let p = proxy.unwrap_or_default();
            if p == self.slow {
                thread::sleep(Duration::from_millis(200));
            }
            if p == self.good {
                Ok(Response::ok(format!("from {p}")))
            } else if p.starts_with("http://dead") {
                Err(Error::fetch(url, "connection refused"))
            } else {
                Ok(Response { status: 403, body: s!() })
            }
        }
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s!(*s)).collect()
    }

    #[test]
    fn first_success_wins() {
        let race = ProxyRace::new(Arc::new(Proxies { good: "http://ok:1", slow: "http://blocked:1" }), 4);
        let got = race.fetch("http://x/", &list(&["http://blocked:1", "http://dead:1", "http://ok:1"]));
        assert_eq!(got.map(|r| r.body), Some(s!("from http://ok:1")));
    }

    #[test]
    fn all_fail_is_none() {
        let race = ProxyRace::new(Arc::new(Proxies { good: "-", slow: "-" }), 2);
        assert!(race.fetch("http://x/", &list(&["http://dead:1", "http://blocked:2", "http://dead:3"])).is_none());
        assert!(race.fetch("http://x/", &[]).is_none());
    }
}
