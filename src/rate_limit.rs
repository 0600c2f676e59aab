//! Fixed-window request limiter keyed by client address

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::debug;

#[derive(Debug, Clone, Copy)]
struct Window
{   started: Instant
  , count: u32
}

/// At most `limit` requests per client per `window`.
/// Windows start at the first request a client makes.
#[derive(Debug)]
pub struct RateLimiter
{   limit: u32
  , window: Duration
  , clients: DashMap<String, Window>
  , last_sweep: Mutex<Instant>
}

impl RateLimiter
{   pub fn new(limit: u32, window: Duration) -> Self
    {   RateLimiter
        {   limit
          , window
          , clients: DashMap::new()
          , last_sweep: Mutex::new(Instant::now())
        }
    }

    pub fn per_minute(limit: u32) -> Self
    {   RateLimiter::new(limit, Duration::from_secs(60))
    }

    /// Count a request from `client` and report whether it is allowed
    pub fn check(&self, client: &str) -> bool
    {   self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> bool
    {   self.maybe_sweep(now);

        let mut entry = self.clients
          .entry(client.to_string())
          .or_insert(Window { started: now, count: 0 });

        if now.duration_since(entry.started) >= self.window
        {   *entry = Window { started: now, count: 0 };
        }

        if entry.count >= self.limit
        {   debug!("Rate limit hit for {}", client);
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drop expired windows, at most once per window length.
    /// Must not be called while holding a map entry.
    fn maybe_sweep(&self, now: Instant)
    {   let mut last_sweep = match self.last_sweep.try_lock()
        {   Ok(guard) => guard
          , Err(_) => return
        };
        if now.duration_since(*last_sweep) < self.window
        {   return;
        }
        *last_sweep = now;
        drop(last_sweep);

        let window = self.window;
        let before = self.clients.len();
        self.clients.retain(|_, w| now.duration_since(w.started) < window);
        debug!(
          "Rate limiter swept {} expired clients",
          before.saturating_sub(self.clients.len())
        );
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize
    {   self.clients.len()
    }
}
