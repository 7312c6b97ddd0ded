use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use lazy_static::lazy_static;
use tokio::sync::Mutex;
use uuid::Uuid;

lazy_static! {
    // Key: (user, action), Value: unix seconds of the last successful call
    static ref ACTION_COOLDOWNS: Mutex<HashMap<(Uuid, &'static str), u64>> =
        Mutex::new(HashMap::new());
}

/// Request budget over a sliding time window
pub struct SlidingWindow {
    /// Request timestamps inside the current window
    request_times: VecDeque<Instant>,
    max_requests: usize,
    window: Duration,
}

impl SlidingWindow {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            request_times: VecDeque::new(),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Record a request at `now`, or return how long to wait before one is allowed.
    pub fn check_and_record(&mut self, now: Instant) -> Duration {
        while let Some(&front) = self.request_times.front() {
            if now.duration_since(front) >= self.window {
                self.request_times.pop_front();
            } else {
                break;
            }
        }

        if self.request_times.len() >= self.max_requests {
            if let Some(&oldest) = self.request_times.front() {
                return self.window - now.duration_since(oldest);
            }
        }

        self.request_times.push_back(now);
        Duration::ZERO
    }
}

/// Budget shared by every inbound API request
pub struct InboundLimiter {
    window: Mutex<SlidingWindow>,
}

impl InboundLimiter {
    pub fn per_second(max_requests: usize) -> Self {
        Self {
            window: Mutex::new(SlidingWindow::new(max_requests, Duration::from_secs(1))),
        }
    }

    /// Admit one request, or return how long until the window has room.
    pub async fn admit(&self) -> Result<(), Duration> {
        let wait = self.window.lock().await.check_and_record(Instant::now());
        if wait.is_zero() {
            Ok(())
        } else {
            Err(wait)
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Whether a user may perform a mutating action again.
/// Err(remaining_seconds) while the last successful call is still cooling
/// down. A zero cooldown disables the check.
pub async fn check_cooldown(user_id: Uuid, action: &'static str, cooldown_secs: u64) -> Result<(), u64> {
    if cooldown_secs == 0 {
        return Ok(());
    }

    let now = unix_now();
    let cooldowns = ACTION_COOLDOWNS.lock().await;
    if let Some(&last_time) = cooldowns.get(&(user_id, action)) {
        let elapsed = now.saturating_sub(last_time);
        if elapsed < cooldown_secs {
            return Err(cooldown_secs - elapsed);
        }
    }
    Ok(())
}

/// Start the cooldown after an action went through.
pub async fn record_action(user_id: Uuid, action: &'static str, cooldown_secs: u64) {
    if cooldown_secs == 0 {
        return;
    }

    let now = unix_now();
    let mut cooldowns = ACTION_COOLDOWNS.lock().await;
    cooldowns.insert((user_id, action), now);

    // Keep the table from growing without bound
    if cooldowns.len() > 10_000 {
        cooldowns.retain(|_, &mut last| now.saturating_sub(last) < cooldown_secs);
    }
}
