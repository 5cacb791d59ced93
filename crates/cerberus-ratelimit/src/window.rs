use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Sliding-window limiter: at most `max_requests` admissions in any
/// `window` span.
pub struct SlidingWindow {
    max_requests: usize,
    window: Duration,
    admissions: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window: Duration::from_secs(window_seconds.max(1)),
            admissions: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to take a permit. On refusal returns how long until the oldest
    /// admission leaves the window.
    fn try_acquire(&self) -> Result<(), Duration> {
        let mut admissions = self.admissions.lock().unwrap();
        let now = Instant::now();

        while let Some(front) = admissions.front() {
            if now.duration_since(*front) >= self.window {
                admissions.pop_front();
            } else {
                break;
            }
        }

        if admissions.len() < self.max_requests {
            admissions.push_back(now);
            return Ok(());
        }

        let oldest = *admissions.front().expect("non-empty at capacity");
        let elapsed = now.duration_since(oldest);
        let wait = self.window.saturating_sub(elapsed);
        Err(wait.max(Duration::from_millis(10)))
    }

    /// Block until admitted.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        let mut admissions = self.admissions.lock().unwrap();
        let now = Instant::now();
        while let Some(front) = admissions.front() {
            if now.duration_since(*front) >= self.window {
                admissions.pop_front();
            } else {
                break;
            }
        }
        admissions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn permits_free_up_as_the_window_slides() {
        let window = SlidingWindow::new(3, 5);
        for _ in 0..3 {
            window.acquire().await;
        }
        assert_eq!(window.in_flight(), 3);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(window.in_flight(), 0);
        window.acquire().await;
        assert_eq!(window.in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refusal_reports_remaining_window() {
        let window = SlidingWindow::new(1, 10);
        window.acquire().await;
        tokio::time::advance(Duration::from_secs(4)).await;

        match window.try_acquire() {
            Err(wait) => assert_eq!(wait, Duration::from_secs(6)),
            Ok(()) => panic!("window should be saturated"),
        }
    }
}
