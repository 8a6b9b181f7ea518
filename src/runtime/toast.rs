use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::debug;

use super::bus::ToastCommand;

/// Upper bound on how long one toast stays up.
const MAX_TOAST_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient message request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub message: String,
    pub severity: Severity,
    pub duration: Duration,
}

impl Toast {
    pub fn new(message: impl Into<String>, severity: Severity, duration: Duration) -> Self {
        Self {
            message: message.into(),
            severity,
            duration,
        }
    }
}

/// The toast currently on screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveToast {
    pub toast: Toast,
    pub arrived_at: Instant,
    pub seq: u64,
}

struct Pending {
    toast: Toast,
    arrived_at: Instant,
    seq: u64,
}

/// Serializes toast requests into one visible toast at a time.
///
/// The scheduler task owns the queue and the current toast. What is on screen is
/// published through a watch channel so the render loop can repaint as soon as it
/// changes.
pub struct ToastScheduler {
    commands: mpsc::Receiver<ToastCommand>,
    display: watch::Sender<Option<ActiveToast>>,
    queue: VecDeque<Pending>,
    current: Option<(ActiveToast, Instant)>,
    next_seq: u64,
}

impl ToastScheduler {
    pub fn new(commands: mpsc::Receiver<ToastCommand>) -> (Self, watch::Receiver<Option<ActiveToast>>) {
        let (display, display_rx) = watch::channel(None);
        (
            Self {
                commands,
                display,
                queue: VecDeque::new(),
                current: None,
                next_seq: 0,
            },
            display_rx,
        )
    }

    /// Drain the toast bus until every sender is gone.
    pub async fn run(mut self) {
        loop {
            if self.current.is_none() {
                self.show_next();
            }

            let deadline = self.current.as_ref().map(|(_, deadline)| *deadline);

            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(ToastCommand::Show(toast)) => self.enqueue(toast),
                    Some(ToastCommand::Clear) => self.clear(),
                    None => break,
                },
                _ = sleep_until_opt(deadline), if deadline.is_some() => {
                    let expired = self.current.as_ref().map(|(t, _)| (t.seq, t.arrived_at));
                    if let Some(expired) = expired {
                        self.expire(expired);
                    }
                }
            }
        }

        self.queue.clear();
        self.current = None;
        self.display.send_replace(None);
        debug!("toast bus closed");
    }

    fn enqueue(&mut self, toast: Toast) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_back(Pending {
            toast,
            arrived_at: Instant::now(),
            seq,
        });
    }

    fn show_next(&mut self) {
        let Some(next) = self.queue.pop_front() else {
            return;
        };
        let deadline = Instant::now() + next.toast.duration.min(MAX_TOAST_LIFETIME);
        let active = ActiveToast {
            toast: next.toast,
            arrived_at: next.arrived_at,
            seq: next.seq,
        };
        self.current = Some((active.clone(), deadline));
        self.display.send_replace(Some(active));
    }

    fn expire(&mut self, expired: (u64, Instant)) {
        // Only the toast that started this timer may be dismissed by it.
        let still_current = self
            .current
            .as_ref()
            .is_some_and(|(t, _)| (t.seq, t.arrived_at) == expired);
        if still_current {
            self.current = None;
            self.display.send_replace(None);
        }
    }

    fn clear(&mut self) {
        self.queue.clear();
        if self.current.take().is_some() {
            self.display.send_replace(None);
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
