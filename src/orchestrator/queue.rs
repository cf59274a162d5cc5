//! Single-flight scan queue.
//!
//! Only one scan pipeline runs at a time. Requests that arrive while a
//! scan is in flight are parked FIFO; the finishing scan hands control to
//! exactly one parked request, whether it finished cleanly or not.

use std::collections::VecDeque;

use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use crate::error::Result;
use crate::orchestrator::ScanJobResult;

/// A parked scan request: the pre-created job and the channel waiting
/// for its outcome.
#[derive(Debug)]
pub(crate) struct QueuedScan {
    pub job_id: Uuid,
    pub completion: oneshot::Sender<Result<ScanJobResult>>,
}

#[derive(Debug, Default)]
struct QueueState {
    processing: bool,
    pending: VecDeque<QueuedScan>,
}

#[derive(Debug, Default)]
pub(crate) struct ScanQueue {
    state: Mutex<QueueState>,
}

pub(crate) enum Admission {
    /// The caller owns the pipeline and must run this scan now.
    Run,
    /// Another scan is in flight; the request was parked.
    Parked,
}

impl ScanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a request: either the caller gets the pipeline, or the
    /// request joins the queue.
    pub async fn admit(&self, scan: QueuedScan) -> (Admission, Option<QueuedScan>) {
        let mut state = self.state.lock().await;
        if state.processing {
            state.pending.push_back(scan);
            (Admission::Parked, None)
        } else {
            state.processing = true;
            (Admission::Run, Some(scan))
        }
    }

    /// Called when a scan finishes. Returns the next parked request, if
    /// any; otherwise releases the pipeline.
    pub async fn next(&self) -> Option<QueuedScan> {
        let mut state = self.state.lock().await;
        match state.pending.pop_front() {
            Some(next) => Some(next),
            None => {
                state.processing = false;
                None
            }
        }
    }

    pub async fn depth(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(job_id: Uuid) -> (QueuedScan, oneshot::Receiver<Result<ScanJobResult>>) {
        let (tx, rx) = oneshot::channel();
        (
            QueuedScan {
                job_id,
                completion: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn first_request_runs_later_requests_park() {
        let queue = ScanQueue::new();
        let (first, _rx1) = queued(Uuid::new_v4());
        let (second, _rx2) = queued(Uuid::new_v4());

        assert!(matches!(queue.admit(first).await.0, Admission::Run));
        assert!(matches!(queue.admit(second).await.0, Admission::Parked));
        assert_eq!(queue.depth().await, 1);
    }

    #[tokio::test]
    async fn finishing_hands_off_in_fifo_order() {
        let queue = ScanQueue::new();
        let first_id = Uuid::new_v4();
        let second_id = Uuid::new_v4();
        let third_id = Uuid::new_v4();
        let (first, _rx1) = queued(first_id);
        let (second, _rx2) = queued(second_id);
        let (third, _rx3) = queued(third_id);

        queue.admit(first).await;
        queue.admit(second).await;
        queue.admit(third).await;

        assert_eq!(queue.next().await.unwrap().job_id, second_id);
        assert_eq!(queue.next().await.unwrap().job_id, third_id);
        assert!(queue.next().await.is_none());

        // pipeline released: a fresh request runs immediately
        let (fresh, _rx) = queued(Uuid::new_v4());
        assert!(matches!(queue.admit(fresh).await.0, Admission::Run));
    }
}
