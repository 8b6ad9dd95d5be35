use calltrail_core::PassId;
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};

/// Progress notifications emitted at the coordinator's suspension points:
/// file boundaries and stage boundaries. The coordinator never suspends
/// mid-file, so consumers see whole-file granularity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnalysisEvent {
    AnalysisStarted {
        file_count: usize,
    },
    FileWalked {
        current: usize,
        total: usize,
    },
    PassStarted {
        pass: PassId,
    },
    PassFinished {
        pass: PassId,
        edges_added: usize,
    },
    AnalysisFinished {
        duration_ms: u64,
    },
    AnalysisCancelled,
}

/// Create a progress channel. The coordinator takes the sending half and
/// reports as it crosses suspension points; the host holds the receiving
/// half and drains it whenever convenient (a UI tick, a log flush).
pub fn progress_channel() -> (ProgressTx, ProgressRx) {
    let (tx, rx) = unbounded();
    (ProgressTx { tx }, ProgressRx { rx })
}

/// Sending half, held by the analysis side.
#[derive(Clone)]
pub struct ProgressTx {
    tx: Sender<AnalysisEvent>,
}

impl ProgressTx {
    /// Reporting never blocks the analysis. Once the host drops its
    /// [`ProgressRx`], further reports are discarded.
    pub fn report(&self, event: AnalysisEvent) {
        let _ = self.tx.send(event);
    }
}

/// Receiving half, held by the host.
pub struct ProgressRx {
    rx: Receiver<AnalysisEvent>,
}

impl ProgressRx {
    /// Everything reported since the last drain, in report order.
    pub fn drain(&self) -> Vec<AnalysisEvent> {
        self.rx.try_iter().collect()
    }

    /// The oldest undelivered event, if any.
    pub fn next_event(&self) -> Option<AnalysisEvent> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_returns_reports_in_order() {
        let (tx, rx) = progress_channel();

        tx.report(AnalysisEvent::AnalysisStarted { file_count: 3 });
        tx.report(AnalysisEvent::FileWalked {
            current: 1,
            total: 3,
        });

        assert_eq!(
            rx.drain(),
            vec![
                AnalysisEvent::AnalysisStarted { file_count: 3 },
                AnalysisEvent::FileWalked {
                    current: 1,
                    total: 3
                },
            ]
        );
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_next_event_pops_one_at_a_time() {
        let (tx, rx) = progress_channel();
        tx.report(AnalysisEvent::PassStarted { pass: PassId::Cha });
        tx.report(AnalysisEvent::PassFinished {
            pass: PassId::Cha,
            edges_added: 2,
        });

        assert_eq!(
            rx.next_event(),
            Some(AnalysisEvent::PassStarted { pass: PassId::Cha })
        );
        assert_eq!(
            rx.drain(),
            vec![AnalysisEvent::PassFinished {
                pass: PassId::Cha,
                edges_added: 2
            }]
        );
        assert_eq!(rx.next_event(), None);
    }

    #[test]
    fn test_report_after_host_hangs_up_is_discarded() {
        let (tx, rx) = progress_channel();
        drop(rx);
        // Must not panic or block the analysis side.
        tx.report(AnalysisEvent::AnalysisCancelled);
    }

    #[test]
    fn test_events_serialize_for_the_wire() {
        let event = AnalysisEvent::PassFinished {
            pass: PassId::Rta,
            edges_added: 7,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AnalysisEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
