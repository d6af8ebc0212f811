//! Discovery scheduling: periodic probe/listen cycles with liveness pruning.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, trace, warn};

use crate::message::{SsdpKind, SsdpMessage};
use crate::socket::SsdpSocket;

/// Reliability level for the discovery process.
///
/// Two factors: the timeout of one probe/listen cycle, and the number of
/// consecutive missed cycles after which a device is considered lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reliability {
    /// How long each cycle listens for responses.
    pub timeout: Duration,
    /// Missed cycles before a device is pruned.
    pub retry: u32,
}

impl Reliability {
    /// Short cycles, a device is lost after 2 consecutive misses.
    pub const HIGH: Reliability = Reliability {
        timeout: Duration::from_secs(20),
        retry: 2,
    };
    /// Balanced cadence, lost after 3 consecutive misses.
    pub const MEDIUM: Reliability = Reliability {
        timeout: Duration::from_secs(30),
        retry: 3,
    };
    /// Long cycles, lost after 5 consecutive misses.
    pub const LOW: Reliability = Reliability {
        timeout: Duration::from_secs(60),
        retry: 5,
    };
}

impl Default for Reliability {
    fn default() -> Self {
        Reliability::MEDIUM
    }
}

/// Liveness signal produced by the scanner for the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanSignal {
    /// A matching probe response arrived carrying this location.
    Found(String),
    /// The location missed `retry` consecutive cycles.
    Lost(String),
}

/// Per-location last-seen bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct LivenessTracker {
    last_seen: HashMap<String, u64>,
    scan_count: u64,
}

impl LivenessTracker {
    pub(crate) fn begin_cycle(&mut self) {
        self.scan_count += 1;
    }

    /// Undo the count of a cycle that was aborted mid-read.
    pub(crate) fn rollback_cycle(&mut self) {
        self.scan_count = self.scan_count.saturating_sub(1);
    }

    pub(crate) fn record(&mut self, location: &str) {
        self.last_seen.insert(location.to_owned(), self.scan_count);
    }

    /// Remove and return every location missing for at least `threshold`
    /// consecutive cycles.
    pub(crate) fn prune(&mut self, threshold: u64) -> Vec<String> {
        let scan = self.scan_count;
        let expired: Vec<String> = self
            .last_seen
            .iter()
            .filter(|(_, &seen)| scan.saturating_sub(seen) >= threshold)
            .map(|(location, _)| location.clone())
            .collect();
        for location in &expired {
            debug!(location = %location, scan, "device missed too many scans, pruning");
            self.last_seen.remove(location);
        }
        expired
    }
}

/// Drives repeated probe/listen cycles on a background task.
///
/// State machine: idle → scanning → idle. Each cycle prunes stale
/// locations, sends one M-SEARCH per configured target, then reads
/// responses until the reliability timeout.
pub struct DiscoveryScanner {
    targets: HashSet<String>,
    reliability: Arc<Mutex<Reliability>>,
    running: Arc<AtomicBool>,
    // Wakes the read loop early on stop or reliability change.
    interrupt: Arc<Notify>,
    signals: mpsc::UnboundedSender<ScanSignal>,
}

impl DiscoveryScanner {
    pub fn new(
        targets: impl IntoIterator<Item = impl Into<String>>,
        signals: mpsc::UnboundedSender<ScanSignal>,
    ) -> Self {
        DiscoveryScanner {
            targets: targets.into_iter().map(Into::into).collect(),
            reliability: Arc::new(Mutex::new(Reliability::default())),
            running: Arc::new(AtomicBool::new(false)),
            interrupt: Arc::new(Notify::new()),
            signals,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the background probe loop.
    ///
    /// Starting an already-running scanner is a no-op.
    pub fn start(&self, reliability: Reliability) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("discovery already running");
            return;
        }
        info!("starting discovery");
        *lock(&self.reliability) = reliability;

        let targets = self.targets.clone();
        let shared_reliability = Arc::clone(&self.reliability);
        let running = Arc::clone(&self.running);
        let interrupt = Arc::clone(&self.interrupt);
        let signals = self.signals.clone();

        tokio::spawn(async move {
            let mut tracker = LivenessTracker::default();

            // A reliability change abandons the current transport and
            // reopens one, keeping the liveness state.
            'transport: while running.load(Ordering::SeqCst) {
                let socket = match SsdpSocket::bind().await {
                    Ok(socket) => socket,
                    Err(e) => {
                        warn!("could not create socket: {e}");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                };

                while running.load(Ordering::SeqCst) {
                    let reliability = *lock(&shared_reliability);

                    for location in tracker.prune(u64::from(reliability.retry)) {
                        let _ = signals.send(ScanSignal::Lost(location));
                    }

                    let search_timeout = reliability.timeout;
                    let mut socket_error = false;
                    for target in &targets {
                        let message = SsdpMessage::search(target, search_timeout.as_secs());
                        if let Err(e) = socket.send(&message).await {
                            warn!("could not send search request: {e}");
                            socket_error = true;
                            break;
                        }
                    }
                    if socket_error {
                        // Network unreachable: every tracked location is gone.
                        for location in tracker.prune(0) {
                            let _ = signals.send(ScanSignal::Lost(location));
                        }
                        running.store(false, Ordering::SeqCst);
                        break 'transport;
                    }

                    tracker.begin_cycle();
                    tokio::select! {
                        read = socket.read(search_timeout) => match read {
                            Ok(messages) => {
                                let mut found = 0;
                                for message in messages {
                                    if let Some(location) =
                                        validate_response(&message, &targets)
                                    {
                                        debug!(
                                            uuid = message.uuid().unwrap_or("?"),
                                            location, "device responded"
                                        );
                                        tracker.record(location);
                                        found += 1;
                                        let _ = signals
                                            .send(ScanSignal::Found(location.to_owned()));
                                    }
                                }
                                if found == 0 {
                                    debug!("no device found");
                                }
                            }
                            Err(e) => {
                                warn!("could not execute request: {e}");
                                for location in tracker.prune(0) {
                                    let _ = signals.send(ScanSignal::Lost(location));
                                }
                                running.store(false, Ordering::SeqCst);
                                break 'transport;
                            }
                        },
                        _ = interrupt.notified() => {
                            // Aborted mid-cycle: this cycle never completed,
                            // don't count it.
                            tracker.rollback_cycle();
                            continue 'transport;
                        }
                    }
                }
            }
            debug!("discovery loop exited");
        });
    }

    /// Stop the background loop.
    ///
    /// Stopping an already-stopped scanner is a no-op.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("discovery already stopped");
            return;
        }
        info!("stopping discovery");
        self.interrupt.notify_one();
    }

    /// Change the reliability parameters.
    ///
    /// When scanning, the in-flight cycle is abandoned and the loop resumes
    /// immediately with the new timeout/retry values; liveness state is
    /// preserved.
    pub fn set_reliability(&self, reliability: Reliability) {
        *lock(&self.reliability) = reliability;
        if self.is_running() {
            info!("changing discovery reliability");
            self.interrupt.notify_one();
        }
    }
}

/// A response is of interest when its search target is one of ours and it
/// carries a non-empty location. Anything else is skipped, not an error.
fn validate_response<'m>(
    message: &'m SsdpMessage,
    targets: &HashSet<String>,
) -> Option<&'m str> {
    match message.kind() {
        SsdpKind::Response => {}
        SsdpKind::Notify => {
            trace!("got a NOTIFY");
            return None;
        }
        SsdpKind::Search => return None,
    }
    match message.search_target() {
        Some(target) if targets.contains(target) => message.location(),
        other => {
            debug!("skipping response from: {:?}", other);
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &str = "urn:cast-ocast-org:service:cast:1";
    const LOCATION: &str = "http://192.168.1.48:56790/dd.xml";

    fn response(target: &str, location: &str) -> SsdpMessage {
        SsdpMessage::parse(&format!(
            "HTTP/1.1 200 OK\r\nLOCATION: {location}\r\nST: {target}\r\n\r\n"
        ))
        .unwrap()
    }

    mod liveness {
        use super::*;

        #[test]
        fn device_present_after_retry_minus_one_misses() {
            let mut tracker = LivenessTracker::default();
            tracker.begin_cycle();
            tracker.record(LOCATION);

            // One full cycle with no response.
            assert!(tracker.prune(2).is_empty());
            tracker.begin_cycle();

            // Next cycle starts: one miss so far, still below the threshold.
            assert!(tracker.prune(2).is_empty());
        }

        #[test]
        fn device_pruned_exactly_once_after_retry_misses() {
            let mut tracker = LivenessTracker::default();
            tracker.begin_cycle();
            tracker.record(LOCATION);

            tracker.begin_cycle();
            assert!(tracker.prune(2).is_empty());
            tracker.begin_cycle();

            let lost = tracker.prune(2);
            assert_eq!(lost, vec![LOCATION.to_string()]);

            // Already pruned: never reported twice.
            tracker.begin_cycle();
            assert!(tracker.prune(2).is_empty());
        }

        #[test]
        fn response_resets_the_miss_count() {
            let mut tracker = LivenessTracker::default();
            tracker.begin_cycle();
            tracker.record(LOCATION);

            tracker.begin_cycle();
            tracker.record(LOCATION);
            tracker.begin_cycle();
            assert!(tracker.prune(2).is_empty());
        }

        #[test]
        fn rollback_undoes_an_aborted_cycle() {
            let mut tracker = LivenessTracker::default();
            tracker.begin_cycle();
            tracker.record(LOCATION);

            tracker.begin_cycle();
            tracker.rollback_cycle();
            tracker.begin_cycle();

            // Only one completed miss, nothing pruned yet.
            assert!(tracker.prune(2).is_empty());
        }

        #[test]
        fn zero_threshold_prunes_everything() {
            let mut tracker = LivenessTracker::default();
            tracker.begin_cycle();
            tracker.record("http://a/dd.xml");
            tracker.record("http://b/dd.xml");

            let mut lost = tracker.prune(0);
            lost.sort();
            assert_eq!(lost, vec!["http://a/dd.xml", "http://b/dd.xml"]);
        }
    }

    mod validation {
        use super::*;

        fn targets() -> HashSet<String> {
            [TARGET.to_string()].into_iter().collect()
        }

        #[test]
        fn matching_response_yields_location() {
            let message = response(TARGET, LOCATION);
            assert_eq!(validate_response(&message, &targets()), Some(LOCATION));
        }

        #[test]
        fn foreign_search_target_is_skipped() {
            let message = response("urn:schemas-upnp-org:device:Basic:1", LOCATION);
            assert_eq!(validate_response(&message, &targets()), None);
        }

        #[test]
        fn notify_is_skipped() {
            let message =
                SsdpMessage::parse("NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\n\r\n").unwrap();
            assert_eq!(validate_response(&message, &targets()), None);
        }
    }

    mod lifecycle {
        use super::*;

        #[tokio::test]
        async fn start_and_stop_are_idempotent() {
            let (tx, _rx) = mpsc::unbounded_channel();
            let scanner = DiscoveryScanner::new([TARGET], tx);

            assert!(!scanner.is_running());
            scanner.stop(); // no-op on a stopped scanner

            scanner.start(Reliability::HIGH);
            assert!(scanner.is_running());
            scanner.start(Reliability::HIGH); // no-op on a running scanner
            assert!(scanner.is_running());

            scanner.stop();
            assert!(!scanner.is_running());
        }

        #[tokio::test]
        async fn set_reliability_preserves_running_state() {
            let (tx, _rx) = mpsc::unbounded_channel();
            let scanner = DiscoveryScanner::new([TARGET], tx);

            scanner.set_reliability(Reliability::LOW); // idle: just stored
            assert!(!scanner.is_running());

            scanner.start(Reliability::HIGH);
            scanner.set_reliability(Reliability::MEDIUM);
            assert!(scanner.is_running());
            scanner.stop();
        }
    }
}
