//! Connectivity monitor: background worker and status state machine

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::dns::{dns_recovered, DnsVerdict, HostResolver};
use crate::endpoints::EndpointStore;
use crate::network::ReachabilityProbe;
use crate::status::{InternetStatus, IpFamily, TransportError};

/// Default short interval used during initial verification and retries
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 5_000;

/// Default interval between steady-state re-checks
pub const DEFAULT_STEADY_INTERVAL_MS: u64 = 30_000;

/// Down-retries before a fully-connected record is given up
pub const DEFAULT_DOWN_RETRY_LIMIT: u32 = 3;

/// Consecutive agreeing initial-verification results before steady state
pub const DEFAULT_STABLE_ITERATIONS: u32 = 3;

/// Timer and retry knobs, injectable so tests can run at millisecond scale
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub min_interval: Duration,
    pub steady_interval: Duration,
    pub down_retry_limit: u32,
    pub stable_iterations: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
            steady_interval: Duration::from_millis(DEFAULT_STEADY_INTERVAL_MS),
            down_retry_limit: DEFAULT_DOWN_RETRY_LIMIT,
            stable_iterations: DEFAULT_STABLE_ITERATIONS,
        }
    }
}

/// Receiver for status transitions. Runs inline on the worker, so it must
/// not block for long.
pub trait StatusSink: Send + Sync {
    fn on_internet_status_changed(&self, previous: InternetStatus, current: InternetStatus);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MonitorMode {
    InitialVerification,
    SteadyState,
}

/// Per-family status slot, written only by the worker, read from anywhere
struct FamilyRecord {
    status: AtomicU8,
    last_error: AtomicU8,
}

impl FamilyRecord {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(InternetStatus::Unknown as u8),
            last_error: AtomicU8::new(TransportError::None as u8),
        }
    }

    fn status(&self) -> InternetStatus {
        InternetStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn store(&self, status: InternetStatus, error: TransportError) {
        self.status.store(status as u8, Ordering::SeqCst);
        self.last_error.store(error as u8, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.store(InternetStatus::Unknown, TransportError::None);
    }
}

struct Shared {
    cfg: MonitorConfig,
    endpoints: Arc<EndpointStore>,
    probe: Arc<dyn ReachabilityProbe>,
    resolver: Arc<dyn HostResolver>,
    sink: Arc<dyn StatusSink>,
    running: AtomicBool,
    link_up: AtomicBool,
    force_initial: AtomicBool,
    wake: Notify,
    v4: FamilyRecord,
    v6: FamilyRecord,
    aggregate: AtomicU8,
    aggregate_family: AtomicU8,
    portal_url: Mutex<String>,
}

impl Shared {
    fn record(&self, family: IpFamily) -> &FamilyRecord {
        match family {
            IpFamily::V6 => &self.v6,
            _ => &self.v4,
        }
    }

    fn aggregate_status(&self) -> InternetStatus {
        InternetStatus::from_u8(self.aggregate.load(Ordering::SeqCst))
    }

    fn set_aggregate(&self, status: InternetStatus, family: IpFamily) {
        self.aggregate.store(status as u8, Ordering::SeqCst);
        self.aggregate_family.store(family as u8, Ordering::SeqCst);
    }

    fn reset_records(&self) {
        self.v4.reset();
        self.v6.reset();
        self.aggregate
            .store(InternetStatus::Unknown as u8, Ordering::SeqCst);
        self.aggregate_family
            .store(IpFamily::V4 as u8, Ordering::SeqCst);
        self.portal_url.lock().unwrap().clear();
    }
}

/// Internet-reachability monitor. Owns one background worker per instance;
/// collaborators (probe, resolver, notification sink) are injected at
/// construction.
pub struct ConnectivityMonitor {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    pub fn new(
        cfg: MonitorConfig,
        endpoints: Arc<EndpointStore>,
        probe: Arc<dyn ReachabilityProbe>,
        resolver: Arc<dyn HostResolver>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                cfg,
                endpoints,
                probe,
                resolver,
                sink,
                running: AtomicBool::new(false),
                link_up: AtomicBool::new(false),
                force_initial: AtomicBool::new(false),
                wake: Notify::new(),
                v4: FamilyRecord::new(),
                v6: FamilyRecord::new(),
                aggregate: AtomicU8::new(InternetStatus::Unknown as u8),
                aggregate_family: AtomicU8::new(IpFamily::V4 as u8),
                portal_url: Mutex::new(String::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker. Idempotent: a second call only nudges the worker.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> anyhow::Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            self.shared.wake.notify_one();
            return Ok(());
        }
        self.shared.reset_records();
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(run_worker(shared));
        *self.worker.lock().unwrap() = Some(handle);
        tracing::info!("Connectivity monitor started");
        Ok(())
    }

    /// Signal the worker, wait for it to exit, reset all records to
    /// unknown. Idempotent; the worker is fully gone when this returns.
    pub async fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wake.notify_one();
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
            tracing::info!("Connectivity monitor stopped");
        }
        self.shared.reset_records();
    }

    /// Reduced link-state input from the interface manager: the monitor
    /// only cares whether any managed interface is up
    pub fn notify_link_state_changed(&self, eth_up: bool, wlan_up: bool) {
        let up = eth_up || wlan_up;
        let was = self.shared.link_up.swap(up, Ordering::SeqCst);
        if was != up {
            tracing::info!("Link state changed: any interface up = {}", up);
        }
        self.shared.wake.notify_one();
    }

    /// Force the next iteration back into initial verification and a
    /// notification on the next settled status, even if it is unchanged
    pub fn switch_to_initial_check(&self) {
        self.shared.force_initial.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    /// Current status for one family; `Unspecified` reads the aggregate
    pub fn internet_state(&self, family: IpFamily) -> InternetStatus {
        match family {
            IpFamily::Unspecified => self.shared.aggregate_status(),
            family => self.shared.record(family).status(),
        }
    }

    /// Family the aggregate verdict currently reflects
    pub fn active_family(&self) -> IpFamily {
        IpFamily::from_u8(self.shared.aggregate_family.load(Ordering::SeqCst))
    }

    /// Captured portal redirect URL, empty unless some family currently
    /// reads captive-portal
    pub fn captive_portal_uri(&self) -> String {
        let portal = self.shared.v4.status() == InternetStatus::CaptivePortal
            || self.shared.v6.status() == InternetStatus::CaptivePortal;
        if portal {
            self.shared.portal_url.lock().unwrap().clone()
        } else {
            String::new()
        }
    }

    pub fn set_test_endpoints(&self, urls: &[String]) -> bool {
        self.shared.endpoints.set(urls)
    }

    pub fn get_test_endpoints(&self) -> Vec<String> {
        self.shared.endpoints.get()
    }
}

/// Worker loop. All record writes happen here; everything else only reads.
async fn run_worker(shared: Arc<Shared>) {
    let mut mode = MonitorMode::InitialVerification;
    let mut last_candidate: Option<InternetStatus> = None;
    let mut agree_count: u32 = 0;
    let mut down_retries: u32 = 0;
    let mut link_down_notified = false;
    let mut last_published = InternetStatus::Unknown;
    let mut pending_notify = false;
    let mut first_reading = true;

    while shared.running.load(Ordering::SeqCst) {
        let mut sleep_for = shared.cfg.min_interval;

        if shared.force_initial.swap(false, Ordering::SeqCst) {
            tracing::debug!("Forced back to initial verification");
            mode = MonitorMode::InitialVerification;
            last_candidate = None;
            agree_count = 0;
            down_retries = 0;
            pending_notify = true;
        }

        if !shared.link_up.load(Ordering::SeqCst) {
            // No interface: not-available without touching the network
            shared.v4.store(InternetStatus::NotAvailable, TransportError::None);
            shared.v6.store(InternetStatus::NotAvailable, TransportError::None);
            shared.set_aggregate(InternetStatus::NotAvailable, IpFamily::V4);
            mode = MonitorMode::InitialVerification;
            last_candidate = None;
            agree_count = 0;
            down_retries = 0;
            if !link_down_notified {
                pending_notify = true;
                link_down_notified = true;
            }
        } else {
            link_down_notified = false;
            let endpoints = shared.endpoints.get();

            match mode {
                MonitorMode::InitialVerification => {
                    let (r4, r6) = tokio::join!(
                        shared.probe.probe(&endpoints, IpFamily::V4),
                        shared.probe.probe(&endpoints, IpFamily::V6)
                    );
                    shared.v4.store(r4.status, r4.last_error);
                    shared.v6.store(r6.status, r6.last_error);

                    // Better family wins; IPv4 on a not-available tie
                    let (winner, family) = if r6.status.priority() > r4.status.priority() {
                        (&r6, IpFamily::V6)
                    } else {
                        (&r4, IpFamily::V4)
                    };
                    let status = winner.status;
                    if shared.aggregate_status() != status {
                        pending_notify = true;
                    }
                    shared.set_aggregate(status, family);
                    if status == InternetStatus::CaptivePortal {
                        if let Some(url) = &winner.portal_url {
                            *shared.portal_url.lock().unwrap() = url.clone();
                        }
                    }

                    if last_candidate == Some(status) {
                        agree_count += 1;
                    } else {
                        last_candidate = Some(status);
                        agree_count = 1;
                    }
                    if agree_count >= shared.cfg.stable_iterations {
                        tracing::info!(
                            "Status {} stable for {} check(s), entering steady state",
                            status,
                            agree_count
                        );
                        mode = MonitorMode::SteadyState;
                        agree_count = 0;
                        down_retries = 0;
                    }
                }
                MonitorMode::SteadyState => {
                    let family =
                        IpFamily::from_u8(shared.aggregate_family.load(Ordering::SeqCst));
                    let verdict = shared.probe.probe(&endpoints, family).await;
                    let current = shared.aggregate_status();

                    if verdict.status == current {
                        shared.record(family).store(verdict.status, verdict.last_error);
                        if verdict.status == InternetStatus::CaptivePortal {
                            if let Some(url) = &verdict.portal_url {
                                *shared.portal_url.lock().unwrap() = url.clone();
                            }
                        }
                        down_retries = 0;
                        sleep_for = shared.cfg.steady_interval;
                    } else if current == InternetStatus::FullyConnected
                        && verdict.status == InternetStatus::NotAvailable
                    {
                        // Connectivity apparently lost: ask DNS before
                        // believing a single bad sample
                        let first = endpoints.first().map(String::as_str).unwrap_or("");
                        let dns =
                            dns_recovered(&*shared.resolver, first, family, verdict.last_error)
                                .await;
                        if dns == DnsVerdict::Resolved {
                            tracing::debug!("Probe failed but DNS recovered, treating as transient");
                            down_retries = 0;
                            sleep_for = shared.cfg.steady_interval;
                        } else {
                            down_retries += 1;
                            if down_retries < shared.cfg.down_retry_limit {
                                tracing::debug!(
                                    "Connectivity loss unconfirmed, retry {}/{}",
                                    down_retries,
                                    shared.cfg.down_retry_limit
                                );
                                // Keep the published record, retry soon
                            } else {
                                tracing::warn!(
                                    "Connectivity lost after {} retries",
                                    down_retries
                                );
                                shared
                                    .v4
                                    .store(InternetStatus::NotAvailable, verdict.last_error);
                                shared
                                    .v6
                                    .store(InternetStatus::NotAvailable, verdict.last_error);
                                shared.set_aggregate(InternetStatus::NotAvailable, family);
                                pending_notify = true;
                                down_retries = 0;
                                mode = MonitorMode::InitialVerification;
                                last_candidate = None;
                                agree_count = 0;
                            }
                        }
                    } else {
                        // Any other change: commit and re-derive from scratch
                        tracing::info!(
                            "Status changed in steady state: {} -> {}",
                            current,
                            verdict.status
                        );
                        shared.record(family).store(verdict.status, verdict.last_error);
                        shared.set_aggregate(verdict.status, family);
                        if verdict.status == InternetStatus::CaptivePortal {
                            if let Some(url) = &verdict.portal_url {
                                *shared.portal_url.lock().unwrap() = url.clone();
                            }
                        }
                        pending_notify = true;
                        down_retries = 0;
                        mode = MonitorMode::InitialVerification;
                        last_candidate = None;
                        agree_count = 0;
                    }
                }
            }
        }

        let current = shared.aggregate_status();
        if pending_notify || first_reading || current != last_published {
            tracing::info!("Internet status: {} -> {}", last_published, current);
            shared.sink.on_internet_status_changed(last_published, current);
            last_published = current;
            pending_notify = false;
            first_reading = false;
        }

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = shared.wake.notified() => {}
        }
    }
}
