//! The broadcast run loop and its control surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use herald_core::template::expand;
use herald_core::types::DestinationId;
use herald_transport::{Transport, TransportError, TransportFacade};

use crate::error::BroadcastError;
use crate::registry::DestinationRegistry;
use crate::sink::EventSink;

/// Minimum per-destination spacing when the safe floor is on.
pub const SAFE_FLOOR: Duration = Duration::from_secs(60);

/// Parameters of one broadcast run. Fixed at start; the run never observes
/// later changes to the registry's membership beyond throttle state.
#[derive(Debug, Clone)]
pub struct JobParams {
    pub target_ids: Vec<DestinationId>,
    pub template: String,
    /// Expand the spintax template independently per send.
    pub variation: bool,
    pub base_interval: Duration,
    /// Clamp the per-destination spacing to at least [`SAFE_FLOOR`].
    pub safe_floor: bool,
    pub duration: Duration,
}

impl JobParams {
    /// The spacing actually enforced between two sends to one destination.
    pub fn effective_interval(&self) -> Duration {
        if self.safe_floor {
            self.base_interval.max(SAFE_FLOOR)
        } else {
            self.base_interval
        }
    }

    fn validate(&self) -> Result<(), BroadcastError> {
        if self.template.trim().is_empty() {
            return Err(BroadcastError::InvalidConfig("message is empty".into()));
        }
        if self.target_ids.is_empty() {
            return Err(BroadcastError::InvalidConfig("no targets selected".into()));
        }
        if self.duration.is_zero() {
            return Err(BroadcastError::InvalidConfig("duration is zero".into()));
        }
        Ok(())
    }
}

/// Timing knobs of the run loop. The defaults are the production values;
/// tests shrink them to millisecond scale.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Bounded wait on one send's handle before giving up on it.
    pub send_timeout: Duration,
    /// Uniform jitter slept after every attempted send.
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// Sleep after a pass with zero successes, clamped to the run deadline.
    pub idle_backoff: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(10),
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(3),
            idle_backoff: Duration::from_secs(5),
        }
    }
}

/// Lifecycle of the single run slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
}

struct Shared {
    state: Mutex<RunState>,
    sent: AtomicUsize,
    total: AtomicUsize,
}

/// Control surface over the single broadcast run slot.
///
/// `start` spawns the run loop as a Tokio task; the loop owns the
/// `→ Idle` transition and the per-destination `last_sent` map, while the
/// control side owns `Running → Stopping`. Must be used inside a Tokio
/// runtime.
pub struct Broadcaster<C: Transport + 'static> {
    facade: TransportFacade<C>,
    registry: Arc<DestinationRegistry>,
    sink: EventSink,
    timing: Timing,
    shared: Arc<Shared>,
}

impl<C: Transport + 'static> Broadcaster<C> {
    pub fn new(
        facade: TransportFacade<C>,
        registry: Arc<DestinationRegistry>,
        sink: EventSink,
    ) -> Self {
        Self::with_timing(facade, registry, sink, Timing::default())
    }

    pub fn with_timing(
        facade: TransportFacade<C>,
        registry: Arc<DestinationRegistry>,
        sink: EventSink,
        timing: Timing,
    ) -> Self {
        Self {
            facade,
            registry,
            sink,
            timing,
            shared: Arc::new(Shared {
                state: Mutex::new(RunState::Idle),
                sent: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
            }),
        }
    }

    /// Start a run. Rejects while another run is active — the caller decides
    /// whether "start while running" means stop (the CLI maps it to
    /// [`stop`](Self::stop)) or is an error.
    pub fn start(&self, params: JobParams) -> Result<(), BroadcastError> {
        params.validate()?;
        {
            let mut state = self.shared.state.lock().unwrap();
            if *state != RunState::Idle {
                return Err(BroadcastError::AlreadyRunning);
            }
            *state = RunState::Running;
        }
        self.shared.sent.store(0, Ordering::Relaxed);
        self.shared
            .total
            .store(params.target_ids.len(), Ordering::Relaxed);

        let run_id = Uuid::new_v4();
        tokio::spawn(run_loop(
            run_id,
            params,
            self.facade.clone(),
            Arc::clone(&self.registry),
            self.sink.clone(),
            self.timing,
            Arc::clone(&self.shared),
        ));
        Ok(())
    }

    /// Request a cooperative stop. No-op when idle. The loop observes the
    /// flag at its next check point; at most one in-flight send completes.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if *state == RunState::Running {
            *state = RunState::Stopping;
            self.sink.append("stop requested, finishing current send");
        }
    }

    pub fn is_running(&self) -> bool {
        *self.shared.state.lock().unwrap() != RunState::Idle
    }

    /// Successful sends so far over the target count, clamped to [0, 1].
    /// Resets to zero once the run ends.
    pub fn progress(&self) -> f32 {
        let total = self.shared.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let sent = self.shared.sent.load(Ordering::Relaxed);
        (sent as f32 / total as f32).min(1.0)
    }
}

fn stopping(shared: &Shared) -> bool {
    *shared.state.lock().unwrap() == RunState::Stopping
}

fn jitter(timing: &Timing) -> Duration {
    let lo = timing.jitter_min.as_millis() as u64;
    let hi = timing.jitter_max.as_millis() as u64;
    if hi <= lo {
        return timing.jitter_min;
    }
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

async fn run_loop<C: Transport + 'static>(
    run_id: Uuid,
    params: JobParams,
    facade: TransportFacade<C>,
    registry: Arc<DestinationRegistry>,
    sink: EventSink,
    timing: Timing,
    shared: Arc<Shared>,
) {
    let effective = params.effective_interval();
    if params.safe_floor && effective > params.base_interval {
        sink.append(format!(
            "safe floor active: effective interval is {}s",
            effective.as_secs()
        ));
    }

    let deadline = Instant::now() + params.duration;
    let mut last_sent: HashMap<DestinationId, Instant> = HashMap::new();

    info!(
        run_id = %run_id,
        targets = params.target_ids.len(),
        interval_secs = effective.as_secs(),
        "broadcast run started"
    );
    sink.append(format!(
        "broadcast started: {} targets",
        params.target_ids.len()
    ));

    'run: while !stopping(&shared) && Instant::now() < deadline {
        let mut sent_this_pass = 0usize;

        // Destinations closest to being unblocked go first, so a pass
        // wastes as little of the window as possible.
        let mut targets = registry.snapshot(&params.target_ids);
        targets.sort_by_key(|d| d.cooldown_remaining_secs);

        for dest in targets {
            if stopping(&shared) {
                break 'run;
            }
            if let Some(at) = last_sent.get(&dest.id) {
                if at.elapsed() < effective {
                    continue;
                }
            }
            if dest.cooldown_remaining_secs > 0 {
                continue;
            }

            let text = if params.variation {
                expand(&params.template)
            } else {
                params.template.clone()
            };

            sink.append(format!("sending to {}", dest.title));
            let mut handle = facade.send(dest.id, text);

            if !handle.wait(timing.send_timeout).await {
                // The send may still land later; duplicates after a false
                // timeout are an accepted risk.
                warn!(run_id = %run_id, destination = dest.id, "send timed out");
                sink.append(format!("send to {} failed: timed out", dest.title));
            } else {
                match handle.result() {
                    Ok(()) => {
                        last_sent.insert(dest.id, Instant::now());
                        registry.mark_sent(dest.id);
                        sent_this_pass += 1;
                        shared.sent.fetch_add(1, Ordering::Relaxed);
                        info!(run_id = %run_id, destination = dest.id, "sent");
                        sink.append(format!("sent to {}", dest.title));
                    }
                    Err(TransportError::RateLimited { wait_secs }) => {
                        registry.throttle(dest.id, wait_secs);
                        sink.append(format!(
                            "slow mode on {}: wait {}s",
                            dest.title, wait_secs
                        ));
                    }
                    Err(e) => {
                        warn!(run_id = %run_id, destination = dest.id, error = %e, "send failed");
                        sink.append(format!("send to {} failed: {e}", dest.title));
                    }
                }
            }

            sleep(jitter(&timing)).await;
        }

        if sent_this_pass == 0 && !stopping(&shared) {
            let backoff = timing
                .idle_backoff
                .min(deadline.saturating_duration_since(Instant::now()));
            if !backoff.is_zero() {
                sleep(backoff).await;
            }
        }
    }

    *shared.state.lock().unwrap() = RunState::Idle;
    shared.sent.store(0, Ordering::Relaxed);
    shared.total.store(0, Ordering::Relaxed);
    info!(run_id = %run_id, "broadcast run ended");
    sink.append("broadcast session ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{dest, mock_facade, MockScript, SendOutcome};
    use std::collections::HashSet;

    fn test_timing() -> Timing {
        Timing {
            send_timeout: Duration::from_millis(200),
            jitter_min: Duration::from_millis(1),
            jitter_max: Duration::from_millis(3),
            idle_backoff: Duration::from_millis(20),
        }
    }

    fn params(targets: Vec<DestinationId>, interval: Duration, duration: Duration) -> JobParams {
        JobParams {
            target_ids: targets,
            template: "hello".into(),
            variation: false,
            base_interval: interval,
            safe_floor: false,
            duration,
        }
    }

    fn registry_with(destinations: Vec<herald_core::types::Destination>) -> Arc<DestinationRegistry> {
        let registry = Arc::new(DestinationRegistry::new());
        registry.apply_refresh(destinations, &HashSet::new());
        registry
    }

    async fn wait_until_idle<C: Transport + 'static>(engine: &Broadcaster<C>, budget: Duration) {
        let deadline = Instant::now() + budget;
        while engine.is_running() {
            assert!(Instant::now() < deadline, "engine did not reach Idle in time");
            sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn every_target_receives_one_send_per_pass() {
        let fixture = mock_facade(MockScript::default());
        let registry = registry_with(vec![dest(1, 0), dest(2, 0), dest(3, 0)]);
        let (sink, _rx) = EventSink::channel();
        let engine =
            Broadcaster::with_timing(fixture.facade.clone(), registry, sink, test_timing());

        engine
            .start(params(
                vec![1, 2, 3],
                Duration::from_secs(60),
                Duration::from_millis(300),
            ))
            .unwrap();
        wait_until_idle(&engine, Duration::from_secs(5)).await;

        let log = fixture.log.lock().unwrap();
        let mut sent: Vec<_> = log.iter().map(|r| r.destination).collect();
        sent.sort_unstable();
        assert_eq!(sent, vec![1, 2, 3]);
        assert_eq!(engine.progress(), 0.0, "progress resets after the run");
    }

    #[tokio::test]
    async fn sends_to_one_destination_are_spaced_by_the_interval() {
        let fixture = mock_facade(MockScript::default());
        let registry = registry_with(vec![dest(1, 0)]);
        let (sink, _rx) = EventSink::channel();
        let engine =
            Broadcaster::with_timing(fixture.facade.clone(), registry, sink, test_timing());

        let interval = Duration::from_millis(300);
        engine
            .start(params(vec![1], interval, Duration::from_millis(1100)))
            .unwrap();
        wait_until_idle(&engine, Duration::from_secs(5)).await;

        let log = fixture.log.lock().unwrap();
        assert!(log.len() >= 2, "expected repeated sends, got {}", log.len());
        for pair in log.windows(2) {
            let gap = pair[1].at.duration_since(pair[0].at);
            assert!(gap >= interval, "sends {gap:?} apart, interval {interval:?}");
        }
    }

    #[tokio::test]
    async fn rate_limited_destination_is_skipped_until_ticked_down() {
        let mut script = MockScript::default();
        script
            .outcomes
            .insert(2, [SendOutcome::RateLimited(5)].into_iter().collect());
        let fixture = mock_facade(script);
        let registry = registry_with(vec![dest(1, 0), dest(2, 0)]);
        let (sink, _rx) = EventSink::channel();
        let engine = Broadcaster::with_timing(
            fixture.facade.clone(),
            Arc::clone(&registry),
            sink,
            test_timing(),
        );

        engine
            .start(params(
                vec![1, 2],
                Duration::from_millis(50),
                Duration::from_millis(400),
            ))
            .unwrap();
        wait_until_idle(&engine, Duration::from_secs(5)).await;

        // One throttled attempt, then no more while the cooldown is armed.
        let log = fixture.log.lock().unwrap();
        assert_eq!(log.iter().filter(|r| r.destination == 2).count(), 1);
        assert!(log.iter().filter(|r| r.destination == 1).count() >= 2);
        assert_eq!(registry.get(2).unwrap().cooldown_remaining_secs, 5);
    }

    #[tokio::test]
    async fn transport_failures_do_not_abort_the_run() {
        let mut script = MockScript::default();
        script.outcomes.insert(
            1,
            std::iter::repeat(SendOutcome::Fail("permission denied"))
                .take(16)
                .collect(),
        );
        let fixture = mock_facade(script);
        let registry = registry_with(vec![dest(1, 0), dest(2, 0)]);
        let (sink, mut rx) = EventSink::channel();
        let engine =
            Broadcaster::with_timing(fixture.facade.clone(), registry, sink, test_timing());

        engine
            .start(params(
                vec![1, 2],
                Duration::from_secs(60),
                Duration::from_millis(300),
            ))
            .unwrap();
        wait_until_idle(&engine, Duration::from_secs(5)).await;

        let log = fixture.log.lock().unwrap();
        assert!(log.iter().any(|r| r.destination == 2), "run aborted early");

        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            if event.message.contains("failed") {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn send_timeout_is_not_a_success() {
        let mut script = MockScript::default();
        script.outcomes.insert(
            1,
            std::iter::repeat(SendOutcome::Hang(Duration::from_secs(2)))
                .take(16)
                .collect(),
        );
        let fixture = mock_facade(script);
        let registry = registry_with(vec![dest(1, 0)]);
        let (sink, mut rx) = EventSink::channel();
        let engine =
            Broadcaster::with_timing(fixture.facade.clone(), registry, sink, test_timing());

        engine
            .start(params(
                vec![1],
                Duration::from_secs(60),
                Duration::from_millis(600),
            ))
            .unwrap();

        // Progress never moves: the hung send is not counted.
        sleep(Duration::from_millis(300)).await;
        assert_eq!(engine.progress(), 0.0);
        wait_until_idle(&engine, Duration::from_secs(5)).await;

        let mut saw_timeout = false;
        while let Ok(event) = rx.try_recv() {
            if event.message.contains("timed out") {
                saw_timeout = true;
            }
        }
        assert!(saw_timeout);
    }

    #[tokio::test]
    async fn stop_is_observed_within_one_send_and_jitter() {
        let fixture = mock_facade(MockScript::default());
        let registry = registry_with(vec![dest(1, 0)]);
        let (sink, _rx) = EventSink::channel();
        let engine =
            Broadcaster::with_timing(fixture.facade.clone(), registry, sink, test_timing());

        engine
            .start(params(
                vec![1],
                Duration::from_millis(20),
                Duration::from_secs(60),
            ))
            .unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(engine.is_running());

        engine.stop();
        // Bound: one send timeout plus one jitter sleep, with slack.
        wait_until_idle(&engine, Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn run_ends_at_the_duration_bound_without_sendable_targets() {
        let fixture = mock_facade(MockScript::default());
        let registry = registry_with(vec![dest(1, 0)]);
        registry.throttle(1, 3600);
        let (sink, _rx) = EventSink::channel();
        let engine =
            Broadcaster::with_timing(fixture.facade.clone(), registry, sink, test_timing());

        let started = Instant::now();
        engine
            .start(params(
                vec![1],
                Duration::from_millis(20),
                Duration::from_millis(300),
            ))
            .unwrap();

        sleep(Duration::from_millis(150)).await;
        assert!(engine.is_running(), "ended before the duration elapsed");
        wait_until_idle(&engine, Duration::from_secs(5)).await;

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(fixture.log.lock().unwrap().is_empty(), "throttled target was sent to");
    }

    #[tokio::test]
    async fn registry_refresh_never_widens_a_running_job() {
        let fixture = mock_facade(MockScript::default());
        let registry = registry_with(vec![dest(1, 0)]);
        let (sink, _rx) = EventSink::channel();
        let engine = Broadcaster::with_timing(
            fixture.facade.clone(),
            Arc::clone(&registry),
            sink,
            test_timing(),
        );

        engine
            .start(params(
                vec![1],
                Duration::from_millis(30),
                Duration::from_millis(500),
            ))
            .unwrap();

        sleep(Duration::from_millis(100)).await;
        registry.apply_refresh(vec![dest(1, 0), dest(2, 0)], &HashSet::new());
        wait_until_idle(&engine, Duration::from_secs(5)).await;

        let log = fixture.log.lock().unwrap();
        assert!(log.iter().all(|r| r.destination == 1), "new destination joined a fixed job");
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let fixture = mock_facade(MockScript::default());
        let registry = registry_with(vec![dest(1, 0)]);
        let (sink, _rx) = EventSink::channel();
        let engine =
            Broadcaster::with_timing(fixture.facade.clone(), registry, sink, test_timing());

        let p = params(
            vec![1],
            Duration::from_millis(20),
            Duration::from_millis(400),
        );
        engine.start(p.clone()).unwrap();
        assert!(matches!(
            engine.start(p),
            Err(BroadcastError::AlreadyRunning)
        ));

        engine.stop();
        wait_until_idle(&engine, Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_no_op() {
        let fixture = mock_facade(MockScript::default());
        let registry = registry_with(vec![]);
        let (sink, _rx) = EventSink::channel();
        let engine =
            Broadcaster::with_timing(fixture.facade.clone(), registry, sink, test_timing());

        engine.stop();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn invalid_parameters_never_reach_running() {
        let fixture = mock_facade(MockScript::default());
        let registry = registry_with(vec![dest(1, 0)]);
        let (sink, _rx) = EventSink::channel();
        let engine =
            Broadcaster::with_timing(fixture.facade.clone(), registry, sink, test_timing());

        let base = params(vec![1], Duration::from_secs(1), Duration::from_secs(1));

        let mut empty_message = base.clone();
        empty_message.template = "   ".into();
        assert!(matches!(
            engine.start(empty_message),
            Err(BroadcastError::InvalidConfig(_))
        ));

        let mut no_targets = base.clone();
        no_targets.target_ids.clear();
        assert!(matches!(
            engine.start(no_targets),
            Err(BroadcastError::InvalidConfig(_))
        ));

        let mut zero_duration = base;
        zero_duration.duration = Duration::ZERO;
        assert!(matches!(
            engine.start(zero_duration),
            Err(BroadcastError::InvalidConfig(_))
        ));

        assert!(!engine.is_running());
    }

    #[test]
    fn safe_floor_clamps_the_interval() {
        let mut p = JobParams {
            target_ids: vec![1],
            template: "hi".into(),
            variation: false,
            base_interval: Duration::from_secs(5),
            safe_floor: true,
            duration: Duration::from_secs(120),
        };
        assert_eq!(p.effective_interval(), Duration::from_secs(60));

        p.safe_floor = false;
        assert_eq!(p.effective_interval(), Duration::from_secs(5));

        p.safe_floor = true;
        p.base_interval = Duration::from_secs(90);
        assert_eq!(p.effective_interval(), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn variation_expands_per_send() {
        let fixture = mock_facade(MockScript::default());
        let registry = registry_with(vec![dest(1, 0)]);
        let (sink, _rx) = EventSink::channel();
        let engine =
            Broadcaster::with_timing(fixture.facade.clone(), registry, sink, test_timing());

        let mut p = params(
            vec![1],
            Duration::from_millis(10),
            Duration::from_millis(500),
        );
        p.template = "{a|b}".into();
        p.variation = true;
        engine.start(p).unwrap();
        wait_until_idle(&engine, Duration::from_secs(5)).await;

        let log = fixture.log.lock().unwrap();
        assert!(!log.is_empty());
        assert!(log.iter().all(|r| r.text == "a" || r.text == "b"));
    }
}
