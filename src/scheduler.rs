//! Cooperative sampling cycle shared by all drivers.
//!
//! ```text
//! Idle --sleep--> Acquiring --conversion wait--> Reading --> Uploading --safe--> Idle
//! ```
//!
//! Every transition is an elapsed-time check made from `tick`; nothing here
//! sleeps. Drivers without conversion latency go straight from Idle to
//! Reading, interrupt-driven drivers from Idle to Uploading.

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

use crate::sensors::DeviceRecord;
use crate::upload::{check_upload_safety, LinkStatus, UploadClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Acquiring,
    Reading,
    Uploading,
}

/// Shape of a driver's cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// Start a conversion, wait, then read
    Converting(Duration),
    /// Read as soon as the sleep period is over
    Direct,
    /// Values are produced elsewhere; only upload
    UploadOnly,
}

#[derive(Debug, Clone)]
pub struct SamplingScheduler {
    phase: Phase,
    cycle: Cycle,
    sleep_period: Duration,
    last_transition: Instant,
    pending: Duration,
}

impl SamplingScheduler {
    pub fn new(sleep_period: Duration, cycle: Cycle) -> Self {
        Self {
            phase: Phase::Idle,
            cycle,
            sleep_period,
            last_transition: Instant::from_ticks(0),
            pending: sleep_period,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sleep_period(&self) -> Duration {
        self.sleep_period
    }

    pub fn set_sleep_period(&mut self, period: Duration) {
        self.sleep_period = period;
        if self.phase == Phase::Idle {
            self.pending = period;
        }
    }

    /// Instant of the last phase change (or of the last completed cycle while idle)
    pub fn last_transition(&self) -> Instant {
        self.last_transition
    }

    fn elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_transition) >= self.pending
    }

    fn enter(&mut self, phase: Phase, now: Instant, pending: Duration) {
        self.phase = phase;
        self.last_transition = now;
        self.pending = pending;
    }

    /// Make the time-driven transitions that are due. Returns the phase
    /// entered on this call, if any; the driver performs that phase's
    /// side effect. A driver without sensors stays idle.
    pub fn poll(&mut self, now: Instant, sensors: usize) -> Option<Phase> {
        match self.phase {
            Phase::Idle => {
                if sensors == 0 || !self.elapsed(now) {
                    return None;
                }
                let (next, wait) = match self.cycle {
                    Cycle::Converting(wait) => (Phase::Acquiring, wait),
                    Cycle::Direct => (Phase::Reading, Duration::from_ticks(0)),
                    Cycle::UploadOnly => (Phase::Uploading, Duration::from_ticks(0)),
                };
                self.enter(next, now, wait);
                Some(next)
            }
            Phase::Acquiring if self.elapsed(now) => {
                self.enter(Phase::Reading, now, Duration::from_ticks(0));
                Some(Phase::Reading)
            }
            _ => None,
        }
    }

    /// Reading is over, values are in the records
    pub fn readings_stored(&mut self, now: Instant) {
        if self.phase == Phase::Reading {
            self.enter(Phase::Uploading, now, Duration::from_ticks(0));
        }
    }

    /// Upload done; the next cycle starts one sleep period from `now`
    pub fn complete(&mut self, now: Instant) {
        if self.phase == Phase::Uploading {
            self.enter(Phase::Idle, now, self.sleep_period);
        }
    }
}

/// Per-iteration context handed to every driver's `tick`.
///
/// Holds the loop's notion of "now", the link status used by the upload
/// gate and the single upload client. Only one driver gets to upload per
/// iteration; later drivers in `Uploading` retry on the next tick.
pub struct TickContext<'a, 'b> {
    pub now: Instant,
    link: &'a dyn LinkStatus,
    uploader: &'a mut UploadClient<'b>,
    upload_slot_free: bool,
}

impl<'a, 'b> TickContext<'a, 'b> {
    pub fn new(now: Instant, link: &'a dyn LinkStatus, uploader: &'a mut UploadClient<'b>) -> Self {
        Self {
            now,
            link,
            uploader,
            upload_slot_free: true,
        }
    }

    pub fn upload_slot_free(&self) -> bool {
        self.upload_slot_free
    }

    /// Run the upload half of a cycle: if the scheduler is `Uploading` and
    /// uploads are safe, submit every bound record with a valid value and
    /// complete the cycle. Returns whether the cycle completed.
    ///
    /// Records without a value are skipped; the remaining ones are still sent.
    pub fn upload(&mut self, driver: &str, scheduler: &mut SamplingScheduler, records: &[DeviceRecord]) -> bool {
        if scheduler.phase() != Phase::Uploading {
            return false;
        }

        if let Err(reason) = check_upload_safety(self.link) {
            info!("[{}] upload deferred: {}", driver, reason);
            return false;
        }

        if records.iter().all(|r| r.upload_candidate().is_none()) {
            scheduler.complete(self.now);
            return true;
        }

        if !self.upload_slot_free {
            debug!("[{}] upload slot busy, waiting", driver);
            return false;
        }

        self.upload_slot_free = false;
        for (bound_id, value) in records.iter().filter_map(DeviceRecord::upload_candidate) {
            if let Err(e) = self.uploader.submit(bound_id, value) {
                warn!("[{}] sample for {} dropped: {}", driver, bound_id, e);
            }
        }

        scheduler.complete(self.now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLink, MockTransport};
    use crate::sensors::BusAddress;

    const ID: &str = "6836dac0-8f5c-11e5-8f8f-6d2b8d3ba4e1";

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn converting() -> SamplingScheduler {
        SamplingScheduler::new(Duration::from_secs(10), Cycle::Converting(Duration::from_secs(1)))
    }

    fn bound_record(value: f32) -> DeviceRecord {
        let mut record = DeviceRecord::new(BusAddress::EMPTY);
        record.bind(ID).unwrap();
        record.value = value;
        record
    }

    #[test]
    fn test_full_cycle_timing() {
        let mut sched = converting();
        assert_eq!(sched.phase(), Phase::Idle);

        assert_eq!(sched.poll(at(9_999), 1), None);
        assert_eq!(sched.poll(at(10_000), 1), Some(Phase::Acquiring));

        assert_eq!(sched.poll(at(10_500), 1), None);
        assert_eq!(sched.phase(), Phase::Acquiring);
        assert_eq!(sched.poll(at(11_000), 1), Some(Phase::Reading));

        sched.readings_stored(at(11_000));
        assert_eq!(sched.phase(), Phase::Uploading);
        // uploading never advances on time alone
        assert_eq!(sched.poll(at(60_000), 1), None);

        sched.complete(at(12_000));
        assert_eq!(sched.phase(), Phase::Idle);
        assert_eq!(sched.last_transition(), at(12_000));
        assert_eq!(sched.poll(at(21_999), 1), None);
        assert_eq!(sched.poll(at(22_000), 1), Some(Phase::Acquiring));
    }

    #[test]
    fn test_no_sensors_stays_idle() {
        let mut sched = converting();
        for ms in [0, 10_000, 100_000, 1_000_000] {
            assert_eq!(sched.poll(at(ms), 0), None);
            assert_eq!(sched.phase(), Phase::Idle);
        }
    }

    #[test]
    fn test_direct_and_upload_only_cycles() {
        let mut direct = SamplingScheduler::new(Duration::from_secs(10), Cycle::Direct);
        assert_eq!(direct.poll(at(10_000), 1), Some(Phase::Reading));

        let mut upload_only = SamplingScheduler::new(Duration::from_secs(10), Cycle::UploadOnly);
        assert_eq!(upload_only.poll(at(10_000), 1), Some(Phase::Uploading));
    }

    #[test]
    fn test_upload_completes_cycle() {
        let link = MockLink::online();
        let mut transport = MockTransport::new();
        let mut uploader = UploadClient::new("http://mw", &mut transport);
        let mut ctx = TickContext::new(at(11_000), &link, &mut uploader);

        let mut sched = SamplingScheduler::new(Duration::from_secs(10), Cycle::UploadOnly);
        sched.poll(at(10_000), 1);
        assert!(ctx.upload("test", &mut sched, &[bound_record(20.0)]));
        assert_eq!(sched.phase(), Phase::Idle);
        assert_eq!(sched.last_transition(), at(11_000));
        assert!(!ctx.upload_slot_free());
        drop(ctx);
        drop(uploader);
        assert_eq!(transport.requests.len(), 1);
    }

    #[test]
    fn test_unsafe_link_holds_uploading() {
        let link = MockLink::offline();
        let mut transport = MockTransport::new();
        let mut uploader = UploadClient::new("http://mw", &mut transport);
        let mut sched = SamplingScheduler::new(Duration::from_secs(10), Cycle::UploadOnly);
        sched.poll(at(10_000), 1);

        for ms in (10_000..200_000).step_by(5_000) {
            let mut ctx = TickContext::new(at(ms), &link, &mut uploader);
            assert_eq!(sched.poll(at(ms), 1), None);
            assert!(!ctx.upload("test", &mut sched, &[bound_record(20.0)]));
            assert_eq!(sched.phase(), Phase::Uploading);
        }
        drop(uploader);
        assert!(transport.requests.is_empty());
    }

    #[test]
    fn test_nan_record_skipped_others_sent() {
        let link = MockLink::online();
        let mut transport = MockTransport::new();
        let mut uploader = UploadClient::new("http://mw", &mut transport);
        let mut ctx = TickContext::new(at(10_000), &link, &mut uploader);
        let mut sched = SamplingScheduler::new(Duration::from_secs(10), Cycle::UploadOnly);
        sched.poll(at(10_000), 3);

        let records = [bound_record(f32::NAN), bound_record(1.0), bound_record(2.0)];
        assert!(ctx.upload("test", &mut sched, &records));
        drop(ctx);
        drop(uploader);
        assert_eq!(transport.requests.len(), 2);
    }

    #[test]
    fn test_nothing_to_send_still_waits_for_link() {
        let offline = MockLink::offline();
        let online = MockLink::online();
        let mut transport = MockTransport::new();
        let mut uploader = UploadClient::new("http://mw", &mut transport);
        let mut sched = SamplingScheduler::new(Duration::from_secs(10), Cycle::UploadOnly);
        sched.poll(at(10_000), 1);
        let unbound = [DeviceRecord::unaddressed()];

        let mut ctx = TickContext::new(at(10_000), &offline, &mut uploader);
        assert!(!ctx.upload("test", &mut sched, &unbound));
        assert_eq!(sched.phase(), Phase::Uploading);

        let mut ctx = TickContext::new(at(10_010), &online, &mut uploader);
        assert!(ctx.upload("test", &mut sched, &unbound));
        assert_eq!(sched.phase(), Phase::Idle);
        // nothing was sent, so the slot is still available
        assert!(ctx.upload_slot_free());
    }

    #[test]
    fn test_one_upload_per_iteration() {
        let link = MockLink::online();
        let mut transport = MockTransport::new();
        let mut uploader = UploadClient::new("http://mw", &mut transport);
        let mut first = SamplingScheduler::new(Duration::from_secs(10), Cycle::UploadOnly);
        let mut second = SamplingScheduler::new(Duration::from_secs(10), Cycle::UploadOnly);
        first.poll(at(10_000), 1);
        second.poll(at(10_000), 1);

        let mut ctx = TickContext::new(at(10_000), &link, &mut uploader);
        assert!(ctx.upload("first", &mut first, &[bound_record(1.0)]));
        assert!(!ctx.upload("second", &mut second, &[bound_record(2.0)]));
        assert_eq!(second.phase(), Phase::Uploading);

        let mut ctx = TickContext::new(at(10_010), &link, &mut uploader);
        assert!(ctx.upload("second", &mut second, &[bound_record(2.0)]));
    }
}
