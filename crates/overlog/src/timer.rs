//! Periodic alarms driving recurring computation.
//!
//! Each alarm binds a relation name, a fixed period, and the next absolute
//! deadline. Polling synthesizes one tuple per elapsed period, carrying the
//! firing deadline timestamp, and enqueues it to the router under the
//! alarm's relation; a rule triggered by that relation thus runs on every
//! tick. Deadlines are epoch microseconds; overflowing the deadline
//! arithmetic indicates a corrupted time base and is unrecoverable.

use crate::catalog::Catalog;
use crate::datum::{DataType, Datum};
use crate::error::Error;
use crate::router::WorkItem;
use crate::tuple::Tuple;
use crossbeam::channel::Sender;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

struct Alarm {
    table: String,
    period_us: i64,
    deadline_us: i64,
}

/// Per-instance alarm state. Alarms are registered at program install and
/// polled by whatever event loop hosts the runtime.
pub struct Timer {
    catalog: Arc<Catalog>,
    sender: Sender<WorkItem>,
    alarms: Mutex<Vec<Alarm>>,
}

impl Timer {
    pub(crate) fn new(catalog: Arc<Catalog>, sender: Sender<WorkItem>) -> Timer {
        Timer {
            catalog,
            sender,
            alarms: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new alarm; the first deadline is one period from now.
    /// The alarm relation must be a single `int` column (the firing
    /// timestamp).
    pub fn add_alarm(&self, table: &str, period_ms: u64) -> Result<(), Error> {
        self.add_alarm_at(table, period_ms, now_us())
    }

    fn add_alarm_at(&self, table: &str, period_ms: u64, now: i64) -> Result<(), Error> {
        let def = self.catalog.lookup(table)?;
        match def.schema().types() {
            [DataType::Int] => {}
            [ty] => {
                return Err(Error::TypeMismatch {
                    context: format!("timer relation '{table}'"),
                    expected: DataType::Int,
                    actual: *ty,
                });
            }
            other => {
                return Err(Error::ArityMismatch {
                    table: table.to_string(),
                    expected: 1,
                    actual: other.len(),
                });
            }
        }
        let period_us = i64::try_from(period_ms)
            .ok()
            .and_then(|ms| ms.checked_mul(1000))
            .unwrap_or_else(|| panic!("timer period overflow: {period_ms}ms"));
        self.alarms.lock().unwrap().push(Alarm {
            table: table.to_string(),
            period_us,
            deadline_us: deadline_after(now, period_us),
        });
        Ok(())
    }

    /// The time until the nearest deadline (zero if one is already due), or
    /// `None` when no alarms are registered.
    pub fn sleep_time(&self) -> Option<Duration> {
        self.sleep_time_at(now_us())
    }

    fn sleep_time_at(&self, now: i64) -> Option<Duration> {
        let alarms = self.alarms.lock().unwrap();
        alarms
            .iter()
            .map(|alarm| alarm.deadline_us.saturating_sub(now).max(0))
            .min()
            .map(|us| Duration::from_micros(us as u64))
    }

    /// Fires every elapsed alarm, possibly several times per alarm if the
    /// process fell behind, and returns whether anything fired.
    pub fn poll(&self) -> bool {
        self.poll_at(now_us())
    }

    fn poll_at(&self, now: i64) -> bool {
        // Advance deadlines under the lock, but enqueue after releasing it:
        // the send blocks on a full queue, and the router thread that frees
        // queue slots may itself need the alarms lock (program installs call
        // `add_alarm`).
        let mut due = Vec::new();
        {
            let mut alarms = self.alarms.lock().unwrap();
            for alarm in alarms.iter_mut() {
                // An alarm may fire many times in one poll before its
                // deadline moves into the future.
                while alarm.deadline_us <= now {
                    due.push((alarm.table.clone(), alarm.deadline_us));
                    alarm.deadline_us = deadline_after(alarm.deadline_us, alarm.period_us);
                }
            }
        }
        let fired = !due.is_empty();
        for (table, deadline_us) in due {
            self.fire(&table, deadline_us);
        }
        fired
    }

    fn fire(&self, table: &str, deadline_us: i64) {
        let def = match self.catalog.lookup(table) {
            Ok(def) => def,
            Err(error) => {
                warn!("alarm for dropped table '{table}': {error}");
                return;
            }
        };
        let tuple = match Tuple::new(table, def.schema(), vec![Datum::Int(deadline_us)]) {
            Ok(tuple) => tuple,
            Err(error) => {
                warn!("alarm tuple for '{table}' rejected: {error}");
                return;
            }
        };
        if self
            .sender
            .send(WorkItem::Tuple {
                table: table.to_string(),
                tuple,
            })
            .is_err()
        {
            warn!("alarm for '{table}' fired after shutdown");
        }
    }
}

fn now_us() -> i64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| panic!("system clock is before the Unix epoch"));
    i64::try_from(since_epoch.as_micros())
        .unwrap_or_else(|_| panic!("time base overflow: {since_epoch:?}"))
}

fn deadline_after(now: i64, period_us: i64) -> i64 {
    now.checked_add(period_us)
        .unwrap_or_else(|| panic!("timer deadline overflow: {now} + {period_us}"))
}

#[cfg(test)]
mod test {
    use super::Timer;
    use crate::catalog::Catalog;
    use crate::datum::DataType;
    use crate::router::WorkItem;
    use crate::schema::Schema;
    use crossbeam::channel::{bounded, Receiver};
    use std::sync::Arc;
    use std::time::Duration;

    fn mk_timer() -> (Timer, Receiver<WorkItem>) {
        let catalog = Arc::new(Catalog::new());
        catalog
            .define_table("tick", Schema::new(vec![DataType::Int]), vec![0], None)
            .unwrap();
        let (sender, receiver) = bounded(16);
        (Timer::new(catalog, sender), receiver)
    }

    #[test]
    fn late_poll_fires_once_per_elapsed_period() {
        let (timer, receiver) = mk_timer();
        let t0 = 1_000_000;
        let period_ms = 100; // 100_000us
        timer.add_alarm_at("tick", period_ms, t0).unwrap();

        // Poll at T0 + 3.5 periods: exactly three deadlines have passed.
        assert!(timer.poll_at(t0 + 350_000));
        let fired: Vec<_> = receiver.try_iter().collect();
        assert_eq!(fired.len(), 3);

        // Each firing advanced the deadline by exactly one period, and the
        // next deadline is now past the poll time.
        let alarms = timer.alarms.lock().unwrap();
        assert_eq!(alarms[0].deadline_us, t0 + 400_000);
        assert!(alarms[0].deadline_us > t0 + 350_000);
    }

    #[test]
    fn early_poll_fires_nothing() {
        let (timer, receiver) = mk_timer();
        timer.add_alarm_at("tick", 100, 1_000_000).unwrap();
        assert!(!timer.poll_at(1_050_000));
        assert!(receiver.try_iter().next().is_none());
    }

    #[test]
    fn sleep_time_tracks_the_nearest_deadline() {
        let (timer, _receiver) = mk_timer();
        assert_eq!(timer.sleep_time_at(0), None);
        timer.add_alarm_at("tick", 100, 1_000_000).unwrap();
        assert_eq!(
            timer.sleep_time_at(1_020_000),
            Some(Duration::from_micros(80_000))
        );
        // A deadline already due means "don't sleep".
        assert_eq!(
            timer.sleep_time_at(2_000_000),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn blocked_firing_does_not_hold_the_alarm_lock() {
        let catalog = Arc::new(Catalog::new());
        let schema = Schema::new(vec![DataType::Int]);
        catalog
            .define_table("tick", schema.clone(), vec![0], None)
            .unwrap();
        catalog
            .define_table("tock", schema, vec![0], None)
            .unwrap();
        let (sender, receiver) = bounded(1);
        // Fill the queue so the first firing blocks.
        sender.send(WorkItem::Shutdown).unwrap();
        let timer = Arc::new(Timer::new(catalog, sender));
        timer.add_alarm_at("tick", 100, 1_000_000).unwrap();

        let poller = {
            let timer = timer.clone();
            std::thread::spawn(move || timer.poll_at(1_350_000))
        };
        // Let the poller reach the blocking send.
        std::thread::sleep(Duration::from_millis(50));

        // The alarms lock must be free while the send waits for queue
        // space; a program install on the router thread registers alarms
        // through this same path.
        timer.add_alarm_at("tock", 100, 1_350_000).unwrap();
        assert!(timer.sleep_time_at(1_350_000).is_some());

        // Drain the filler plus the three catch-up firings.
        let drained = std::thread::spawn(move || receiver.iter().take(4).count());
        assert!(poller.join().unwrap());
        assert_eq!(drained.join().unwrap(), 4);
    }

    #[test]
    fn alarm_relation_must_be_a_single_int() {
        let catalog = Arc::new(Catalog::new());
        catalog
            .define_table(
                "bad",
                Schema::new(vec![DataType::String]),
                vec![0],
                None,
            )
            .unwrap();
        let (sender, _receiver) = bounded(1);
        let timer = Timer::new(catalog, sender);
        assert!(timer.add_alarm("bad", 10).is_err());
        assert!(timer.add_alarm("missing", 10).is_err());
    }
}
