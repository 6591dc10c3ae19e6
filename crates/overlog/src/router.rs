//! The central coordinator: a single worker thread that serializes all
//! tuple movement.
//!
//! Producers (timers, network receivers, application callers) enqueue work
//! items into a bounded multi-producer single-consumer channel; the router
//! thread drains it one item at a time. Because no two work items execute
//! concurrently, the operator-chain/storage mutation path needs no further
//! locking discipline, and derived insertions can safely re-enter routing.
//! Derived tuples are drained to fixpoint on a router-local queue before the
//! next external item, so the bounded channel can never deadlock on its own
//! output.

use crate::ast::Program;
use crate::catalog::Catalog;
use crate::datum::{Datum, Str};
use crate::error::Error;
use crate::network::Network;
use crate::operator::{Derived, OpChain, Pending};
use crate::planner::{plan_program, ProgramPlan};
use crate::timer::Timer;
use crate::tuple::Tuple;
use crossbeam::channel::{Receiver, Sender};
use hashbrown::HashMap;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, RwLock,
};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// A unit of router input.
pub(crate) enum WorkItem {
    /// A tuple to route under the named relation.
    Tuple { table: String, tuple: Tuple },
    /// A program to plan and install on the router thread.
    Program(Box<Program>),
    /// Exit the worker loop after draining everything enqueued before this.
    Shutdown,
}

pub(crate) struct RouterShared {
    catalog: Arc<Catalog>,
    network: Arc<dyn Network>,
    local_addr: Str,
    timer: Arc<Timer>,
    /// Dispatch index: trigger relation name to chain list, most recently
    /// installed first.
    chains: RwLock<HashMap<String, Vec<Arc<OpChain>>>>,
    tuples_routed: AtomicU64,
}

impl RouterShared {
    /// Routes one external tuple and drains every derivation it causes.
    pub(crate) fn route_fixpoint(&self, table: &str, tuple: Tuple) {
        let mut derived = Derived::new();
        self.route_one(table, tuple, false, true, &mut derived);
        self.drain(&mut derived);
    }

    fn drain(&self, derived: &mut Derived) {
        while let Some(pending) = derived.pop_front() {
            self.route_one(&pending.table, pending.tuple, pending.stored, false, derived);
        }
    }

    /// Routes a single tuple. If the relation's location column names
    /// another node, the tuple is handed to the network and never touches
    /// local state. Otherwise a not-yet-stored tuple is applied to the
    /// relation's storage first. An external item runs every chain
    /// registered for the relation whether or not storage already held the
    /// tuple (retraction chains must see every delta); a derived duplicate
    /// ends here, which is what terminates recursive derivation.
    /// Routing-time errors drop this one item; the router thread stays live
    /// for unrelated relations.
    fn route_one(
        &self,
        table: &str,
        tuple: Tuple,
        stored: bool,
        external: bool,
        derived: &mut Derived,
    ) {
        let Some(def) = self.catalog.get(table) else {
            warn!("dropping tuple for unknown table '{table}': {tuple}");
            return;
        };

        if !stored {
            if let Some(col) = def.loc_col() {
                // The catalog guarantees the location column is a string.
                if let Datum::String(addr) = tuple.get(col) {
                    if *addr != self.local_addr {
                        debug!("remote tuple: {table}{tuple} => {addr}");
                        self.network.send(addr, table, &tuple);
                        return;
                    }
                }
            }
            if !def.storage().lock().unwrap().insert(tuple.clone()) && !external {
                debug!("duplicate derived tuple: {table}{tuple}");
                return;
            }
        }

        debug!("routing tuple: {table}{tuple}");
        let chains = self
            .chains
            .read()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default();
        for chain in &chains {
            if let Err(error) = chain.run(&tuple, &self.catalog, derived) {
                warn!(
                    "chain for rule '{}' failed on {table}{tuple}: {error}",
                    chain.rule
                );
            }
        }
        self.tuples_routed.fetch_add(1, Ordering::Relaxed);
    }

    /// Links a new chain onto the head of the list for its trigger relation.
    pub(crate) fn add_chain(&self, chain: OpChain) {
        let mut chains = self.chains.write().unwrap();
        chains
            .entry(chain.delta_table.clone())
            .or_default()
            .insert(0, Arc::new(chain));
    }

    /// Plans and installs a program: all-or-nothing with respect to planning
    /// errors. Tables are defined, alarms registered, chains linked into the
    /// dispatch index, pre-existing bootstrap content replayed through the
    /// new chains, and finally initial facts routed to fixpoint.
    pub(crate) fn install_program(&self, program: &Program) -> Result<(), Error> {
        let plan = plan_program(program, &self.catalog)?;
        info!("installing program '{}'", plan.name);
        self.install_plan(plan)
    }

    fn install_plan(&self, plan: ProgramPlan) -> Result<(), Error> {
        for decl in &plan.tables {
            self.catalog.define_table(
                &decl.name,
                crate::schema::Schema::new(decl.cols.clone()),
                decl.key_cols.clone(),
                decl.loc_col,
            )?;
        }
        for timer in &plan.timers {
            self.timer.add_alarm(&timer.table, timer.period_ms)?;
        }

        for rule in &plan.rules {
            for chain in &rule.chains {
                self.add_chain(chain.clone());
            }
        }

        // A new rule must observe table state as of its install, not only
        // future deltas: replay the bootstrap relation's current content
        // through the rule's own chains, exactly once each, without
        // re-running chains installed earlier.
        for rule in &plan.rules {
            let def = self.catalog.lookup(&rule.bootstrap)?;
            let existing: Vec<Tuple> = def.storage().lock().unwrap().scan().collect();
            let mut derived = Derived::new();
            for tuple in &existing {
                for chain in &rule.chains {
                    if chain.delta_table != rule.bootstrap {
                        continue;
                    }
                    if let Err(error) = chain.run(tuple, &self.catalog, &mut derived) {
                        warn!(
                            "bootstrap of rule '{}' failed on {}{tuple}: {error}",
                            rule.name, rule.bootstrap
                        );
                    }
                }
            }
            self.drain(&mut derived);
        }

        for (table, tuple) in plan.facts {
            self.route_fixpoint(&table, tuple);
        }
        Ok(())
    }

    pub(crate) fn tuples_routed(&self) -> u64 {
        self.tuples_routed.load(Ordering::Relaxed)
    }
}

/// Handle to the router: the dispatch index plus the worker thread that
/// drains the work queue.
pub struct Router {
    shared: Arc<RouterShared>,
    sender: Sender<WorkItem>,
    /// Set by `stop` before the shutdown item is sent, so enqueues fail the
    /// moment shutdown begins instead of racing the worker's receiver drop.
    closed: AtomicBool,
    receiver: Mutex<Option<Receiver<WorkItem>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    pub(crate) fn new(
        catalog: Arc<Catalog>,
        network: Arc<dyn Network>,
        local_addr: Str,
        timer: Arc<Timer>,
        sender: Sender<WorkItem>,
        receiver: Receiver<WorkItem>,
    ) -> Router {
        Router {
            shared: Arc::new(RouterShared {
                catalog,
                network,
                local_addr,
                timer,
                chains: RwLock::new(HashMap::new()),
                tuples_routed: AtomicU64::new(0),
            }),
            sender,
            closed: AtomicBool::new(false),
            receiver: Mutex::new(Some(receiver)),
            thread: Mutex::new(None),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<RouterShared> {
        &self.shared
    }

    /// Pins the tuple into a work item and enqueues it. Blocks while the
    /// queue is full; fails with [`Error::Terminated`] once the runtime has
    /// shut down. FIFO per producer.
    pub fn enqueue_tuple(&self, table: &str, tuple: Tuple) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Terminated);
        }
        debug!("enqueue tuple: {table}{tuple}");
        self.sender
            .send(WorkItem::Tuple {
                table: table.to_string(),
                tuple,
            })
            .map_err(|_| Error::Terminated)
    }

    /// Enqueues a program install to run on the router thread. A failed
    /// install is logged and installs nothing; resubmission is up to the
    /// caller.
    pub fn enqueue_program(&self, program: Program) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Terminated);
        }
        self.sender
            .send(WorkItem::Program(Box::new(program)))
            .map_err(|_| Error::Terminated)
    }

    /// Spawns the worker thread. Idempotent; the second call is a no-op.
    pub fn start(&self) {
        let Some(receiver) = self.receiver.lock().unwrap().take() else {
            warn!("router already started");
            return;
        };
        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("overlog-router".to_string())
            .spawn(move || worker_loop(shared, receiver))
            .unwrap_or_else(|error| panic!("failed to spawn router thread: {error}"));
        *self.thread.lock().unwrap() = Some(handle);
    }

    /// Enqueues a shutdown item and joins the worker. Items enqueued before
    /// the shutdown are drained first; enqueues after it fail with
    /// [`Error::Terminated`]. Idempotent.
    pub fn stop(&self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.sender.send(WorkItem::Shutdown);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            if handle.join().is_err() {
                warn!("router thread panicked");
            }
        }
    }

    pub fn tuples_routed(&self) -> u64 {
        self.shared.tuples_routed()
    }
}

fn worker_loop(shared: Arc<RouterShared>, receiver: Receiver<WorkItem>) {
    debug!("router thread running");
    // Dropping the receiver on exit disconnects the channel, so blocked and
    // future producers fail instead of waiting forever.
    for item in receiver.iter() {
        match item {
            WorkItem::Tuple { table, tuple } => shared.route_fixpoint(&table, tuple),
            WorkItem::Program(program) => {
                if let Err(error) = shared.install_program(&program) {
                    warn!("program install failed: {error}");
                }
            }
            WorkItem::Shutdown => break,
        }
    }
    debug!("router thread exiting");
}

#[cfg(test)]
mod test {
    use super::{Router, WorkItem};
    use crate::catalog::Catalog;
    use crate::datum::{DataType, Datum, Str};
    use crate::error::Error;
    use crate::expr::Expr;
    use crate::network::NullNetwork;
    use crate::operator::{InsertOp, Op, OpChain};
    use crate::schema::Schema;
    use crate::timer::Timer;
    use crate::tuple::Tuple;
    use crossbeam::channel::bounded;
    use std::sync::Arc;

    fn mk_router(catalog: Arc<Catalog>) -> Router {
        let (sender, receiver) = bounded::<WorkItem>(128);
        let timer = Arc::new(Timer::new(catalog.clone(), sender.clone()));
        Router::new(
            catalog,
            Arc::new(NullNetwork),
            Str::from("localhost:5000"),
            timer,
            sender,
            receiver,
        )
    }

    fn int_tuple(schema: &Schema, v: i64) -> Tuple {
        Tuple::new("t", schema, vec![Datum::Int(v)]).unwrap()
    }

    #[test]
    fn fifo_per_producer() {
        let catalog = Arc::new(Catalog::new());
        let schema = Schema::new(vec![DataType::Int]);
        let def = catalog
            .define_table("t", schema.clone(), vec![0], None)
            .unwrap();
        let router = mk_router(catalog.clone());
        router.start();

        for v in 0..100 {
            router.enqueue_tuple("t", int_tuple(&schema, v)).unwrap();
        }
        router.stop();

        // All 100 tuples were applied; single-consumer FIFO means they were
        // applied in enqueue order, so the final count proves no loss.
        assert_eq!(def.storage().lock().unwrap().len(), 100);
        assert_eq!(router.tuples_routed(), 100);
    }

    #[test]
    fn unknown_table_drops_the_item_only() {
        let catalog = Arc::new(Catalog::new());
        let schema = Schema::new(vec![DataType::Int]);
        catalog
            .define_table("known", schema.clone(), vec![0], None)
            .unwrap();
        let router = mk_router(catalog.clone());
        router.start();

        router
            .enqueue_tuple("missing", int_tuple(&schema, 1))
            .unwrap();
        router
            .enqueue_tuple("known", int_tuple(&schema, 2))
            .unwrap();
        router.stop();

        let def = catalog.lookup("known").unwrap();
        assert_eq!(def.storage().lock().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_external_tuples_still_run_chains() {
        let catalog = Arc::new(Catalog::new());
        let schema = Schema::new(vec![DataType::Int]);
        catalog
            .define_table("kill", schema.clone(), vec![0], None)
            .unwrap();
        let status = catalog
            .define_table("status", schema.clone(), vec![0], None)
            .unwrap();
        let router = mk_router(catalog);
        router.shared().add_chain(OpChain {
            rule: "reap".to_string(),
            delta_table: "kill".to_string(),
            head_table: "status".to_string(),
            ops: vec![Op::Insert(InsertOp::new(
                "status",
                Some(vec![Expr::Column(0)]),
                true,
            ))],
        });
        let kill = Tuple::new("kill", &schema, vec![Datum::Int(1)]).unwrap();
        let alive = Tuple::new("status", &schema, vec![Datum::Int(1)]).unwrap();

        router.shared().route_fixpoint("kill", kill.clone());
        status.storage().lock().unwrap().insert(alive);
        assert_eq!(status.storage().lock().unwrap().len(), 1);

        // kill(1) is already stored, but the retraction chain must still
        // see the delta.
        router.shared().route_fixpoint("kill", kill);
        assert_eq!(status.storage().lock().unwrap().len(), 0);
    }

    #[test]
    fn enqueue_fails_as_soon_as_stop_begins() {
        let catalog = Arc::new(Catalog::new());
        let schema = Schema::new(vec![DataType::Int]);
        catalog
            .define_table("t", schema.clone(), vec![0], None)
            .unwrap();
        // No worker was started, so the channel stays connected; the stop
        // flag alone must reject the enqueue.
        let router = mk_router(catalog);
        router.stop();
        assert!(matches!(
            router.enqueue_tuple("t", int_tuple(&schema, 1)),
            Err(Error::Terminated)
        ));
    }

    #[test]
    fn enqueue_after_shutdown_fails() {
        let catalog = Arc::new(Catalog::new());
        let schema = Schema::new(vec![DataType::Int]);
        catalog
            .define_table("t", schema.clone(), vec![0], None)
            .unwrap();
        let router = mk_router(catalog);
        router.start();
        router.stop();
        assert!(router.enqueue_tuple("t", int_tuple(&schema, 1)).is_err());
    }
}
