//! The per-instance facade: owns the catalog, the router, and the timer,
//! and wires them together.

use crate::ast::Program;
use crate::catalog::{Catalog, TableDef};
use crate::error::Error;
use crate::network::{Network, NullNetwork};
use crate::router::Router;
use crate::schema::Schema;
use crate::timer::Timer;
use crate::tuple::Tuple;
use crossbeam::channel::bounded;
use std::sync::Arc;
use tracing::info;

/// Runtime construction parameters.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// The address this instance answers to. Tuples whose location column
    /// names a different address are handed to the network instead of being
    /// stored.
    pub addr: String,
    /// Work queue slots. A full queue backpressures producers.
    pub queue_capacity: usize,
}

impl RuntimeConfig {
    pub fn with_port(port: u16) -> RuntimeConfig {
        RuntimeConfig {
            addr: format!("localhost:{port}"),
            ..RuntimeConfig::default()
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            addr: "localhost:5000".to_string(),
            queue_capacity: 128,
        }
    }
}

/// One runtime instance. Dropping it shuts the router thread down.
pub struct Runtime {
    catalog: Arc<Catalog>,
    router: Router,
    timer: Arc<Timer>,
}

impl Runtime {
    /// A runtime with no remote peers; tuples for other addresses are
    /// logged and discarded.
    pub fn new(config: RuntimeConfig) -> Runtime {
        Runtime::with_network(config, Arc::new(NullNetwork))
    }

    pub fn with_network(config: RuntimeConfig, network: Arc<dyn Network>) -> Runtime {
        info!("creating runtime at {}", config.addr);
        let catalog = Arc::new(Catalog::new());
        let (sender, receiver) = bounded(config.queue_capacity);
        let timer = Arc::new(Timer::new(catalog.clone(), sender.clone()));
        let router = Router::new(
            catalog.clone(),
            network,
            config.addr.as_str().into(),
            timer.clone(),
            sender,
            receiver,
        );
        Runtime {
            catalog,
            router,
            timer,
        }
    }

    /// Spawns the router thread. Call once before enqueueing work.
    pub fn start(&self) {
        self.router.start();
    }

    /// Drains already-enqueued work, then joins the router thread.
    pub fn stop(&self) {
        self.router.stop();
    }

    pub fn define_table(
        &self,
        name: &str,
        schema: Schema,
        key_cols: Vec<usize>,
        loc_col: Option<usize>,
    ) -> Result<Arc<TableDef>, Error> {
        self.catalog.define_table(name, schema, key_cols, loc_col)
    }

    pub fn delete_table(&self, name: &str) -> Result<(), Error> {
        self.catalog.delete_table(name)
    }

    /// Plans and installs a program on the calling thread, all-or-nothing
    /// with respect to planning errors. Intended for setup before `start`
    /// or from the router thread; while the router runs, prefer
    /// [`enqueue_program`](Self::enqueue_program).
    pub fn install(&self, program: &Program) -> Result<(), Error> {
        self.router.shared().install_program(program)
    }

    /// Hands a program to the router thread for installation.
    pub fn enqueue_program(&self, program: Program) -> Result<(), Error> {
        self.router.enqueue_program(program)
    }

    /// Enqueues a tuple for routing under the named relation. Blocks while
    /// the work queue is full.
    pub fn enqueue_tuple(&self, table: &str, tuple: Tuple) -> Result<(), Error> {
        self.router.enqueue_tuple(table, tuple)
    }

    /// Total count of tuples the router has applied and dispatched.
    pub fn tuples_routed(&self) -> u64 {
        self.router.tuples_routed()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.router.stop();
    }
}
