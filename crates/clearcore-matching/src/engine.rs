//! The matching engine: one dedicated worker per instrument.
//!
//! Book-mutating operations for a single instrument are linearized by
//! routing every command through that instrument's mailbox; the worker
//! thread owns the book outright and processes commands one at a time.
//! Different instruments run fully in parallel. Nothing inside a worker
//! performs I/O — trade executions and book deltas are handed off through
//! the outbound event channel and consumed asynchronously by the ledger
//! and the position projection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use clearcore_types::{
    CancelOrder, ClearcoreError, EngineConfig, EngineEvent, Instrument, InstrumentId, Order,
    OrderId, OrderType, Result, SubmitOrder,
};
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

use crate::book::{CancelOutcome, InstrumentBook, SubmitOutcome};
use crate::registry::InstrumentRegistry;
use crate::risk::RiskPrecheck;

/// Commands delivered to an instrument worker's mailbox.
enum Command {
    Submit {
        order: Order,
        reply: Sender<Result<SubmitOutcome>>,
    },
    Cancel {
        order_id: OrderId,
        reply: Sender<Result<CancelOutcome>>,
    },
}

struct WorkerHandle {
    mailbox: Sender<Command>,
    join: JoinHandle<()>,
}

/// Bounded order-id → instrument routing map with insertion-order
/// eviction. Cancels carry only an order id, so the engine remembers
/// where each accepted order went.
struct RoutingCache {
    map: HashMap<OrderId, InstrumentId>,
    order: VecDeque<OrderId>,
    max_size: usize,
}

impl RoutingCache {
    fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "RoutingCache max_size must be > 0");
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    fn insert(&mut self, order_id: OrderId, instrument: InstrumentId) {
        if !self.map.contains_key(&order_id) {
            if self.map.len() >= self.max_size {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
            self.order.push_back(order_id);
        }
        self.map.insert(order_id, instrument);
    }

    fn get(&self, order_id: &OrderId) -> Option<InstrumentId> {
        self.map.get(order_id).copied()
    }
}

/// The matching engine façade: validation, routing, and worker lifecycle.
pub struct MatchingEngine {
    config: EngineConfig,
    registry: Arc<InstrumentRegistry>,
    risk: Arc<dyn RiskPrecheck>,
    workers: Mutex<HashMap<InstrumentId, WorkerHandle>>,
    routing: RwLock<RoutingCache>,
    events_tx: Sender<EngineEvent>,
}

impl MatchingEngine {
    /// Create an engine and the receiving end of its outbound event feed.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        registry: Arc<InstrumentRegistry>,
        risk: Arc<dyn RiskPrecheck>,
    ) -> (Self, Receiver<EngineEvent>) {
        let (events_tx, events_rx) = bounded(config.event_channel_capacity);
        let routing = RwLock::new(RoutingCache::new(config.routing_cache_size));
        (
            Self {
                config,
                registry,
                risk,
                workers: Mutex::new(HashMap::new()),
                routing,
                events_tx,
            },
            events_rx,
        )
    }

    /// Register an instrument and spawn its worker if not yet running.
    ///
    /// # Errors
    /// Returns [`ClearcoreError::Internal`] if the worker thread cannot
    /// be spawned.
    pub fn start_instrument(&self, instrument: Instrument) -> Result<()> {
        let id = instrument.id;
        self.registry.register(instrument.clone());

        let mut workers = self.workers.lock();
        if workers.contains_key(&id) {
            return Ok(());
        }

        let (mailbox_tx, mailbox_rx) = bounded(self.config.mailbox_capacity);
        let book = InstrumentBook::new(
            instrument,
            self.config.processed_cache_size,
            self.config.depth_levels,
        );
        let events_tx = self.events_tx.clone();
        let join = thread::Builder::new()
            .name(format!("matching-{}", id.0))
            .spawn(move || run_worker(book, &mailbox_rx, &events_tx))
            .map_err(|e| ClearcoreError::Internal(format!("spawn worker for {id}: {e}")))?;

        tracing::info!(instrument = %id, "Instrument worker started");
        workers.insert(
            id,
            WorkerHandle {
                mailbox: mailbox_tx,
                join,
            },
        );
        Ok(())
    }

    /// Submit an order.
    ///
    /// Validation and the external risk pre-check run on the caller's
    /// thread; on success the command is linearized through the
    /// instrument's mailbox and the call blocks until the worker replies.
    ///
    /// # Errors
    /// Validation failures ([`ClearcoreError::InvalidOrder`],
    /// [`ClearcoreError::UnknownInstrument`],
    /// [`ClearcoreError::InstrumentNotTradable`],
    /// [`ClearcoreError::AccountSuspended`]) reject the command without
    /// touching any book.
    pub fn submit(&self, cmd: &SubmitOrder) -> Result<SubmitOutcome> {
        self.validate(cmd)?;

        let order = Order::new(
            cmd.account_id,
            cmd.instrument_id,
            cmd.side,
            cmd.order_type,
            cmd.price,
            cmd.quantity,
            cmd.intent,
        );

        // Route before dispatch so a racing cancel can find the order.
        self.routing.write().insert(order.id, cmd.instrument_id);

        let (reply_tx, reply_rx) = bounded(1);
        self.dispatch(
            cmd.instrument_id,
            Command::Submit {
                order,
                reply: reply_tx,
            },
        )?;
        reply_rx
            .recv()
            .map_err(|_| ClearcoreError::WorkerUnavailable(cmd.instrument_id))?
    }

    /// Cancel a resting order.
    ///
    /// # Errors
    /// Returns [`ClearcoreError::OrderNotCancellable`] when the order is
    /// unknown, already terminal, or lost the race against matching.
    pub fn cancel(&self, cmd: &CancelOrder) -> Result<CancelOutcome> {
        let Some(instrument_id) = self.routing.read().get(&cmd.order_id) else {
            return Err(ClearcoreError::OrderNotCancellable(cmd.order_id));
        };

        let (reply_tx, reply_rx) = bounded(1);
        self.dispatch(
            instrument_id,
            Command::Cancel {
                order_id: cmd.order_id,
                reply: reply_tx,
            },
        )?;
        reply_rx
            .recv()
            .map_err(|_| ClearcoreError::WorkerUnavailable(instrument_id))?
    }

    /// Stop all workers and wait for them to drain.
    pub fn shutdown(&self) {
        let workers: Vec<(InstrumentId, WorkerHandle)> =
            self.workers.lock().drain().collect();
        for (id, handle) in workers {
            drop(handle.mailbox);
            if handle.join.join().is_err() {
                tracing::warn!(instrument = %id, "Instrument worker panicked during shutdown");
            }
        }
    }

    fn dispatch(&self, instrument: InstrumentId, command: Command) -> Result<()> {
        let workers = self.workers.lock();
        let handle = workers
            .get(&instrument)
            .ok_or(ClearcoreError::WorkerUnavailable(instrument))?;
        handle
            .mailbox
            .send(command)
            .map_err(|_| ClearcoreError::WorkerUnavailable(instrument))
    }

    fn validate(&self, cmd: &SubmitOrder) -> Result<()> {
        if cmd.quantity <= Decimal::ZERO {
            return Err(ClearcoreError::InvalidOrder {
                reason: "quantity must be positive".to_string(),
            });
        }
        match (cmd.order_type, cmd.price) {
            (OrderType::Limit, None) => {
                return Err(ClearcoreError::InvalidOrder {
                    reason: "limit orders require a price".to_string(),
                });
            }
            (OrderType::Limit, Some(price)) if price <= Decimal::ZERO => {
                return Err(ClearcoreError::InvalidOrder {
                    reason: "limit price must be positive".to_string(),
                });
            }
            (OrderType::Market, Some(_)) => {
                return Err(ClearcoreError::InvalidOrder {
                    reason: "market orders must not carry a price".to_string(),
                });
            }
            _ => {}
        }

        let instrument = self
            .registry
            .get(cmd.instrument_id)
            .ok_or(ClearcoreError::UnknownInstrument(cmd.instrument_id))?;
        if !instrument.tradable {
            return Err(ClearcoreError::InstrumentNotTradable(cmd.instrument_id));
        }

        if !self
            .risk
            .validate(cmd.account_id, cmd.instrument_id, cmd.order_type)
        {
            return Err(ClearcoreError::AccountSuspended(cmd.account_id));
        }
        Ok(())
    }
}

/// Worker loop: drain the mailbox until every sender is gone. All book
/// mutations for the instrument happen here, one command at a time.
fn run_worker(mut book: InstrumentBook, mailbox: &Receiver<Command>, events: &Sender<EngineEvent>) {
    let instrument = book.instrument().id;
    while let Ok(command) = mailbox.recv() {
        match command {
            Command::Submit { order, reply } => {
                let order_id = order.id;
                match book.submit(order) {
                    Ok(processed) => {
                        for trade in processed.trades {
                            tracing::debug!(
                                trade_id = %trade.trade_id,
                                maker = %trade.maker_order_id,
                                taker = %trade.taker_order_id,
                                price = %trade.price,
                                qty = %trade.quantity,
                                "Trade executed"
                            );
                            let _ = events.send(EngineEvent::TradeExecuted(trade));
                        }
                        if let Some(update) = processed.book_update {
                            let _ = events.send(EngineEvent::BookUpdated(update));
                        }
                        let _ = reply.send(Ok(processed.outcome));
                    }
                    Err(err) => {
                        if book.is_halted() {
                            tracing::error!(
                                instrument = %instrument,
                                order = %order_id,
                                error = %err,
                                "Matching halted after invariant violation"
                            );
                        }
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::Cancel { order_id, reply } => match book.cancel(order_id) {
                Ok(processed) => {
                    tracing::debug!(instrument = %instrument, order = %order_id, "Order cancelled");
                    if let Some(update) = processed.book_update {
                        let _ = events.send(EngineEvent::BookUpdated(update));
                    }
                    let _ = reply.send(Ok(processed.outcome));
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
        }
    }
    tracing::info!(instrument = %instrument, "Instrument worker stopped");
}
