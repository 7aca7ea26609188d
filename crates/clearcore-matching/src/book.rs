//! Per-instrument book state: sequencing, status transitions, duplicate
//! absorption, and the fatal-halt discipline.
//!
//! [`InstrumentBook`] wraps the raw [`OrderBook`] with everything a
//! single instrument's worker needs to process one command at a time:
//! monotonic sequence assignment, deterministic trade ids, a bounded
//! processed-order cache for at-least-once redelivery, and a halt flag
//! that stops matching permanently once corrupted state is detected.

use std::collections::{HashSet, VecDeque};

use chrono::Utc;
use clearcore_types::{
    ClearcoreError, Instrument, Order, OrderBookUpdated, OrderId, OrderStatus, OrderType,
    OrderUpdate, Result, TradeExecution, TradeId,
};
use rust_decimal::Decimal;

use crate::orderbook::OrderBook;

/// Bounded set of processed order ids with insertion-order eviction.
/// Redelivered submits are absorbed without re-matching.
#[derive(Debug)]
struct ProcessedCache {
    seen: HashSet<OrderId>,
    order: VecDeque<OrderId>,
    max_size: usize,
}

impl ProcessedCache {
    fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "ProcessedCache max_size must be > 0");
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    fn contains(&self, id: &OrderId) -> bool {
        self.seen.contains(id)
    }

    fn insert(&mut self, id: OrderId) {
        if self.seen.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(id);
        self.order.push_back(id);
    }
}

/// Result of a submit command, as seen by the caller.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Accepted {
        order_id: OrderId,
        /// The per-instrument sequence assigned at acceptance.
        sequence: u64,
        status: OrderStatus,
        filled_qty: Decimal,
        remaining_qty: Decimal,
    },
    /// Redelivered command absorbed as a no-op.
    Duplicate { order_id: OrderId },
}

/// Result of a cancel command.
#[derive(Debug, Clone, Copy)]
pub struct CancelOutcome {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// A processed submit: the caller-visible outcome plus the events to
/// publish downstream.
#[derive(Debug)]
pub struct SubmitProcessed {
    pub outcome: SubmitOutcome,
    pub trades: Vec<TradeExecution>,
    pub book_update: Option<OrderBookUpdated>,
}

/// A processed cancel.
#[derive(Debug)]
pub struct CancelProcessed {
    pub outcome: CancelOutcome,
    pub book_update: Option<OrderBookUpdated>,
}

/// All book-mutating state for one instrument. Owned exclusively by the
/// instrument's worker; commands never interleave.
#[derive(Debug)]
pub struct InstrumentBook {
    instrument: Instrument,
    book: OrderBook,
    /// Monotonic order sequence, assigned at acceptance.
    next_sequence: u64,
    /// Monotonic trade sequence; trade ids derive deterministically from it.
    trade_seq: u64,
    processed: ProcessedCache,
    depth_levels: usize,
    halted: bool,
}

impl InstrumentBook {
    #[must_use]
    pub fn new(instrument: Instrument, processed_cache_size: usize, depth_levels: usize) -> Self {
        let book = OrderBook::new(instrument.id);
        Self {
            instrument,
            book,
            next_sequence: 0,
            trade_seq: 0,
            processed: ProcessedCache::new(processed_cache_size),
            depth_levels,
            halted: false,
        }
    }

    #[must_use]
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Whether matching has been halted after an invariant violation.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Number of orders currently resting.
    #[must_use]
    pub fn resting_orders(&self) -> usize {
        self.book.order_count()
    }

    /// Process a submit command: sequence, match, rest or discard the
    /// remainder, and assemble the outbound events.
    ///
    /// # Errors
    /// - [`ClearcoreError::MatchingHalted`] once the book is halted
    /// - [`ClearcoreError::InvariantViolation`] on detected corruption
    ///   (this also halts the book)
    pub fn submit(&mut self, mut order: Order) -> Result<SubmitProcessed> {
        self.check_halted()?;

        if self.processed.contains(&order.id) {
            return Ok(SubmitProcessed {
                outcome: SubmitOutcome::Duplicate { order_id: order.id },
                trades: Vec::new(),
                book_update: None,
            });
        }

        order.set_status(OrderStatus::Submitted)?;
        self.next_sequence += 1;
        order.sequence = self.next_sequence;

        let fills = match self.book.match_incoming(&mut order) {
            Ok(fills) => fills,
            Err(err) => {
                self.halted = true;
                return Err(err);
            }
        };

        let mut trades = Vec::with_capacity(fills.len());
        let mut updates = Vec::with_capacity(fills.len() + 1);
        let executed_at = Utc::now();
        for fill in &fills {
            self.trade_seq += 1;
            trades.push(TradeExecution {
                trade_id: TradeId::deterministic(self.instrument.id, self.trade_seq),
                instrument_id: self.instrument.id,
                maker_order_id: fill.maker_order_id,
                maker_account_id: fill.maker_account_id,
                taker_order_id: order.id,
                taker_account_id: order.account_id,
                price: fill.price,
                quantity: fill.quantity,
                quote_amount: fill.price * fill.quantity,
                taker_side: order.side,
                maker_intent: fill.maker_intent,
                taker_intent: order.intent,
                executed_at,
            });
            updates.push(OrderUpdate {
                order_id: fill.maker_order_id,
                status: fill.maker_status,
                remaining_qty: fill.maker_remaining,
                is_taker: false,
            });
        }

        self.settle_taker(&mut order)?;

        updates.push(OrderUpdate {
            order_id: order.id,
            status: order.status,
            remaining_qty: order.remaining_qty,
            is_taker: true,
        });

        self.processed.insert(order.id);

        let outcome = SubmitOutcome::Accepted {
            order_id: order.id,
            sequence: order.sequence,
            status: order.status,
            filled_qty: order.filled_qty(),
            remaining_qty: order.remaining_qty,
        };

        Ok(SubmitProcessed {
            outcome,
            trades,
            book_update: Some(self.book_update(updates)),
        })
    }

    /// Decide the taker's final status and rest the remainder if it is a
    /// limit order. Market remainders never rest: wholly unfilled market
    /// orders expire, partially filled ones have the remainder cancelled.
    fn settle_taker(&mut self, order: &mut Order) -> Result<()> {
        if order.is_filled() {
            return order.set_status(OrderStatus::Filled);
        }

        let touched = order.remaining_qty < order.quantity;
        match (order.order_type, touched) {
            (OrderType::Limit, true) => {
                order.set_status(OrderStatus::PartialFilled)?;
                self.book.insert_order(order.clone())
            }
            (OrderType::Limit, false) => {
                order.set_status(OrderStatus::Accepted)?;
                self.book.insert_order(order.clone())
            }
            (OrderType::Market, true) => {
                order.set_status(OrderStatus::PartialFilled)?;
                order.set_status(OrderStatus::Cancelled)
            }
            (OrderType::Market, false) => order.set_status(OrderStatus::Expired),
        }
    }

    /// Process a cancel command. Only resting orders cancel; everything
    /// else — unknown id, terminal order, a cancel that raced a fill —
    /// is rejected as not cancellable.
    ///
    /// # Errors
    /// - [`ClearcoreError::MatchingHalted`] once the book is halted
    /// - [`ClearcoreError::OrderNotCancellable`] when the order is not
    ///   resting in this book
    pub fn cancel(&mut self, order_id: OrderId) -> Result<CancelProcessed> {
        self.check_halted()?;

        let mut order = self
            .book
            .remove_order(&order_id)
            .map_err(|_| ClearcoreError::OrderNotCancellable(order_id))?;

        order.set_status(OrderStatus::CancelRequested)?;
        order.set_status(OrderStatus::Cancelled)?;

        let updates = vec![OrderUpdate {
            order_id,
            status: order.status,
            remaining_qty: order.remaining_qty,
            is_taker: false,
        }];

        Ok(CancelProcessed {
            outcome: CancelOutcome {
                order_id,
                status: order.status,
            },
            book_update: Some(self.book_update(updates)),
        })
    }

    fn check_halted(&self) -> Result<()> {
        if self.halted {
            return Err(ClearcoreError::MatchingHalted(self.instrument.id));
        }
        Ok(())
    }

    fn book_update(&self, updates: Vec<OrderUpdate>) -> OrderBookUpdated {
        let (bids, asks) = self.book.depth(self.depth_levels);
        OrderBookUpdated {
            instrument_id: self.instrument.id,
            updates,
            bids,
            asks,
            best_bid: self.book.best_bid(),
            best_ask: self.book.best_ask(),
            mid_price: self.book.mid_price(),
            updated_at: Utc::now(),
        }
    }
}
