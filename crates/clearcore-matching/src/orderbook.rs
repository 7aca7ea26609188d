//! The order book for a single instrument.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids** (buys): `BTreeMap<Reverse<Decimal>, PriceLevel>` -- highest price first
//! - **Asks** (sells): `BTreeMap<Decimal, PriceLevel>` -- lowest price first
//!
//! An auxiliary `HashMap<OrderId, (Side, Price)>` enables O(log N)
//! cancellation. Matching is continuous price-time priority: an incoming
//! order walks the best opposing levels while it crosses, filling FIFO
//! within each level, and every fill prints at the maker's resting price.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use clearcore_types::{
    AccountId, BookLevel, ClearcoreError, InstrumentId, Order, OrderId, OrderSide, OrderStatus,
    PositionIntent, Result,
};
use rust_decimal::Decimal;

use crate::price_level::PriceLevel;

/// One fill against a resting maker order, as produced by
/// [`OrderBook::match_incoming`]. The caller turns fills into
/// `TradeExecution`s once trade sequence numbers are assigned.
#[derive(Debug, Clone)]
pub struct Fill {
    pub maker_order_id: OrderId,
    pub maker_account_id: AccountId,
    pub maker_intent: PositionIntent,
    /// The maker's resting price — the execution price.
    pub price: Decimal,
    pub quantity: Decimal,
    pub maker_remaining: Decimal,
    pub maker_status: OrderStatus,
}

/// The order book for a single instrument.
#[derive(Debug)]
pub struct OrderBook {
    /// The instrument this book serves.
    pub instrument_id: InstrumentId,
    /// Buy side: highest price first (`Reverse` key).
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    /// Sell side: lowest price first.
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Fast lookup: `OrderId -> (side, price)` for O(log N) cancel.
    index: HashMap<OrderId, (OrderSide, Decimal)>,
}

impl OrderBook {
    /// Create a new empty order book for the given instrument.
    #[must_use]
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    // =================================================================
    // Matching
    // =================================================================

    /// Match an incoming order against the opposing side.
    ///
    /// Walks best-first price levels while the taker crosses and has
    /// remaining quantity. Within a level, makers fill FIFO (lowest
    /// sequence first) and keep their sequence on partial fill. Filled
    /// makers are removed; the taker is **not** inserted — resting a
    /// remainder is the caller's decision.
    ///
    /// # Errors
    /// Returns [`ClearcoreError::InvariantViolation`] if corrupted book
    /// state is detected (zero-quantity resting order, index mismatch).
    pub fn match_incoming(&mut self, taker: &mut Order) -> Result<Vec<Fill>> {
        let mut fills = Vec::new();

        while taker.remaining_qty > Decimal::ZERO {
            let Some(best) = self.best_opposing(taker.side) else {
                break;
            };
            if !taker.crosses(best) {
                break;
            }
            let Some(fill) = self.fill_at_best(taker)? else {
                break;
            };
            fills.push(fill);
        }

        Ok(fills)
    }

    /// Fill the taker against the front maker of the best opposing level.
    fn fill_at_best(&mut self, taker: &mut Order) -> Result<Option<Fill>> {
        let instrument = self.instrument_id;

        // The two sides have different key types, so each arm resolves
        // its own best level before the shared fill logic runs.
        let (price, level) = match taker.side {
            OrderSide::Buy => {
                let Some(entry) = self.asks.iter_mut().next() else {
                    return Ok(None);
                };
                (*entry.0, entry.1)
            }
            OrderSide::Sell => {
                let Some(entry) = self.bids.iter_mut().next() else {
                    return Ok(None);
                };
                (entry.0.0, entry.1)
            }
        };

        let Some(maker) = level.front_mut() else {
            return Err(ClearcoreError::InvariantViolation {
                instrument,
                reason: format!("empty price level left in book at {price}"),
            });
        };

        if maker.remaining_qty <= Decimal::ZERO {
            return Err(ClearcoreError::InvariantViolation {
                instrument,
                reason: format!("resting order {} has no remaining quantity", maker.id),
            });
        }

        let fill_qty = taker.remaining_qty.min(maker.remaining_qty);
        maker.remaining_qty -= fill_qty;
        taker.remaining_qty -= fill_qty;

        let maker_status = if maker.remaining_qty.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartialFilled
        };
        if maker.status != maker_status {
            maker.set_status(maker_status)?;
        }

        let fill = Fill {
            maker_order_id: maker.id,
            maker_account_id: maker.account_id,
            maker_intent: maker.intent,
            price,
            quantity: fill_qty,
            maker_remaining: maker.remaining_qty,
            maker_status,
        };

        if maker_status == OrderStatus::Filled {
            let maker_id = fill.maker_order_id;
            level.pop_front();
            let empty = level.is_empty();
            if self.index.remove(&maker_id).is_none() {
                return Err(ClearcoreError::InvariantViolation {
                    instrument,
                    reason: format!("filled order {maker_id} missing from index"),
                });
            }
            if empty {
                match taker.side {
                    OrderSide::Buy => {
                        self.asks.remove(&price);
                    }
                    OrderSide::Sell => {
                        self.bids.remove(&Reverse(price));
                    }
                }
            }
        }

        Ok(Some(fill))
    }

    // =================================================================
    // Insertion
    // =================================================================

    /// Rest an order in the book at its limit price.
    ///
    /// # Errors
    /// - [`ClearcoreError::DuplicateOrder`] if the id is already resting
    /// - [`ClearcoreError::InvalidOrder`] if the order has no price
    ///   (market orders never rest)
    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        if self.index.contains_key(&order.id) {
            return Err(ClearcoreError::DuplicateOrder(order.id));
        }
        let Some(price) = order.price else {
            return Err(ClearcoreError::InvalidOrder {
                reason: format!("order {} cannot rest without a price", order.id),
            });
        };

        self.index.insert(order.id, (order.side, price));
        match order.side {
            OrderSide::Buy => {
                self.bids
                    .entry(Reverse(price))
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order);
            }
            OrderSide::Sell => {
                self.asks
                    .entry(price)
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order);
            }
        }
        Ok(())
    }

    // =================================================================
    // Cancellation
    // =================================================================

    /// Remove an order by ID. Returns the removed order.
    ///
    /// # Errors
    /// Returns [`ClearcoreError::OrderNotFound`] if the order is not
    /// resting in this book.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Result<Order> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or(ClearcoreError::OrderNotFound(*order_id))?;

        let order = match side {
            OrderSide::Buy => {
                let level = self
                    .bids
                    .get_mut(&Reverse(price))
                    .ok_or(ClearcoreError::OrderNotFound(*order_id))?;
                let order = level
                    .remove_order(order_id)
                    .ok_or(ClearcoreError::OrderNotFound(*order_id))?;
                if level.is_empty() {
                    self.bids.remove(&Reverse(price));
                }
                order
            }
            OrderSide::Sell => {
                let level = self
                    .asks
                    .get_mut(&price)
                    .ok_or(ClearcoreError::OrderNotFound(*order_id))?;
                let order = level
                    .remove_order(order_id)
                    .ok_or(ClearcoreError::OrderNotFound(*order_id))?;
                if level.is_empty() {
                    self.asks.remove(&price);
                }
                order
            }
        };

        Ok(order)
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Best (highest) bid price, or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|r| r.0)
    }

    /// Best (lowest) ask price, or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Best price on the side an incoming `side` order would match.
    #[must_use]
    pub fn best_opposing(&self, side: OrderSide) -> Option<Decimal> {
        match side {
            OrderSide::Buy => self.best_ask(),
            OrderSide::Sell => self.best_bid(),
        }
    }

    /// Mid price = (best_bid + best_ask) / 2. `None` if either side is empty.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Top-of-book aggregated depth, best first, zero-quantity levels
    /// skipped.
    #[must_use]
    pub fn depth(&self, levels: usize) -> (Vec<BookLevel>, Vec<BookLevel>) {
        fn collect<'a>(
            iter: impl Iterator<Item = &'a PriceLevel>,
            levels: usize,
        ) -> Vec<BookLevel> {
            iter.map(|level| BookLevel {
                price: level.price,
                quantity: level.total_quantity(),
            })
            .filter(|l| l.quantity > Decimal::ZERO)
            .take(levels)
            .collect()
        }
        (
            collect(self.bids.values(), levels),
            collect(self.asks.values(), levels),
        )
    }

    /// Total number of orders currently resting in the book.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the book has no orders on either side.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Check if an order is resting in the book.
    #[must_use]
    pub fn contains_order(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    /// Immutable view of a resting order.
    #[must_use]
    pub fn get_order(&self, order_id: &OrderId) -> Option<&Order> {
        let (side, price) = self.index.get(order_id)?;
        let level = match side {
            OrderSide::Buy => self.bids.get(&Reverse(*price))?,
            OrderSide::Sell => self.asks.get(price)?,
        };
        level.orders.iter().find(|o| o.id == *order_id)
    }
}

#[cfg(test)]
mod tests {
    use clearcore_types::*;
    use rust_decimal::Decimal;

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn resting(side: OrderSide, price: Decimal, qty: Decimal, seq: u64) -> Order {
        let mut order = Order::dummy_limit(side, price, qty);
        order.status = OrderStatus::Accepted;
        order.sequence = seq;
        order
    }

    #[test]
    fn insert_and_query_best_bid_ask() {
        let mut book = OrderBook::new(InstrumentId(1));

        book.insert_order(resting(OrderSide::Buy, dec(100), Decimal::ONE, 1))
            .unwrap();
        book.insert_order(resting(OrderSide::Buy, dec(99), Decimal::ONE, 2))
            .unwrap();
        book.insert_order(resting(OrderSide::Sell, dec(101), Decimal::ONE, 3))
            .unwrap();
        book.insert_order(resting(OrderSide::Sell, dec(102), Decimal::ONE, 4))
            .unwrap();

        assert_eq!(book.best_bid(), Some(dec(100)));
        assert_eq!(book.best_ask(), Some(dec(101)));
        assert_eq!(book.mid_price(), Some(Decimal::new(1015, 1)));
        assert_eq!(book.order_count(), 4);
    }

    #[test]
    fn match_fills_at_maker_price() {
        let mut book = OrderBook::new(InstrumentId(1));
        book.insert_order(resting(OrderSide::Sell, dec(100), dec(5), 1))
            .unwrap();

        // Taker willing to pay 105 still prints at the resting 100.
        let mut taker = Order::dummy_limit(OrderSide::Buy, dec(105), dec(5));
        taker.status = OrderStatus::Submitted;
        let fills = book.match_incoming(&mut taker).unwrap();

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, dec(100));
        assert_eq!(fills[0].quantity, dec(5));
        assert_eq!(fills[0].maker_status, OrderStatus::Filled);
        assert!(taker.is_filled());
        assert!(book.is_empty());
    }

    #[test]
    fn partial_fill_keeps_maker_resting() {
        let mut book = OrderBook::new(InstrumentId(1));
        let maker = resting(OrderSide::Buy, dec(100), dec(10), 1);
        let maker_id = maker.id;
        book.insert_order(maker).unwrap();

        let mut taker = Order::dummy_limit(OrderSide::Sell, dec(100), dec(4));
        taker.status = OrderStatus::Submitted;
        let fills = book.match_incoming(&mut taker).unwrap();

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, dec(4));
        assert_eq!(fills[0].maker_remaining, dec(6));
        assert_eq!(fills[0].maker_status, OrderStatus::PartialFilled);

        let still_resting = book.get_order(&maker_id).unwrap();
        assert_eq!(still_resting.remaining_qty, dec(6));
        assert_eq!(still_resting.sequence, 1, "time priority preserved");
    }

    #[test]
    fn no_cross_no_fill() {
        let mut book = OrderBook::new(InstrumentId(1));
        book.insert_order(resting(OrderSide::Sell, dec(101), Decimal::ONE, 1))
            .unwrap();

        let mut taker = Order::dummy_limit(OrderSide::Buy, dec(100), Decimal::ONE);
        taker.status = OrderStatus::Submitted;
        let fills = book.match_incoming(&mut taker).unwrap();

        assert!(fills.is_empty());
        assert_eq!(taker.remaining_qty, Decimal::ONE);
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn fifo_within_level() {
        let mut book = OrderBook::new(InstrumentId(1));
        let first = resting(OrderSide::Sell, dec(100), dec(2), 1);
        let second = resting(OrderSide::Sell, dec(100), dec(2), 2);
        let first_id = first.id;
        let second_id = second.id;
        book.insert_order(first).unwrap();
        book.insert_order(second).unwrap();

        let mut taker = Order::dummy_limit(OrderSide::Buy, dec(100), dec(3));
        taker.status = OrderStatus::Submitted;
        let fills = book.match_incoming(&mut taker).unwrap();

        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].maker_order_id, first_id, "lower sequence first");
        assert_eq!(fills[0].quantity, dec(2));
        assert_eq!(fills[1].maker_order_id, second_id);
        assert_eq!(fills[1].quantity, Decimal::ONE);
    }

    #[test]
    fn walks_levels_best_first() {
        let mut book = OrderBook::new(InstrumentId(1));
        book.insert_order(resting(OrderSide::Sell, dec(102), dec(1), 1))
            .unwrap();
        book.insert_order(resting(OrderSide::Sell, dec(100), dec(1), 2))
            .unwrap();
        book.insert_order(resting(OrderSide::Sell, dec(101), dec(1), 3))
            .unwrap();

        let mut taker = Order::dummy_limit(OrderSide::Buy, dec(103), dec(3));
        taker.status = OrderStatus::Submitted;
        let fills = book.match_incoming(&mut taker).unwrap();

        let prices: Vec<Decimal> = fills.iter().map(|f| f.price).collect();
        assert_eq!(prices, vec![dec(100), dec(101), dec(102)]);
        assert!(book.is_empty());
    }

    #[test]
    fn market_order_consumes_all_liquidity() {
        let mut book = OrderBook::new(InstrumentId(1));
        book.insert_order(resting(OrderSide::Sell, dec(100), dec(1), 1))
            .unwrap();
        book.insert_order(resting(OrderSide::Sell, dec(150), dec(1), 2))
            .unwrap();

        let mut taker = Order::dummy_market(OrderSide::Buy, dec(5));
        taker.status = OrderStatus::Submitted;
        let fills = book.match_incoming(&mut taker).unwrap();

        assert_eq!(fills.len(), 2);
        assert_eq!(taker.remaining_qty, dec(3), "book exhausted, remainder left");
        assert!(book.is_empty());
    }

    #[test]
    fn remove_order_from_book() {
        let mut book = OrderBook::new(InstrumentId(1));
        let order = resting(OrderSide::Buy, dec(100), Decimal::ONE, 1);
        let id = order.id;

        book.insert_order(order).unwrap();
        assert_eq!(book.order_count(), 1);

        let removed = book.remove_order(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(book.is_empty());
    }

    #[test]
    fn remove_nonexistent_order() {
        let mut book = OrderBook::new(InstrumentId(1));
        let result = book.remove_order(&OrderId::new());
        assert!(matches!(result, Err(ClearcoreError::OrderNotFound(_))));
    }

    #[test]
    fn duplicate_order_rejected() {
        let mut book = OrderBook::new(InstrumentId(1));
        let order = resting(OrderSide::Buy, dec(100), Decimal::ONE, 1);
        let dup = order.clone();

        book.insert_order(order).unwrap();
        let result = book.insert_order(dup);
        assert!(matches!(result, Err(ClearcoreError::DuplicateOrder(_))));
    }

    #[test]
    fn market_order_cannot_rest() {
        let mut book = OrderBook::new(InstrumentId(1));
        let order = Order::dummy_market(OrderSide::Buy, Decimal::ONE);
        let result = book.insert_order(order);
        assert!(matches!(result, Err(ClearcoreError::InvalidOrder { .. })));
    }

    #[test]
    fn depth_aggregates_levels() {
        let mut book = OrderBook::new(InstrumentId(1));
        book.insert_order(resting(OrderSide::Buy, dec(100), dec(2), 1))
            .unwrap();
        book.insert_order(resting(OrderSide::Buy, dec(100), dec(3), 2))
            .unwrap();
        book.insert_order(resting(OrderSide::Buy, dec(99), dec(1), 3))
            .unwrap();
        book.insert_order(resting(OrderSide::Sell, dec(101), dec(4), 4))
            .unwrap();

        let (bids, asks) = book.depth(10);
        assert_eq!(
            bids,
            vec![
                BookLevel {
                    price: dec(100),
                    quantity: dec(5)
                },
                BookLevel {
                    price: dec(99),
                    quantity: Decimal::ONE
                },
            ]
        );
        assert_eq!(asks.len(), 1);
        assert_eq!(asks[0].quantity, dec(4));
    }

    #[test]
    fn depth_respects_level_limit() {
        let mut book = OrderBook::new(InstrumentId(1));
        for (i, price) in [100, 99, 98, 97].iter().enumerate() {
            book.insert_order(resting(
                OrderSide::Buy,
                dec(*price),
                Decimal::ONE,
                i as u64 + 1,
            ))
            .unwrap();
        }
        let (bids, _) = book.depth(2);
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].price, dec(100));
        assert_eq!(bids[1].price, dec(99));
    }

    #[test]
    fn empty_book() {
        let book = OrderBook::new(InstrumentId(1));
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.mid_price(), None);
    }
}
