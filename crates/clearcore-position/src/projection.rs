//! The position & mark-price projection.
//!
//! Consumes trade executions and mark-price ticks, maintains
//! per-(account, instrument) position state, and emits one
//! [`PositionEvent`] per mutation for the external risk/liquidation
//! service. Every inbound event is filtered against the projection's own
//! applied-event record before touching state, so redelivery is a no-op
//! and the relative order against the ledger consumer is irrelevant.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use clearcore_types::{
    AccountId, ClearcoreError, InstrumentId, LiquidationSignal, MarkPriceUpdate, OrderSide,
    PositionEvent, PositionEventType, PositionIntent, Result, TradeExecution, constants,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::applied::AppliedSet;
use crate::position::Position;

type PositionKey = (AccountId, InstrumentId);

/// Projection state: positions, per-instrument mark prices, and the
/// applied-event record.
pub struct PositionProjection {
    positions: Mutex<HashMap<PositionKey, Position>>,
    mark_prices: Mutex<HashMap<InstrumentId, Decimal>>,
    applied: Mutex<AppliedSet>,
}

impl PositionProjection {
    #[must_use]
    pub fn new() -> Self {
        Self {
            positions: Mutex::new(HashMap::new()),
            mark_prices: Mutex::new(HashMap::new()),
            applied: Mutex::new(AppliedSet::new(constants::POSITION_APPLIED_LOG_SIZE)),
        }
    }

    /// Current position snapshot, if one was ever opened.
    #[must_use]
    pub fn position(&self, account: AccountId, instrument: InstrumentId) -> Option<Position> {
        self.positions.lock().get(&(account, instrument)).cloned()
    }

    /// Last applied mark price for an instrument.
    #[must_use]
    pub fn mark_price(&self, instrument: InstrumentId) -> Option<Decimal> {
        self.mark_prices.lock().get(&instrument).copied()
    }

    /// Apply one trade execution to both parties' positions, exactly
    /// once per trade id. Returns the emitted events; a replay returns
    /// none.
    ///
    /// # Errors
    /// Returns [`ClearcoreError::PositionInvariantViolation`] if a
    /// mutation would corrupt reservation accounting.
    pub fn apply_trade(&self, trade: &TradeExecution) -> Result<Vec<PositionEvent>> {
        let mut applied = self.applied.lock();
        if applied.contains(&trade.trade_id.0) {
            tracing::debug!(trade_id = %trade.trade_id, "Trade already projected, replay absorbed");
            return Ok(Vec::new());
        }

        let mark = self
            .mark_prices
            .lock()
            .get(&trade.instrument_id)
            .copied();

        let mut positions = self.positions.lock();
        let mut events = Vec::new();

        let taker = positions
            .entry((trade.taker_account_id, trade.instrument_id))
            .or_insert_with(|| Position::flat(trade.taker_account_id, trade.instrument_id));
        events.extend(apply_fill(
            taker,
            trade.taker_side,
            trade.taker_intent,
            trade.price,
            trade.quantity,
            mark,
            trade.trade_id.0,
            trade.executed_at,
        )?);

        let maker = positions
            .entry((trade.maker_account_id, trade.instrument_id))
            .or_insert_with(|| Position::flat(trade.maker_account_id, trade.instrument_id));
        events.extend(apply_fill(
            maker,
            trade.taker_side.opposite(),
            trade.maker_intent,
            trade.price,
            trade.quantity,
            mark,
            trade.trade_id.0,
            trade.executed_at,
        )?);

        applied.insert(trade.trade_id.0);
        tracing::debug!(
            trade_id = %trade.trade_id,
            instrument = %trade.instrument_id,
            events = events.len(),
            "Trade projected"
        );
        Ok(events)
    }

    /// Hold quantity against a pending reduce/close intent.
    ///
    /// # Errors
    /// - [`ClearcoreError::InvalidAmount`] for non-positive quantity or
    ///   an increase intent
    /// - [`ClearcoreError::PositionNotFound`] when nothing is open
    /// - [`ClearcoreError::InsufficientAvailable`] when the unreserved
    ///   remainder is too small
    pub fn reserve(
        &self,
        account: AccountId,
        instrument: InstrumentId,
        quantity: Decimal,
        intent: PositionIntent,
    ) -> Result<PositionEvent> {
        if quantity <= Decimal::ZERO {
            return Err(ClearcoreError::InvalidAmount {
                reason: format!("reservation quantity must be positive, got {quantity}"),
            });
        }
        if intent == PositionIntent::Increase {
            return Err(ClearcoreError::InvalidAmount {
                reason: "reservation requires a reduce or close intent".to_string(),
            });
        }

        let mut positions = self.positions.lock();
        let position = positions
            .get_mut(&(account, instrument))
            .filter(|p| !p.is_flat())
            .ok_or(ClearcoreError::PositionNotFound {
                account,
                instrument,
            })?;

        let available = position.available_to_close();
        if available < quantity {
            return Err(ClearcoreError::InsufficientAvailable {
                requested: quantity,
                available,
            });
        }

        position.reserved_qty += quantity;
        position.last_intent = intent;
        position.updated_at = Utc::now();
        position.check_invariants()?;

        tracing::debug!(
            account = %account,
            instrument = %instrument,
            %quantity,
            reserved = %position.reserved_qty,
            "Quantity reserved for close"
        );
        Ok(make_event(
            position,
            PositionEventType::PositionReserved,
            Decimal::ZERO,
            None,
            position.updated_at,
        ))
    }

    /// Apply a mark-price tick, exactly once per tick id. Emits one
    /// `MARK_PRICE_UPDATED` per open position on the instrument, and
    /// nothing at all when the price did not change.
    pub fn apply_mark_price(&self, update: &MarkPriceUpdate) -> Result<Vec<PositionEvent>> {
        let mut applied = self.applied.lock();
        if applied.contains(&update.tick_id.0) {
            tracing::debug!(tick = %update.tick_id, "Tick already applied, replay absorbed");
            return Ok(Vec::new());
        }
        applied.insert(update.tick_id.0);

        let previous = self
            .mark_prices
            .lock()
            .insert(update.instrument_id, update.mark_price);
        if previous == Some(update.mark_price) {
            tracing::debug!(
                instrument = %update.instrument_id,
                price = %update.mark_price,
                "Unchanged mark price suppressed"
            );
            return Ok(Vec::new());
        }

        let mut positions = self.positions.lock();
        let mut events = Vec::new();
        for ((_, instrument), position) in positions.iter_mut() {
            if *instrument != update.instrument_id || position.is_flat() {
                continue;
            }
            position.last_mark_price = Some(update.mark_price);
            position.updated_at = update.calculated_at;
            events.push(make_event(
                position,
                PositionEventType::MarkPriceUpdated,
                Decimal::ZERO,
                Some(update.tick_id.0),
                update.calculated_at,
            ));
        }

        tracing::debug!(
            instrument = %update.instrument_id,
            price = %update.mark_price,
            positions = events.len(),
            "Mark price applied"
        );
        Ok(events)
    }

    /// Consume an external liquidation signal: force a close-equivalent
    /// transition on the targeted position. A stale signal for a flat or
    /// unknown position is absorbed with a warning.
    pub fn apply_liquidation(&self, signal: &LiquidationSignal) -> Result<Vec<PositionEvent>> {
        let mut applied = self.applied.lock();
        if applied.contains(&signal.event_id) {
            return Ok(Vec::new());
        }
        applied.insert(signal.event_id);

        let mut positions = self.positions.lock();
        let Some(position) = positions
            .get_mut(&(signal.account_id, signal.instrument_id))
            .filter(|p| !p.is_flat())
        else {
            tracing::warn!(
                account = %signal.account_id,
                instrument = %signal.instrument_id,
                "Liquidation signal for flat or unknown position ignored"
            );
            return Ok(Vec::new());
        };

        let delta = -position.quantity;
        position.quantity = Decimal::ZERO;
        position.reserved_qty = Decimal::ZERO;
        position.last_intent = PositionIntent::Close;
        position.last_mark_price = Some(signal.mark_price);
        position.updated_at = signal.occurred_at;
        position.check_invariants()?;

        tracing::warn!(
            account = %signal.account_id,
            instrument = %signal.instrument_id,
            closed = %delta.abs(),
            mark = %signal.mark_price,
            "Liquidation forced position close"
        );
        Ok(vec![make_event(
            position,
            PositionEventType::LiquidationTriggered,
            delta,
            Some(signal.event_id),
            signal.occurred_at,
        )])
    }
}

impl Default for PositionProjection {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply one fill to one party's position, emitting one event per
/// mutation (a fill that flips direction closes then reopens, so it
/// emits two).
#[allow(clippy::too_many_arguments)]
fn apply_fill(
    position: &mut Position,
    side: OrderSide,
    intent: PositionIntent,
    price: Decimal,
    quantity: Decimal,
    mark: Option<Decimal>,
    reference: Uuid,
    as_of: DateTime<Utc>,
) -> Result<Vec<PositionEvent>> {
    let mut events = Vec::new();
    let signed = match side {
        OrderSide::Buy => quantity,
        OrderSide::Sell => -quantity,
    };

    if position.is_flat() {
        position.quantity = signed;
        position.avg_entry_price = price;
        events.push(make_event(
            position,
            PositionEventType::PositionOpened,
            signed,
            Some(reference),
            as_of,
        ));
    } else if position.quantity.is_sign_positive() == signed.is_sign_positive() {
        position.avg_entry_price = position.weighted_entry_price(price, quantity);
        position.quantity += signed;
        events.push(make_event(
            position,
            PositionEventType::PositionIncreased,
            signed,
            Some(reference),
            as_of,
        ));
    } else {
        // Opposing direction: consume reservation first, then size.
        let open_abs = position.abs_quantity();
        let matched = open_abs.min(quantity);
        let sign = if position.quantity.is_sign_positive() {
            Decimal::ONE
        } else {
            -Decimal::ONE
        };

        position.reserved_qty = (position.reserved_qty - matched).max(Decimal::ZERO);
        position.quantity -= sign * matched;

        if position.is_flat() {
            position.reserved_qty = Decimal::ZERO;
            events.push(make_event(
                position,
                PositionEventType::PositionClosed,
                -sign * matched,
                Some(reference),
                as_of,
            ));
        } else {
            events.push(make_event(
                position,
                PositionEventType::PositionDecreased,
                -sign * matched,
                Some(reference),
                as_of,
            ));
        }

        // A fill larger than the open position flips the remainder into
        // a fresh opposite-direction position.
        let remainder = quantity - matched;
        if remainder > Decimal::ZERO {
            position.quantity = match side {
                OrderSide::Buy => remainder,
                OrderSide::Sell => -remainder,
            };
            position.avg_entry_price = price;
            events.push(make_event(
                position,
                PositionEventType::PositionOpened,
                position.quantity,
                Some(reference),
                as_of,
            ));
        }
    }

    position.last_intent = intent;
    if let Some(mark) = mark {
        position.last_mark_price = Some(mark);
    }
    position.updated_at = as_of;
    position.check_invariants()?;
    Ok(events)
}

fn make_event(
    position: &Position,
    event_type: PositionEventType,
    delta_qty: Decimal,
    reference: Option<Uuid>,
    as_of: DateTime<Utc>,
) -> PositionEvent {
    PositionEvent {
        event_type,
        account_id: position.account_id,
        instrument_id: position.instrument_id,
        quantity: position.quantity,
        reserved_qty: position.reserved_qty,
        entry_price: position.avg_entry_price,
        delta_qty,
        reference,
        as_of,
    }
}

#[cfg(test)]
mod tests {
    use clearcore_types::TickId;

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn trade(
        maker: AccountId,
        taker: AccountId,
        taker_side: OrderSide,
        price: i64,
        qty: i64,
    ) -> TradeExecution {
        TradeExecution::dummy(maker, taker, taker_side, dec(price), dec(qty))
    }

    fn tick(instrument: InstrumentId, price: i64) -> MarkPriceUpdate {
        MarkPriceUpdate {
            tick_id: TickId::new(),
            instrument_id: instrument,
            mark_price: dec(price),
            trade_id: None,
            trade_executed_at: None,
            calculated_at: Utc::now(),
        }
    }

    #[test]
    fn first_trade_opens_both_positions() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();

        let events = projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 5))
            .unwrap();

        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| e.event_type == PositionEventType::PositionOpened));

        let taker_pos = projection.position(taker, InstrumentId(1)).unwrap();
        assert_eq!(taker_pos.quantity, dec(5), "taker bought: long");
        assert_eq!(taker_pos.avg_entry_price, dec(100));

        let maker_pos = projection.position(maker, InstrumentId(1)).unwrap();
        assert_eq!(maker_pos.quantity, dec(-5), "maker sold: short");
    }

    #[test]
    fn same_direction_increase_uses_weighted_average() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();

        projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 10))
            .unwrap();
        let events = projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 200, 10))
            .unwrap();

        assert_eq!(events[0].event_type, PositionEventType::PositionIncreased);
        let position = projection.position(taker, InstrumentId(1)).unwrap();
        assert_eq!(position.quantity, dec(20));
        assert_eq!(position.avg_entry_price, dec(150));
    }

    #[test]
    fn opposing_trade_decreases_then_closes() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();

        projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 10))
            .unwrap();
        let events = projection
            .apply_trade(&trade(maker, taker, OrderSide::Sell, 110, 4))
            .unwrap();
        let taker_event = &events[0];
        assert_eq!(taker_event.event_type, PositionEventType::PositionDecreased);
        assert_eq!(taker_event.quantity, dec(6));
        assert_eq!(taker_event.delta_qty, dec(-4));

        let events = projection
            .apply_trade(&trade(maker, taker, OrderSide::Sell, 110, 6))
            .unwrap();
        assert_eq!(events[0].event_type, PositionEventType::PositionClosed);
        assert!(projection
            .position(taker, InstrumentId(1))
            .unwrap()
            .is_flat());
    }

    #[test]
    fn oversized_opposing_trade_flips_position() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();

        projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 4))
            .unwrap();
        let events = projection
            .apply_trade(&trade(maker, taker, OrderSide::Sell, 120, 10))
            .unwrap();

        // Taker: closed 4, opened short 6. Maker mirrors.
        let taker_events: Vec<_> = events
            .iter()
            .filter(|e| e.account_id == taker)
            .collect();
        assert_eq!(taker_events.len(), 2);
        assert_eq!(taker_events[0].event_type, PositionEventType::PositionClosed);
        assert_eq!(taker_events[1].event_type, PositionEventType::PositionOpened);

        let position = projection.position(taker, InstrumentId(1)).unwrap();
        assert_eq!(position.quantity, dec(-6));
        assert_eq!(position.avg_entry_price, dec(120));
    }

    #[test]
    fn trade_replay_is_noop() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();
        let execution = trade(maker, taker, OrderSide::Buy, 100, 5);

        projection.apply_trade(&execution).unwrap();
        let before = projection.position(taker, InstrumentId(1)).unwrap();

        let replay_events = projection.apply_trade(&execution).unwrap();
        assert!(replay_events.is_empty());

        let after = projection.position(taker, InstrumentId(1)).unwrap();
        assert_eq!(before.quantity, after.quantity);
        assert_eq!(before.avg_entry_price, after.avg_entry_price);
    }

    #[test]
    fn reserve_then_close_consumes_reservation() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();

        projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 10))
            .unwrap();

        let event = projection
            .reserve(taker, InstrumentId(1), dec(10), PositionIntent::Close)
            .unwrap();
        assert_eq!(event.event_type, PositionEventType::PositionReserved);
        assert_eq!(event.reserved_qty, dec(10));

        // The close fill consumes the reservation and zeroes the position.
        let mut execution = trade(maker, taker, OrderSide::Sell, 105, 10);
        execution.taker_intent = PositionIntent::Close;
        projection.apply_trade(&execution).unwrap();

        let position = projection.position(taker, InstrumentId(1)).unwrap();
        assert!(position.is_flat());
        assert_eq!(position.reserved_qty, Decimal::ZERO);
    }

    #[test]
    fn partial_reduce_shrinks_reservation() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();

        projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 10))
            .unwrap();
        projection
            .reserve(taker, InstrumentId(1), dec(6), PositionIntent::Reduce)
            .unwrap();

        let mut execution = trade(maker, taker, OrderSide::Sell, 105, 4);
        execution.taker_intent = PositionIntent::Reduce;
        projection.apply_trade(&execution).unwrap();

        let position = projection.position(taker, InstrumentId(1)).unwrap();
        assert_eq!(position.quantity, dec(6));
        assert_eq!(position.reserved_qty, dec(2));
        position.check_invariants().unwrap();
    }

    #[test]
    fn reserve_rejects_insufficient_available() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();

        projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 10))
            .unwrap();
        projection
            .reserve(taker, InstrumentId(1), dec(8), PositionIntent::Reduce)
            .unwrap();

        let err = projection
            .reserve(taker, InstrumentId(1), dec(5), PositionIntent::Reduce)
            .unwrap_err();
        assert!(matches!(err, ClearcoreError::InsufficientAvailable { .. }));
    }

    #[test]
    fn reserve_without_position_rejected() {
        let projection = PositionProjection::new();
        let err = projection
            .reserve(
                AccountId::new(),
                InstrumentId(1),
                dec(1),
                PositionIntent::Close,
            )
            .unwrap_err();
        assert!(matches!(err, ClearcoreError::PositionNotFound { .. }));
    }

    #[test]
    fn mark_price_updates_open_positions_only() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();

        projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 5))
            .unwrap();

        let events = projection
            .apply_mark_price(&tick(InstrumentId(1), 105))
            .unwrap();
        assert_eq!(events.len(), 2, "one event per open position");
        assert!(events
            .iter()
            .all(|e| e.event_type == PositionEventType::MarkPriceUpdated));

        let position = projection.position(taker, InstrumentId(1)).unwrap();
        assert_eq!(position.last_mark_price, Some(dec(105)));
    }

    #[test]
    fn unchanged_mark_price_suppressed() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();
        projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 5))
            .unwrap();

        projection
            .apply_mark_price(&tick(InstrumentId(1), 105))
            .unwrap();
        let events = projection
            .apply_mark_price(&tick(InstrumentId(1), 105))
            .unwrap();
        assert!(events.is_empty(), "same price emits nothing");
    }

    #[test]
    fn mark_price_tick_replay_is_noop() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();
        projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 5))
            .unwrap();

        let first_tick = tick(InstrumentId(1), 105);
        projection.apply_mark_price(&first_tick).unwrap();
        // Price moves, then the old tick is redelivered.
        projection
            .apply_mark_price(&tick(InstrumentId(1), 110))
            .unwrap();
        let replay_events = projection.apply_mark_price(&first_tick).unwrap();

        assert!(replay_events.is_empty());
        assert_eq!(projection.mark_price(InstrumentId(1)), Some(dec(110)));
    }

    #[test]
    fn liquidation_forces_close() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();

        projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 10))
            .unwrap();
        projection
            .reserve(taker, InstrumentId(1), dec(5), PositionIntent::Reduce)
            .unwrap();

        let signal = LiquidationSignal {
            event_id: Uuid::now_v7(),
            account_id: taker,
            instrument_id: InstrumentId(1),
            mark_price: dec(60),
            occurred_at: Utc::now(),
        };
        let events = projection.apply_liquidation(&signal).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].event_type,
            PositionEventType::LiquidationTriggered
        );
        assert_eq!(events[0].quantity, Decimal::ZERO);
        assert_eq!(events[0].delta_qty, dec(-10));

        let position = projection.position(taker, InstrumentId(1)).unwrap();
        assert!(position.is_flat());
        assert_eq!(position.reserved_qty, Decimal::ZERO);

        // Replay of the same signal is absorbed.
        assert!(projection.apply_liquidation(&signal).unwrap().is_empty());
    }

    #[test]
    fn liquidation_of_flat_position_ignored() {
        let projection = PositionProjection::new();
        let signal = LiquidationSignal {
            event_id: Uuid::now_v7(),
            account_id: AccountId::new(),
            instrument_id: InstrumentId(1),
            mark_price: dec(60),
            occurred_at: Utc::now(),
        };
        assert!(projection.apply_liquidation(&signal).unwrap().is_empty());
    }

    #[test]
    fn reservation_never_exceeds_quantity() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();

        projection
            .apply_trade(&trade(maker, taker, OrderSide::Buy, 100, 10))
            .unwrap();
        projection
            .reserve(taker, InstrumentId(1), dec(10), PositionIntent::Close)
            .unwrap();

        // Reduce by 7: reservation must shrink with the position.
        let mut execution = trade(maker, taker, OrderSide::Sell, 100, 7);
        execution.taker_intent = PositionIntent::Reduce;
        projection.apply_trade(&execution).unwrap();

        let position = projection.position(taker, InstrumentId(1)).unwrap();
        assert_eq!(position.quantity, dec(3));
        assert!(position.reserved_qty <= position.abs_quantity());
        position.check_invariants().unwrap();
    }

    #[test]
    fn trade_records_last_intent() {
        let projection = PositionProjection::new();
        let maker = AccountId::new();
        let taker = AccountId::new();

        let mut execution = trade(maker, taker, OrderSide::Buy, 100, 5);
        execution.taker_intent = PositionIntent::Increase;
        projection.apply_trade(&execution).unwrap();

        let position = projection.position(taker, InstrumentId(1)).unwrap();
        assert_eq!(position.last_intent, PositionIntent::Increase);
    }
}
