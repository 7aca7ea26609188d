//! Integration: matching engine → position projection.
//!
//! Runs real commands through the engine and feeds the published trade
//! executions into the projection, verifying the position lifecycle,
//! idempotent redelivery, and the reservation invariant across a mixed
//! session with mark-price ticks in between.

use std::sync::Arc;

use clearcore_matching::{AllowAll, InstrumentRegistry, MatchingEngine};
use clearcore_position::PositionProjection;
use clearcore_types::*;
use rust_decimal::Decimal;

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

struct Flow {
    engine: MatchingEngine,
    events: crossbeam_channel::Receiver<EngineEvent>,
    projection: PositionProjection,
}

impl Flow {
    fn new() -> Self {
        let registry = Arc::new(InstrumentRegistry::new());
        let (engine, events) =
            MatchingEngine::new(EngineConfig::default(), registry, Arc::new(AllowAll));
        engine
            .start_instrument(Instrument::new(InstrumentId(1), "BTC", "USDT"))
            .unwrap();
        Self {
            engine,
            events,
            projection: PositionProjection::new(),
        }
    }

    fn submit(&self, account: AccountId, side: OrderSide, price: i64, qty: i64, intent: PositionIntent) {
        self.engine
            .submit(&SubmitOrder {
                account_id: account,
                instrument_id: InstrumentId(1),
                side,
                order_type: OrderType::Limit,
                price: Some(dec(price)),
                quantity: dec(qty),
                intent,
            })
            .unwrap();
    }

    /// Drain the engine and project every published trade; returns the
    /// executions and all emitted position events.
    fn project_all(self) -> (PositionProjection, Vec<TradeExecution>, Vec<PositionEvent>) {
        self.engine.shutdown();
        let mut executions = Vec::new();
        let mut position_events = Vec::new();
        for event in self.events.try_iter() {
            if let EngineEvent::TradeExecuted(trade) = event {
                position_events.extend(self.projection.apply_trade(&trade).unwrap());
                executions.push(trade);
            }
        }
        (self.projection, executions, position_events)
    }
}

#[test]
fn open_increase_reduce_close_lifecycle() {
    let flow = Flow::new();
    let longs = AccountId::new();
    let shorts = AccountId::new();

    // Open long 5 @ 100, add 5 @ 110, reduce 4 @ 120, close 6 @ 120.
    flow.submit(shorts, OrderSide::Sell, 100, 5, PositionIntent::Increase);
    flow.submit(longs, OrderSide::Buy, 100, 5, PositionIntent::Increase);
    flow.submit(shorts, OrderSide::Sell, 110, 5, PositionIntent::Increase);
    flow.submit(longs, OrderSide::Buy, 110, 5, PositionIntent::Increase);
    flow.submit(shorts, OrderSide::Buy, 120, 4, PositionIntent::Reduce);
    flow.submit(longs, OrderSide::Sell, 120, 4, PositionIntent::Reduce);
    flow.submit(shorts, OrderSide::Buy, 120, 6, PositionIntent::Close);
    flow.submit(longs, OrderSide::Sell, 120, 6, PositionIntent::Close);

    let (projection, executions, events) = flow.project_all();
    assert_eq!(executions.len(), 4);

    let long_events: Vec<PositionEventType> = events
        .iter()
        .filter(|e| e.account_id == longs)
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        long_events,
        vec![
            PositionEventType::PositionOpened,
            PositionEventType::PositionIncreased,
            PositionEventType::PositionDecreased,
            PositionEventType::PositionClosed,
        ]
    );

    let position = projection.position(longs, InstrumentId(1)).unwrap();
    assert!(position.is_flat());
    assert_eq!(position.reserved_qty, Decimal::ZERO);
}

#[test]
fn weighted_average_entry_across_fills() {
    let flow = Flow::new();
    let buyer = AccountId::new();
    let seller = AccountId::new();

    flow.submit(seller, OrderSide::Sell, 100, 10, PositionIntent::Increase);
    flow.submit(seller, OrderSide::Sell, 200, 10, PositionIntent::Increase);
    flow.submit(buyer, OrderSide::Buy, 200, 20, PositionIntent::Increase);

    let (projection, executions, _) = flow.project_all();
    assert_eq!(executions.len(), 2, "sweep fills both levels");

    let position = projection.position(buyer, InstrumentId(1)).unwrap();
    assert_eq!(position.quantity, dec(20));
    assert_eq!(position.avg_entry_price, dec(150));
}

#[test]
fn redelivered_stream_projects_once() {
    let flow = Flow::new();
    let buyer = AccountId::new();
    let seller = AccountId::new();

    flow.submit(seller, OrderSide::Sell, 100, 5, PositionIntent::Increase);
    flow.submit(buyer, OrderSide::Buy, 100, 5, PositionIntent::Increase);

    let (projection, executions, _) = flow.project_all();
    let before = projection.position(buyer, InstrumentId(1)).unwrap();

    // At-least-once delivery: replay the whole stream twice more.
    for _ in 0..2 {
        for trade in &executions {
            let events = projection.apply_trade(trade).unwrap();
            assert!(events.is_empty());
        }
    }

    let after = projection.position(buyer, InstrumentId(1)).unwrap();
    assert_eq!(before.quantity, after.quantity);
    assert_eq!(before.avg_entry_price, after.avg_entry_price);
}

#[test]
fn mark_price_ticks_between_trades() {
    let flow = Flow::new();
    let buyer = AccountId::new();
    let seller = AccountId::new();

    flow.submit(seller, OrderSide::Sell, 100, 5, PositionIntent::Increase);
    flow.submit(buyer, OrderSide::Buy, 100, 5, PositionIntent::Increase);

    let (projection, _, _) = flow.project_all();

    let tick = |price: i64| MarkPriceUpdate {
        tick_id: TickId::new(),
        instrument_id: InstrumentId(1),
        mark_price: dec(price),
        trade_id: None,
        trade_executed_at: None,
        calculated_at: chrono::Utc::now(),
    };

    let events = projection.apply_mark_price(&tick(105)).unwrap();
    assert_eq!(events.len(), 2, "both open positions notified");

    // Redundant tick at the same price: suppressed entirely.
    assert!(projection.apply_mark_price(&tick(105)).unwrap().is_empty());

    let position = projection.position(buyer, InstrumentId(1)).unwrap();
    assert_eq!(position.last_mark_price, Some(dec(105)));
}

#[test]
fn reservation_invariant_holds_through_session() {
    let flow = Flow::new();
    let buyer = AccountId::new();
    let seller = AccountId::new();

    flow.submit(seller, OrderSide::Sell, 100, 10, PositionIntent::Increase);
    flow.submit(buyer, OrderSide::Buy, 100, 10, PositionIntent::Increase);

    let (projection, _, _) = flow.project_all();

    projection
        .reserve(buyer, InstrumentId(1), dec(10), PositionIntent::Close)
        .unwrap();

    // Close in three slices; after each, reserved ≤ |quantity|.
    for qty in [3, 3, 4] {
        let mut close = TradeExecution::dummy(
            AccountId::new(),
            buyer,
            OrderSide::Sell,
            dec(100),
            dec(qty),
        );
        close.taker_intent = PositionIntent::Close;
        projection.apply_trade(&close).unwrap();

        let position = projection.position(buyer, InstrumentId(1)).unwrap();
        assert!(position.reserved_qty <= position.abs_quantity());
    }

    let position = projection.position(buyer, InstrumentId(1)).unwrap();
    assert!(position.is_flat(), "close intent drove quantity to zero");
    assert_eq!(position.reserved_qty, Decimal::ZERO);
}
