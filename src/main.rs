//! Market Replay Simulation.
//!
//! Demonstrates the full replay pipeline: book reconstruction, impact
//! pricing, taker and maker execution, funding settlement, and a complete
//! strategy run with round-trip analytics and a determinism check.

use replay_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn main() {
    println!("Market Replay and Execution Simulation");
    println!("Deterministic Event Replay, Impact-Aware Fills\n");

    scenario_1_book_reconstruction();
    scenario_2_taker_self_impact();
    scenario_3_maker_queue_lifecycle();
    scenario_4_funding_settlement();
    scenario_5_full_replay();

    println!("\nAll simulations completed successfully.");
}

fn sym() -> Symbol {
    Symbol::new("BTCUSDT")
}

fn px(v: Decimal) -> Price {
    Price::new_unchecked(v)
}

fn depth_event(
    ts: i64,
    final_id: u64,
    prev_id: u64,
    bids: &[(Decimal, Decimal)],
    asks: &[(Decimal, Decimal)],
) -> MarketEvent {
    MarketEvent::Depth(DepthUpdate {
        event_time: Timestamp::from_millis(ts),
        transaction_time: Timestamp::from_millis(ts),
        symbol: sym(),
        first_update_id: final_id,
        final_update_id: final_id,
        prev_final_update_id: prev_id,
        bid_deltas: bids.iter().map(|(p, q)| LevelDelta::new(px(*p), *q)).collect(),
        ask_deltas: asks.iter().map(|(p, q)| LevelDelta::new(px(*p), *q)).collect(),
    })
}

fn trade_event(ts: i64, id: u64, price: Decimal, qty: Decimal, buyer_is_maker: bool) -> MarketEvent {
    MarketEvent::Trade(Trade {
        event_time: Timestamp::from_millis(ts),
        trade_time: Timestamp::from_millis(ts),
        symbol: sym(),
        trade_id: id,
        price: px(price),
        quantity: qty,
        buyer_is_maker,
    })
}

fn mark_event(ts: i64, price: Decimal, rate: Decimal, funding_ts: i64) -> MarketEvent {
    MarketEvent::Mark(MarkPrice {
        event_time: Timestamp::from_millis(ts),
        symbol: sym(),
        mark_price: px(price),
        index_price: px(price),
        funding_rate: rate,
        next_funding_time: Timestamp::from_millis(funding_ts),
    })
}

/// L2 reconstruction and impact-aware pricing.
fn scenario_1_book_reconstruction() {
    println!("Scenario 1: Book Reconstruction and Impact VWAP\n");

    let mut book = L2Book::new();
    book.apply_depth_update(
        &[
            LevelDelta::new(px(dec!(49990)), dec!(2.0)),
            LevelDelta::new(px(dec!(49980)), dec!(5.0)),
            LevelDelta::new(px(dec!(49970)), dec!(8.0)),
        ],
        &[
            LevelDelta::new(px(dec!(50010)), dec!(1.5)),
            LevelDelta::new(px(dec!(50020)), dec!(4.0)),
            LevelDelta::new(px(dec!(50030)), dec!(10.0)),
        ],
    );

    println!(
        "  Best bid: ${}, best ask: ${}",
        book.best_bid().unwrap(),
        book.best_ask().unwrap()
    );
    println!("  Mid: ${}, spread: ${}", book.mid_price().unwrap(), book.spread().unwrap());

    for notional in [dec!(50000), dec!(150000), dec!(500000)] {
        match book.impact_vwap(
            Side::Buy,
            Quote::new(notional),
            DEFAULT_IMPACT_MAX_LEVELS,
            default_eps_notional(),
        ) {
            Ok(vwap) => println!("  Buy ${} notional: impact VWAP ${}", notional, vwap),
            Err(e) => println!("  Buy ${} notional: {}", notional, e),
        }
    }

    // Delete the touch, quote a tighter book.
    book.apply_depth_update(&[], &[LevelDelta::new(px(dec!(50010)), dec!(0))]);
    println!("  After ask-touch deletion, best ask: ${}\n", book.best_ask().unwrap());
}

/// Taker fills consume depth so a second fill walks deeper.
fn scenario_2_taker_self_impact() {
    println!("Scenario 2: Taker Self-Impact\n");

    let mut books = BookSet::new();
    let book = books.book_mut(&sym());
    book.apply_depth_update(
        &[LevelDelta::new(px(dec!(49990)), dec!(5.0))],
        &[
            LevelDelta::new(px(dec!(50010)), dec!(2.0)),
            LevelDelta::new(px(dec!(50020)), dec!(3.0)),
        ],
    );

    let mut broker = SimBroker::new(BrokerConfig::default()).unwrap();
    let now = Timestamp::from_millis(0);

    broker.submit(
        Order::new_market(OrderId(1), sym(), Side::Buy, dec!(2.0), now),
        &mut books,
        now,
    );
    let first = broker.fills().last().unwrap();
    println!("  First buy 2.0: avg ${}", first.price);

    broker.submit(
        Order::new_market(OrderId(2), sym(), Side::Buy, dec!(2.0), now),
        &mut books,
        now,
    );
    let second = broker.fills().last().unwrap();
    println!("  Second buy 2.0: avg ${} (walked past consumed touch)", second.price);

    let pos = broker.portfolio.position(&sym()).unwrap();
    println!(
        "  Position: {} BTC @ ${}, fees ${}\n",
        pos.qty.value(),
        pos.avg_price.unwrap(),
        broker.portfolio.fees_paid
    );
}

/// A resting maker order working through the queue via the trade tape.
fn scenario_3_maker_queue_lifecycle() {
    println!("Scenario 3: Maker Queue Lifecycle\n");

    let mut books = BookSet::new();
    books.book_mut(&sym()).apply_depth_update(
        &[LevelDelta::new(px(dec!(49990)), dec!(4.0))],
        &[LevelDelta::new(px(dec!(50010)), dec!(4.0))],
    );

    let mut broker = SimBroker::new(BrokerConfig::default()).unwrap();
    let now = Timestamp::from_millis(0);

    let order = Order::new_limit(
        OrderId(1),
        sym(),
        Side::Buy,
        dec!(1.0),
        px(dec!(49990)),
        TimeInForce::GTC,
        now,
    )
    .post_only();
    broker.submit(order, &mut books, now);

    let mo = broker.maker_order(OrderId(1)).unwrap();
    println!("  Resting BUY 1.0 @ $49,990, queue ahead: {}", mo.queue_ahead_qty);

    // Sellers hit the bid; each print works off queue ahead of us.
    for (i, qty) in [dec!(2.0), dec!(1.5), dec!(1.0), dec!(1.0)].iter().enumerate() {
        let trade = Trade {
            event_time: Timestamp::from_millis(100 * (i as i64 + 1)),
            trade_time: Timestamp::from_millis(100 * (i as i64 + 1)),
            symbol: sym(),
            trade_id: i as u64 + 1,
            price: px(dec!(49990)),
            quantity: *qty,
            buyer_is_maker: true,
        };
        broker.on_trade(&trade, trade.event_time);
        match broker.maker_order(OrderId(1)) {
            Some(mo) => println!(
                "  Trade {} BTC: queue ahead {}, filled {}",
                qty, mo.queue_ahead_qty, mo.filled_qty
            ),
            None => println!("  Trade {} BTC: order fully filled", qty),
        }
    }

    println!(
        "  Final status: {:?}, maker fills: {}\n",
        broker.order_status(OrderId(1)).unwrap(),
        broker.fills().len()
    );
}

/// Funding settles exactly once per epoch.
fn scenario_4_funding_settlement() {
    println!("Scenario 4: Funding Settlement\n");

    let mut books = BookSet::new();
    books.book_mut(&sym()).apply_depth_update(
        &[LevelDelta::new(px(dec!(49990)), dec!(10.0))],
        &[LevelDelta::new(px(dec!(50010)), dec!(10.0))],
    );

    let mut broker = SimBroker::new(BrokerConfig::default()).unwrap();
    let now = Timestamp::from_millis(0);
    broker.submit(
        Order::new_market(OrderId(1), sym(), Side::Buy, dec!(2.0), now),
        &mut books,
        now,
    );

    println!("  Long 2.0 BTC @ $50,010");
    let before = broker.portfolio.realized_pnl;

    let epoch = Timestamp::from_millis(8 * 60 * 60 * 1000);
    for attempt in 1..=3 {
        let applied = broker.portfolio.apply_funding_at(&sym(), px(dec!(50000)), dec!(0.0001), epoch);
        match applied {
            Some(pnl) => println!("  Attempt {}: funding applied, pnl ${}", attempt, pnl),
            None => println!("  Attempt {}: epoch already settled, skipped", attempt),
        }
    }

    println!(
        "  Realized PnL moved {} (rate 0.01% on $100,020 notional)\n",
        broker.portfolio.realized_pnl.sub(before)
    );
}

/// Demo strategy: buys when the tape prints below mid, exits on a later tick.
struct TapeFade {
    entry_tick: Option<Timestamp>,
}

impl Strategy for TapeFade {
    fn on_event(&mut self, ctx: &mut EngineContext, event: &MarketEvent) {
        let MarketEvent::Trade(trade) = event else {
            return;
        };
        if self.entry_tick.is_some() || ctx.position(&trade.symbol).is_some() {
            return;
        }
        let Some(mid) = ctx.mid_price(&trade.symbol) else {
            return;
        };
        if trade.aggressor_side() == Side::Sell && trade.price < mid {
            let id = ctx.next_order_id();
            let order = Order::new_market(id, trade.symbol.clone(), Side::Buy, dec!(0.5), ctx.now());
            if ctx.submit(order) == SubmitAck::Accepted {
                self.entry_tick = Some(ctx.now());
            }
        }
    }

    fn on_tick(&mut self, ctx: &mut EngineContext, now: Timestamp) {
        let Some(entered) = self.entry_tick else {
            return;
        };
        // Hold for five seconds, then flatten.
        if now.as_millis() - entered.as_millis() < 5_000 {
            return;
        }
        if let Some(pos) = ctx.position(&sym()) {
            if !pos.is_flat() {
                let qty = pos.qty.abs();
                let side = if pos.qty.is_long() { Side::Sell } else { Side::Buy };
                let id = ctx.next_order_id();
                let order = Order::new_market(id, sym(), side, qty, now);
                ctx.submit(order);
            }
        }
    }
}

/// Full pipeline: merge three streams, run a strategy, verify determinism.
fn scenario_5_full_replay() {
    println!("Scenario 5: Full Merged Replay\n");

    let result_a = run_demo_backtest();
    let result_b = run_demo_backtest();

    println!("  Events processed: {}", result_a.events_processed);
    println!("  Ticks fired: {}", result_a.ticks_fired);
    println!("  Fills: {}", result_a.fills.len());
    println!("  Realized PnL: ${}", result_a.realized_pnl);
    println!("  Fees paid: ${}", result_a.fees_paid);
    println!("  Final equity: ${}", result_a.final_equity);
    println!("  Anomalies: {:?}", result_a.anomalies);

    let trips = result_a.round_trips();
    let summary = summarize_round_trips(&trips);
    println!(
        "  Round trips: {} ({} wins, {} losses), net ${}",
        summary.count, summary.wins, summary.losses, summary.total_net_pnl
    );

    let curve: Vec<Quote> = result_a.equity_curve.iter().map(|(_, e)| *e).collect();
    if let Some(dd) = max_drawdown(&curve) {
        println!("  Max drawdown: ${}", dd);
    }

    let log_a = serde_json::to_string(&result_a.fills).unwrap();
    let log_b = serde_json::to_string(&result_b.fills).unwrap();
    println!(
        "  Determinism: serialized fill logs from two runs {}",
        if log_a == log_b { "match byte-for-byte" } else { "DIVERGED" }
    );
}

fn run_demo_backtest() -> BacktestResult {
    let depth_stream: Vec<MarketEvent> = (0..60)
        .map(|i| {
            let ts = i * 1_000;
            let drift = Decimal::from(i % 7) * dec!(5);
            depth_event(
                ts,
                (i + 1) as u64,
                i as u64,
                &[
                    (dec!(49990) + drift, dec!(3.0)),
                    (dec!(49980) + drift, dec!(6.0)),
                ],
                &[
                    (dec!(50010) + drift, dec!(3.0)),
                    (dec!(50020) + drift, dec!(6.0)),
                ],
            )
        })
        .collect();

    let trade_stream: Vec<MarketEvent> = (0..30)
        .map(|i| {
            let ts = 500 + i * 2_000;
            let sell = i % 3 != 0;
            let price = if sell { dec!(49990) } else { dec!(50010) };
            trade_event(ts, i as u64 + 1, price, dec!(0.8), sell)
        })
        .collect();

    let mark_stream: Vec<MarketEvent> = (0..6)
        .map(|i| mark_event(200 + i * 10_000, dec!(50000), dec!(0.0001), 30_000))
        .collect();

    let merged = merge_event_streams(vec![
        depth_stream.into_iter(),
        trade_stream.into_iter(),
        mark_stream.into_iter(),
    ]);

    let engine = BacktestEngine::new(
        EngineConfig::default(),
        SimBroker::new(BrokerConfig::default()).unwrap(),
    )
    .unwrap();

    let mut strategy = TapeFade { entry_tick: None };
    engine.run(merged, &mut strategy)
}
