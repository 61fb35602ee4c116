// 9.2: the replay engine. Single-threaded, event-at-a-time, no wall clock, no
// randomness: the same event stream and configs always produce the same
// result, byte for byte.

use crate::book::BookSet;
use crate::broker::{RejectReason, SimBroker, SubmitAck};
use crate::engine::config::{EngineConfig, EngineConfigError};
use crate::engine::results::{AnomalyCounters, BacktestResult};
use crate::events::{DepthUpdate, Liquidation, MarkPrice, MarketEvent, OpenInterest, Ticker};
use crate::order::Order;
use crate::portfolio::Position;
use crate::strategy::Strategy;
use crate::types::{OrderId, Price, Quote, Symbol, Timestamp};
use std::collections::HashMap;

/// The strategy's window into the simulation. Also carries the last-seen
/// auxiliary event per symbol (mark, ticker, open interest, liquidation) so
/// a strategy can consult context without replaying the stream itself.
#[derive(Debug)]
pub struct EngineContext {
    config: EngineConfig,
    pub broker: SimBroker,
    pub books: BookSet,
    now: Timestamp,

    marks: HashMap<Symbol, MarkPrice>,
    tickers: HashMap<Symbol, Ticker>,
    open_interest: HashMap<Symbol, OpenInterest>,
    liquidations: HashMap<Symbol, Liquidation>,

    pub anomalies: AnomalyCounters,
    last_depth_final_id: HashMap<Symbol, u64>,
    next_order_id: u64,
}

impl EngineContext {
    fn new(config: EngineConfig, broker: SimBroker) -> Self {
        Self {
            config,
            broker,
            books: BookSet::new(),
            now: Timestamp::from_millis(0),
            marks: HashMap::new(),
            tickers: HashMap::new(),
            open_interest: HashMap::new(),
            liquidations: HashMap::new(),
            anomalies: AnomalyCounters::default(),
            last_depth_final_id: HashMap::new(),
            next_order_id: 0,
        }
    }

    /// Current simulation time. Never moves backward, even when an event's
    /// timestamp does.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_trading_time(&self) -> bool {
        self.config.trading_start.is_none_or(|s| self.now >= s)
            && self.config.trading_end.is_none_or(|e| self.now < e)
    }

    /// Fresh order id, unique within the run.
    pub fn next_order_id(&mut self) -> OrderId {
        self.next_order_id += 1;
        OrderId(self.next_order_id)
    }

    /// Submit through the broker at the current simulation time. Rejected
    /// outright outside the trading window.
    pub fn submit(&mut self, order: Order) -> SubmitAck {
        if !self.is_trading_time() {
            return SubmitAck::Rejected(RejectReason::OutsideTradingWindow);
        }
        self.broker.submit(order, &mut self.books, self.now)
    }

    pub fn cancel(&mut self, order_id: OrderId) {
        self.broker.cancel(order_id, self.now);
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.broker.portfolio.position(symbol)
    }

    pub fn mid_price(&self, symbol: &Symbol) -> Option<Price> {
        self.books.mid_price(symbol)
    }

    pub fn mark(&self, symbol: &Symbol) -> Option<&MarkPrice> {
        self.marks.get(symbol)
    }

    pub fn mark_price(&self, symbol: &Symbol) -> Option<Price> {
        self.marks.get(symbol).map(|m| m.mark_price)
    }

    pub fn ticker(&self, symbol: &Symbol) -> Option<&Ticker> {
        self.tickers.get(symbol)
    }

    pub fn open_interest(&self, symbol: &Symbol) -> Option<&OpenInterest> {
        self.open_interest.get(symbol)
    }

    pub fn last_liquidation(&self, symbol: &Symbol) -> Option<&Liquidation> {
        self.liquidations.get(symbol)
    }

    /// Mark price per symbol, falling back to book mid where no mark has
    /// been seen yet.
    pub fn valuation_prices(&self) -> HashMap<Symbol, Price> {
        let mut prices: HashMap<Symbol, Price> = self
            .marks
            .iter()
            .map(|(sym, m)| (sym.clone(), m.mark_price))
            .collect();
        for (sym, _) in self.broker.portfolio.positions() {
            if !prices.contains_key(sym) {
                if let Some(mid) = self.books.mid_price(sym) {
                    prices.insert(sym.clone(), mid);
                }
            }
        }
        prices
    }

    pub fn equity(&self) -> Quote {
        self.broker.portfolio.equity(&self.valuation_prices())
    }

    // Funding settles when an event's time reaches the epoch a mark-price
    // message announced. The portfolio's per-symbol gate makes each epoch
    // settle at most once, regardless of how many marks repeat it.
    fn apply_funding_if_due(&mut self, mark: &MarkPrice) {
        if mark.next_funding_time.as_millis() <= 0 {
            return;
        }
        if mark.event_time < mark.next_funding_time {
            return;
        }
        let applied = self.broker.portfolio.apply_funding_at(
            &mark.symbol,
            mark.mark_price,
            mark.funding_rate,
            mark.next_funding_time,
        );
        if let Some(pnl) = applied {
            if self.config.verbose {
                println!(
                    "[{}] funding {} epoch {}: {}",
                    self.now, mark.symbol, mark.next_funding_time, pnl
                );
            }
        }
    }

    fn on_depth(&mut self, update: &DepthUpdate) {
        // Update-id bookkeeping first. Duplicates and gaps are counted but
        // the message is still applied; absolute-quantity deltas are
        // idempotent, so replaying one cannot corrupt the book.
        if let Some(&last) = self.last_depth_final_id.get(&update.symbol) {
            if update.final_update_id <= last {
                self.anomalies.duplicate_depth_updates += 1;
            } else if update.prev_final_update_id != 0 && update.prev_final_update_id != last {
                self.anomalies.depth_continuity_gaps += 1;
            }
        }
        let entry = self
            .last_depth_final_id
            .entry(update.symbol.clone())
            .or_insert(0);
        *entry = (*entry).max(update.final_update_id);

        self.broker.on_depth_update(update, &mut self.books);

        if self
            .books
            .book(&update.symbol)
            .is_some_and(|b| b.is_crossed())
        {
            self.anomalies.crossed_book_observations += 1;
        }
    }
}

/// Drives a strategy over a merged event stream.
pub struct BacktestEngine {
    ctx: EngineContext,
    next_tick: Option<Timestamp>,
    ticks_fired: u64,
    events_processed: u64,
    equity_curve: Vec<(Timestamp, Quote)>,
    fills_reported: usize,
}

impl BacktestEngine {
    pub fn new(config: EngineConfig, broker: SimBroker) -> Result<Self, EngineConfigError> {
        config.validate()?;
        Ok(Self {
            ctx: EngineContext::new(config, broker),
            next_tick: None,
            ticks_fired: 0,
            events_processed: 0,
            equity_curve: Vec::new(),
            fills_reported: 0,
        })
    }

    // 9.4: the main loop. Per event: fire any ticks due strictly before the
    // event's time, advance the clock, release latency-due broker work, apply
    // the event to engine state, then hand it to the strategy.
    pub fn run<I, S>(mut self, events: I, strategy: &mut S) -> BacktestResult
    where
        I: IntoIterator<Item = MarketEvent>,
        S: Strategy,
    {
        strategy.on_start(&mut self.ctx);

        for event in events {
            let t = event.event_time();
            self.events_processed += 1;

            if self.next_tick.is_none() {
                // Anchor the tick grid on the absolute multiple at or before
                // the first event, so tick times are data-independent.
                let interval = self.ctx.config.tick_interval_ms;
                let anchor = (t.as_millis().div_euclid(interval)) * interval;
                self.next_tick = Some(Timestamp::from_millis(anchor + interval));
                self.ctx.now = t;
            }

            if t < self.ctx.now {
                // Merge-level ordering is guaranteed; a regression here means
                // the input files themselves were unsorted. Process the event
                // at the current clock rather than rewinding.
                self.ctx.anomalies.out_of_order_events += 1;
            } else {
                self.fire_ticks_through(t, strategy);
                self.ctx.now = t;
            }

            self.ctx.broker.on_time(self.ctx.now, &mut self.ctx.books);

            match &event {
                MarketEvent::Depth(update) => self.ctx.on_depth(update),
                MarketEvent::Trade(trade) => {
                    self.ctx.broker.on_trade(trade, self.ctx.now);
                }
                MarketEvent::Mark(mark) => {
                    self.ctx.marks.insert(mark.symbol.clone(), mark.clone());
                    self.ctx.apply_funding_if_due(mark);
                }
                MarketEvent::Ticker(ticker) => {
                    self.ctx.tickers.insert(ticker.symbol.clone(), ticker.clone());
                }
                MarketEvent::OpenInterest(oi) => {
                    self.ctx.open_interest.insert(oi.symbol.clone(), oi.clone());
                }
                MarketEvent::Liquidation(liq) => {
                    self.ctx.liquidations.insert(liq.symbol.clone(), liq.clone());
                }
            }

            self.report_new_fills();
            strategy.on_event(&mut self.ctx, &event);
        }

        // Trailing tick so broker work due at or before the final event time
        // is released and the curve ends with a sample.
        if self.events_processed > 0 {
            self.ctx.broker.on_time(self.ctx.now, &mut self.ctx.books);
            let now = self.ctx.now;
            strategy.on_tick(&mut self.ctx, now);
            self.ticks_fired += 1;
            self.sample_equity(self.ctx.now);
            self.report_new_fills();
        }

        strategy.on_end(&mut self.ctx);
        self.into_result()
    }

    fn fire_ticks_through<S: Strategy>(&mut self, t: Timestamp, strategy: &mut S) {
        let interval = self.ctx.config.tick_interval_ms;
        while let Some(tick) = self.next_tick {
            if tick > t {
                break;
            }
            self.ctx.now = tick;
            self.ctx.broker.on_time(tick, &mut self.ctx.books);
            strategy.on_tick(&mut self.ctx, tick);
            self.ticks_fired += 1;
            self.sample_equity(tick);
            self.report_new_fills();
            self.next_tick = Some(tick.add_millis(interval));
        }
    }

    fn sample_equity(&mut self, at: Timestamp) {
        self.equity_curve.push((at, self.ctx.equity()));
    }

    fn report_new_fills(&mut self) {
        let fills = self.ctx.broker.fills();
        if self.ctx.config.verbose {
            for fill in &fills[self.fills_reported..] {
                println!(
                    "[{}] fill {} {} {} @ {} ({:?}) fee {}",
                    fill.event_time,
                    fill.symbol,
                    fill.side,
                    fill.quantity,
                    fill.price,
                    fill.liquidity,
                    fill.fee
                );
            }
        }
        self.fills_reported = fills.len();
    }

    fn into_result(self) -> BacktestResult {
        let final_equity = self.ctx.equity();
        BacktestResult {
            fills: self.ctx.broker.fills().to_vec(),
            realized_pnl: self.ctx.broker.portfolio.realized_pnl,
            fees_paid: self.ctx.broker.portfolio.fees_paid,
            final_equity,
            equity_curve: self.equity_curve,
            anomalies: self.ctx.anomalies,
            events_processed: self.events_processed,
            ticks_fired: self.ticks_fired,
        }
    }
}
