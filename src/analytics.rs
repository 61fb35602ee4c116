// 12.0: post-run analytics. Round trips are reconstructed from the fill log
// alone by replaying fills through a scratch portfolio, so the numbers tie
// out exactly with realized PnL.

use crate::order::Fill;
use crate::portfolio::Portfolio;
use crate::types::{Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One completed flat-to-flat episode in a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTrip {
    pub symbol: Symbol,
    /// `Buy` for a long trip, `Sell` for a short trip.
    pub direction: Side,
    pub opened_at: Timestamp,
    pub closed_at: Timestamp,
    /// Realized PnL excluding fees.
    pub gross_pnl: Quote,
    /// Fees paid across the trip's fills.
    pub fees: Quote,
    /// `gross_pnl - fees`.
    pub net_pnl: Quote,
    /// Largest absolute position held during the trip.
    pub max_abs_qty: Decimal,
    pub fill_count: usize,
}

impl RoundTrip {
    pub fn duration_ms(&self) -> i64 {
        self.closed_at.as_millis() - self.opened_at.as_millis()
    }

    pub fn is_win(&self) -> bool {
        self.net_pnl.value() > Decimal::ZERO
    }
}

#[derive(Debug)]
struct OpenTrip {
    direction: Side,
    opened_at: Timestamp,
    realized_at_open: Quote,
    fees_at_open: Quote,
    max_abs_qty: Decimal,
    fill_count: usize,
}

#[derive(Debug, Default)]
struct SymbolState {
    scratch: Portfolio,
    open: Option<OpenTrip>,
}

/// Rebuild round trips from a fill log. Fills must be in execution order,
/// as produced by the broker. A position still open after the last fill
/// does not produce a trip.
///
/// A flip (e.g. long 2, sell 5) closes the old trip at the flip fill and
/// opens a new one at the same fill; the flip fill's fee is attributed to
/// the closing trip.
pub fn round_trips_from_fills(fills: &[Fill]) -> Vec<RoundTrip> {
    let mut states: HashMap<Symbol, SymbolState> = HashMap::new();
    let mut trips: Vec<RoundTrip> = Vec::new();

    for fill in fills {
        let state = states.entry(fill.symbol.clone()).or_default();

        let qty_before = state
            .scratch
            .position(&fill.symbol)
            .map(|p| p.qty.value())
            .unwrap_or(Decimal::ZERO);

        state
            .scratch
            .apply_fill(&fill.symbol, fill.side, fill.quantity, fill.price, fill.fee);

        let qty_after = state
            .scratch
            .position(&fill.symbol)
            .map(|p| p.qty.value())
            .unwrap_or(Decimal::ZERO);

        let flipped = !qty_before.is_zero()
            && !qty_after.is_zero()
            && qty_before.is_sign_positive() != qty_after.is_sign_positive();

        if let Some(trip) = state.open.as_mut() {
            trip.fill_count += 1;
            if !flipped {
                trip.max_abs_qty = trip.max_abs_qty.max(qty_after.abs());
            }
        }

        if qty_after.is_zero() || flipped {
            if let Some(trip) = state.open.take() {
                let net = state.scratch.realized_pnl.sub(trip.realized_at_open);
                let fees = state.scratch.fees_paid.sub(trip.fees_at_open);
                trips.push(RoundTrip {
                    symbol: fill.symbol.clone(),
                    direction: trip.direction,
                    opened_at: trip.opened_at,
                    closed_at: fill.event_time,
                    gross_pnl: net.add(fees),
                    fees,
                    net_pnl: net,
                    max_abs_qty: trip.max_abs_qty,
                    fill_count: trip.fill_count,
                });
            }
        }

        if !qty_after.is_zero() && state.open.is_none() {
            state.open = Some(OpenTrip {
                direction: if qty_after.is_sign_positive() {
                    Side::Buy
                } else {
                    Side::Sell
                },
                opened_at: fill.event_time,
                realized_at_open: state.scratch.realized_pnl,
                fees_at_open: state.scratch.fees_paid,
                max_abs_qty: qty_after.abs(),
                fill_count: if flipped { 0 } else { 1 },
            });
        }
    }

    trips
}

/// Aggregate statistics over a set of round trips.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundTripSummary {
    pub count: usize,
    pub wins: usize,
    pub losses: usize,
    pub total_net_pnl: Quote,
    pub total_fees: Quote,
    pub avg_net_pnl: Quote,
    /// Fraction of trips with positive net PnL, zero when there are none.
    pub win_rate: Decimal,
    pub avg_duration_ms: i64,
    pub max_duration_ms: i64,
}

pub fn summarize_round_trips(trips: &[RoundTrip]) -> RoundTripSummary {
    if trips.is_empty() {
        return RoundTripSummary::default();
    }

    let count = trips.len();
    let wins = trips.iter().filter(|t| t.is_win()).count();
    let losses = trips
        .iter()
        .filter(|t| t.net_pnl.value() < Decimal::ZERO)
        .count();
    let total_net_pnl: Quote = trips.iter().map(|t| t.net_pnl).sum();
    let total_fees: Quote = trips.iter().map(|t| t.fees).sum();
    let n = Decimal::from(count as u64);

    RoundTripSummary {
        count,
        wins,
        losses,
        total_net_pnl,
        total_fees,
        avg_net_pnl: Quote::new(total_net_pnl.value() / n),
        win_rate: Decimal::from(wins as u64) / n,
        avg_duration_ms: trips.iter().map(RoundTrip::duration_ms).sum::<i64>() / count as i64,
        max_duration_ms: trips.iter().map(RoundTrip::duration_ms).max().unwrap_or(0),
    }
}

/// Largest peak-to-trough decline over an equity curve, as a non-negative
/// quote amount. `None` for an empty curve.
pub fn max_drawdown(equity: &[Quote]) -> Option<Quote> {
    let mut peak = *equity.first()?;
    let mut worst = Quote::zero();
    for point in equity {
        if *point > peak {
            peak = *point;
        }
        let dd = peak.sub(*point);
        if dd > worst {
            worst = dd;
        }
    }
    Some(worst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Liquidity;
    use crate::types::{OrderId, Price};
    use rust_decimal_macros::dec;

    fn fill(
        ts: i64,
        side: Side,
        qty: Decimal,
        price: Decimal,
        fee: Decimal,
    ) -> Fill {
        Fill {
            order_id: OrderId(1),
            symbol: Symbol::new("BTCUSDT"),
            side,
            quantity: qty,
            price: Price::new_unchecked(price),
            fee: Quote::new(fee),
            event_time: Timestamp::from_millis(ts),
            liquidity: Liquidity::Taker,
        }
    }

    #[test]
    fn single_long_round_trip() {
        let fills = vec![
            fill(0, Side::Buy, dec!(2), dec!(100), dec!(0.2)),
            fill(1000, Side::Sell, dec!(2), dec!(110), dec!(0.22)),
        ];
        let trips = round_trips_from_fills(&fills);
        assert_eq!(trips.len(), 1);

        let t = &trips[0];
        assert_eq!(t.direction, Side::Buy);
        assert_eq!(t.gross_pnl.value(), dec!(20));
        assert_eq!(t.fees.value(), dec!(0.42));
        assert_eq!(t.net_pnl.value(), dec!(19.58));
        assert_eq!(t.duration_ms(), 1000);
        assert_eq!(t.max_abs_qty, dec!(2));
        assert_eq!(t.fill_count, 2);
        assert!(t.is_win());
    }

    #[test]
    fn scale_in_then_out_is_one_trip() {
        let fills = vec![
            fill(0, Side::Buy, dec!(1), dec!(100), dec!(0)),
            fill(100, Side::Buy, dec!(1), dec!(102), dec!(0)),
            fill(200, Side::Sell, dec!(1), dec!(105), dec!(0)),
            fill(300, Side::Sell, dec!(1), dec!(105), dec!(0)),
        ];
        let trips = round_trips_from_fills(&fills);
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].max_abs_qty, dec!(2));
        assert_eq!(trips[0].fill_count, 4);
        // avg entry 101, exit 105 on 2 units
        assert_eq!(trips[0].net_pnl.value(), dec!(8));
    }

    #[test]
    fn flip_closes_old_trip_and_opens_new() {
        let fills = vec![
            fill(0, Side::Buy, dec!(2), dec!(100), dec!(0)),
            fill(1000, Side::Sell, dec!(5), dec!(110), dec!(0)),
            fill(2000, Side::Buy, dec!(3), dec!(105), dec!(0)),
        ];
        let trips = round_trips_from_fills(&fills);
        assert_eq!(trips.len(), 2);

        assert_eq!(trips[0].direction, Side::Buy);
        assert_eq!(trips[0].net_pnl.value(), dec!(20));
        assert_eq!(trips[0].closed_at, Timestamp::from_millis(1000));

        assert_eq!(trips[1].direction, Side::Sell);
        assert_eq!(trips[1].opened_at, Timestamp::from_millis(1000));
        // short 3 @ 110, covered @ 105
        assert_eq!(trips[1].net_pnl.value(), dec!(15));
        assert_eq!(trips[1].max_abs_qty, dec!(3));
    }

    #[test]
    fn open_position_produces_no_trip() {
        let fills = vec![fill(0, Side::Buy, dec!(1), dec!(100), dec!(0))];
        assert!(round_trips_from_fills(&fills).is_empty());
    }

    #[test]
    fn symbols_are_tracked_independently() {
        let mut eth_open = fill(0, Side::Buy, dec!(1), dec!(2000), dec!(0));
        eth_open.symbol = Symbol::new("ETHUSDT");
        let mut eth_close = fill(500, Side::Sell, dec!(1), dec!(2010), dec!(0));
        eth_close.symbol = Symbol::new("ETHUSDT");

        let fills = vec![
            fill(0, Side::Buy, dec!(1), dec!(100), dec!(0)),
            eth_open,
            eth_close,
            fill(1000, Side::Sell, dec!(1), dec!(101), dec!(0)),
        ];
        let trips = round_trips_from_fills(&fills);
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].symbol.as_str(), "ETHUSDT");
        assert_eq!(trips[0].net_pnl.value(), dec!(10));
        assert_eq!(trips[1].symbol.as_str(), "BTCUSDT");
        assert_eq!(trips[1].net_pnl.value(), dec!(1));
    }

    #[test]
    fn summary_aggregates() {
        let fills = vec![
            fill(0, Side::Buy, dec!(1), dec!(100), dec!(0)),
            fill(1000, Side::Sell, dec!(1), dec!(110), dec!(0)),
            fill(2000, Side::Buy, dec!(1), dec!(100), dec!(0)),
            fill(4000, Side::Sell, dec!(1), dec!(95), dec!(0)),
        ];
        let summary = summarize_round_trips(&round_trips_from_fills(&fills));
        assert_eq!(summary.count, 2);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.losses, 1);
        assert_eq!(summary.total_net_pnl.value(), dec!(5));
        assert_eq!(summary.win_rate, dec!(0.5));
        assert_eq!(summary.avg_duration_ms, 1500);
        assert_eq!(summary.max_duration_ms, 2000);
    }

    #[test]
    fn empty_summary_is_zeroed() {
        let summary = summarize_round_trips(&[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.win_rate, Decimal::ZERO);
    }

    #[test]
    fn max_drawdown_peak_to_trough() {
        let curve: Vec<Quote> = [dec!(100), dec!(120), dec!(90), dec!(110), dec!(80)]
            .iter()
            .map(|v| Quote::new(*v))
            .collect();
        assert_eq!(max_drawdown(&curve).unwrap().value(), dec!(40));
        assert!(max_drawdown(&[]).is_none());
        assert_eq!(
            max_drawdown(&[Quote::new(dec!(5))]).unwrap().value(),
            dec!(0)
        );
    }
}
