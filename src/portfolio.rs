// 7.0: positions, realized pnl, fees, funding. every quantity change in here
// is explained by a fill or a funding application, nothing else.
// 7.2 has the increase/reduce/flip logic, 7.3 the funding gate.

use crate::types::{Price, Quote, Side, SignedSize, Symbol, Timestamp};
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Open position for one symbol. Flat positions keep their slot (a symbol that
/// traded once stays in the map with zero qty).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Base quantity, +long / -short.
    pub qty: SignedSize,
    /// Average entry price of the open quantity. None while flat.
    pub avg_price: Option<Price>,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            qty: SignedSize::zero(),
            avg_price: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.qty.is_zero()
    }

    // 7.1: paper gains/losses at a mark price. zero while flat.
    pub fn unrealized_pnl(&self, mark_price: Price) -> Quote {
        match self.avg_price {
            Some(entry) if !self.qty.is_zero() => {
                Quote::new(self.qty.value() * (mark_price.value() - entry.value()))
            }
            _ => Quote::zero(),
        }
    }

    pub fn notional(&self, mark_price: Price) -> Quote {
        Quote::new(self.qty.abs() * mark_price.value())
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}

/// Position + realized PnL tracker for futures-style replays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Portfolio {
    positions: HashMap<Symbol, Position>,
    pub realized_pnl: Quote,
    pub fees_paid: Quote,
    last_funding_applied: HashMap<Symbol, Timestamp>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = (&Symbol, &Position)> {
        self.positions.iter()
    }

    fn pos_mut(&mut self, symbol: &Symbol) -> &mut Position {
        self.positions.entry(symbol.clone()).or_default()
    }

    // 7.2: apply one fill. weighted-average entry on same-direction adds,
    // proportional realization on reductions, close + reopen on a flip.
    // Fees are always a cost: subtracted from realized pnl and accumulated.
    pub fn apply_fill(&mut self, symbol: &Symbol, side: Side, qty: Decimal, price: Price, fee: Quote) {
        debug_assert!(qty > Decimal::ZERO);
        if qty <= Decimal::ZERO {
            return;
        }

        self.fees_paid = self.fees_paid.add(fee);
        self.realized_pnl = self.realized_pnl.sub(fee);

        let pos = self.pos_mut(symbol);
        let signed = side.sign() * qty;
        let old = pos.qty.value();
        let new = old + signed;

        // Was flat: open in the fill direction.
        if old.is_zero() {
            if !new.is_zero() {
                pos.qty = SignedSize::new(new);
                pos.avg_price = Some(price);
            }
            return;
        }

        let entry = pos.avg_price.unwrap_or(price);
        let direction = old.signum();

        // Full close without flip.
        if new.is_zero() {
            let pnl = old.abs() * (price.value() - entry.value()) * direction;
            *pos = Position::flat();
            self.realized_pnl = self.realized_pnl.add(Quote::new(pnl));
            return;
        }

        let same_direction = (old > Decimal::ZERO) == (new > Decimal::ZERO);

        if same_direction {
            if new.abs() > old.abs() {
                // Increasing exposure: weighted-average entry.
                let old_notional = old.abs() * entry.value();
                let add_notional = signed.abs() * price.value();
                pos.avg_price =
                    Some(Price::new_unchecked((old_notional + add_notional) / new.abs()));
                pos.qty = SignedSize::new(new);
            } else {
                // Reducing without flipping: realize the closed portion.
                let closed = signed.abs();
                let pnl = closed * (price.value() - entry.value()) * direction;
                pos.qty = SignedSize::new(new);
                self.realized_pnl = self.realized_pnl.add(Quote::new(pnl));
            }
            return;
        }

        // Direction flip: close the old position fully, open the remainder at
        // the fill price.
        let pnl = old.abs() * (price.value() - entry.value()) * direction;
        pos.qty = SignedSize::new(new);
        pos.avg_price = Some(price);
        self.realized_pnl = self.realized_pnl.add(Quote::new(pnl));
    }

    /// Funding pnl for a perp position: `-qty * mark * rate`.
    /// Positive rate: longs pay, shorts receive.
    pub fn apply_funding(&mut self, symbol: &Symbol, mark_price: Price, funding_rate: Decimal) -> Quote {
        let Some(pos) = self.positions.get(symbol) else {
            return Quote::zero();
        };
        if pos.is_flat() {
            return Quote::zero();
        }

        let pnl = Quote::new(-(pos.qty.value() * mark_price.value()) * funding_rate);
        self.realized_pnl = self.realized_pnl.add(pnl);
        pnl
    }

    // 7.3: exactly-once funding per (symbol, funding epoch). The epoch is
    // recorded even when the position is flat, so a later duplicate mark-price
    // event for the same epoch cannot apply anything.
    pub fn apply_funding_at(
        &mut self,
        symbol: &Symbol,
        mark_price: Price,
        funding_rate: Decimal,
        funding_time: Timestamp,
    ) -> Option<Quote> {
        if let Some(last) = self.last_funding_applied.get(symbol) {
            if funding_time <= *last {
                return None;
            }
        }
        self.last_funding_applied.insert(symbol.clone(), funding_time);
        Some(self.apply_funding(symbol, mark_price, funding_rate))
    }

    pub fn last_funding_applied(&self, symbol: &Symbol) -> Option<Timestamp> {
        self.last_funding_applied.get(symbol).copied()
    }

    /// Realized pnl plus paper pnl over the supplied marks.
    pub fn equity(&self, marks: &HashMap<Symbol, Price>) -> Quote {
        let unrealized: Quote = self
            .positions
            .iter()
            .filter_map(|(sym, pos)| marks.get(sym).map(|m| pos.unrealized_pnl(*m)))
            .sum();
        self.realized_pnl.add(unrealized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sym() -> Symbol {
        Symbol::new("BTCUSDT")
    }

    fn px(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    #[test]
    fn open_then_close_realizes_pnl_net_of_fees() {
        let mut pf = Portfolio::new();

        pf.apply_fill(&sym(), Side::Buy, dec!(1), px(dec!(100)), Quote::new(dec!(0.1)));
        let pos = pf.position(&sym()).unwrap();
        assert_eq!(pos.qty.value(), dec!(1));
        assert_eq!(pos.avg_price.unwrap().value(), dec!(100));
        assert_eq!(pf.fees_paid.value(), dec!(0.1));
        assert_eq!(pf.realized_pnl.value(), dec!(-0.1));

        pf.apply_fill(&sym(), Side::Sell, dec!(1), px(dec!(110)), Quote::new(dec!(0.1)));
        let pos = pf.position(&sym()).unwrap();
        assert!(pos.is_flat());
        assert!(pos.avg_price.is_none());
        // (110 - 100) * 1 - 0.1 - 0.1 = 9.8
        assert_eq!(pf.realized_pnl.value(), dec!(9.8));
        assert_eq!(pf.fees_paid.value(), dec!(0.2));
    }

    #[test]
    fn same_direction_add_averages_entry() {
        let mut pf = Portfolio::new();
        pf.apply_fill(&sym(), Side::Buy, dec!(1), px(dec!(100)), Quote::zero());
        pf.apply_fill(&sym(), Side::Buy, dec!(1), px(dec!(102)), Quote::zero());

        let pos = pf.position(&sym()).unwrap();
        assert_eq!(pos.qty.value(), dec!(2));
        assert_eq!(pos.avg_price.unwrap().value(), dec!(101));
        assert_eq!(pf.realized_pnl.value(), dec!(0));
    }

    #[test]
    fn partial_reduce_realizes_proportionally() {
        let mut pf = Portfolio::new();
        pf.apply_fill(&sym(), Side::Buy, dec!(2), px(dec!(100)), Quote::zero());
        pf.apply_fill(&sym(), Side::Sell, dec!(1), px(dec!(105)), Quote::zero());

        let pos = pf.position(&sym()).unwrap();
        assert_eq!(pos.qty.value(), dec!(1));
        // Entry unchanged on a reduction.
        assert_eq!(pos.avg_price.unwrap().value(), dec!(100));
        assert_eq!(pf.realized_pnl.value(), dec!(5));
    }

    #[test]
    fn flip_realizes_closed_portion_and_reopens() {
        let mut pf = Portfolio::new();
        pf.apply_fill(&sym(), Side::Buy, dec!(1), px(dec!(100)), Quote::zero());
        pf.apply_fill(&sym(), Side::Sell, dec!(3), px(dec!(110)), Quote::zero());

        let pos = pf.position(&sym()).unwrap();
        assert_eq!(pos.qty.value(), dec!(-2));
        assert_eq!(pos.avg_price.unwrap().value(), dec!(110));
        assert_eq!(pf.realized_pnl.value(), dec!(10));
    }

    #[test]
    fn short_reduce_realizes_with_correct_sign() {
        let mut pf = Portfolio::new();
        pf.apply_fill(&sym(), Side::Sell, dec!(2), px(dec!(100)), Quote::zero());
        pf.apply_fill(&sym(), Side::Buy, dec!(1), px(dec!(90)), Quote::zero());

        // Short profits when buying back lower: (100 - 90) * 1.
        assert_eq!(pf.realized_pnl.value(), dec!(10));
        assert_eq!(pf.position(&sym()).unwrap().qty.value(), dec!(-1));
    }

    #[test]
    fn funding_sign_longs_pay_on_positive_rate() {
        let mut pf = Portfolio::new();
        pf.apply_fill(&sym(), Side::Buy, dec!(1), px(dec!(100)), Quote::zero());

        let pnl = pf.apply_funding(&sym(), px(dec!(100)), dec!(0.01));
        assert_eq!(pnl.value(), dec!(-1));
        assert_eq!(pf.realized_pnl.value(), dec!(-1));
    }

    #[test]
    fn funding_short_receives_on_positive_rate() {
        let mut pf = Portfolio::new();
        pf.apply_fill(&sym(), Side::Sell, dec!(1), px(dec!(100)), Quote::zero());

        let pnl = pf.apply_funding(&sym(), px(dec!(100)), dec!(0.01));
        assert_eq!(pnl.value(), dec!(1));
    }

    #[test]
    fn funding_applies_once_per_epoch() {
        let mut pf = Portfolio::new();
        pf.apply_fill(&sym(), Side::Sell, dec!(1), px(dec!(100)), Quote::zero());

        let epoch = Timestamp::from_millis(1_000);
        assert!(pf.apply_funding_at(&sym(), px(dec!(100)), dec!(0.01), epoch).is_some());
        assert!(pf.apply_funding_at(&sym(), px(dec!(101)), dec!(0.02), epoch).is_none());
        assert_eq!(pf.realized_pnl.value(), dec!(1));

        // A later epoch applies again.
        let next = Timestamp::from_millis(2_000);
        assert!(pf.apply_funding_at(&sym(), px(dec!(100)), dec!(0.01), next).is_some());
    }

    #[test]
    fn flat_position_pays_no_funding() {
        let mut pf = Portfolio::new();
        let pnl = pf.apply_funding(&sym(), px(dec!(100)), dec!(0.01));
        assert_eq!(pnl, Quote::zero());
    }

    #[test]
    fn equity_combines_realized_and_paper_pnl() {
        let mut pf = Portfolio::new();
        pf.apply_fill(&sym(), Side::Buy, dec!(1), px(dec!(100)), Quote::zero());

        let mut marks = HashMap::new();
        marks.insert(sym(), px(dec!(105)));
        assert_eq!(pf.equity(&marks).value(), dec!(5));
    }
}
