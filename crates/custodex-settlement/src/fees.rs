//! Fee and quantity calculator.
//!
//! Pure functions, no I/O. Every participant pays a percentage of what it
//! *receives*: the buyer in base units, the seller in quote units. Makers
//! (resting orders) get `fees_discount` knocked off the rate.

use custodex_types::{Currency, constants};
use rust_decimal::{Decimal, RoundingStrategy};

/// Quantity two orders can settle against each other.
#[must_use]
pub fn fill_quantity(incoming_remaining: Decimal, resting_remaining: Decimal) -> Decimal {
    incoming_remaining.min(resting_remaining).max(Decimal::ZERO)
}

/// Effective fee rate, in percent, for a participant receiving `currency`.
#[must_use]
pub fn fee_rate(currency: &Currency, is_maker: bool) -> Decimal {
    if is_maker {
        (currency.fees_trade - currency.fees_discount).max(Decimal::ZERO)
    } else {
        currency.fees_trade
    }
}

/// `gross × rate%`, truncated to ledger precision so the fee never exceeds
/// its exact value.
#[must_use]
pub fn fee_amount(gross: Decimal, rate_percent: Decimal) -> Decimal {
    (gross * rate_percent / Decimal::from(constants::FEE_PERCENT_BASE))
        .round_dp_with_strategy(constants::QTY_PRECISION, RoundingStrategy::ToZero)
}

/// What one participant receives from a fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    pub symbol: String,
    pub gross: Decimal,
    pub fee: Decimal,
    pub is_maker: bool,
}

impl Leg {
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.gross - self.fee
    }
}

/// Full balance breakdown of a single fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillBreakdown {
    pub quantity: Decimal,
    pub price: Decimal,
    /// Base credited to the buyer.
    pub buyer: Leg,
    /// Quote credited to the seller.
    pub seller: Leg,
    /// Quote returned to an incoming buyer whose bid beat the trade price.
    pub refund: Decimal,
}

/// Price one fill.
///
/// `trade_price` is the resting order's price. `incoming_price` matters only
/// when the incoming order is the buyer: the buyer committed
/// `quantity × incoming_price` at placement and gets the difference back.
#[must_use]
pub fn price_fill(
    quantity: Decimal,
    trade_price: Decimal,
    incoming_price: Decimal,
    buyer_is_incoming: bool,
    base: &Currency,
    quote: &Currency,
) -> FillBreakdown {
    let buyer_is_maker = !buyer_is_incoming;
    let seller_is_maker = buyer_is_incoming;

    let buyer_fee = fee_amount(quantity, fee_rate(base, buyer_is_maker));
    let seller_gross = quantity * trade_price;
    let seller_fee = fee_amount(seller_gross, fee_rate(quote, seller_is_maker));

    let refund = if buyer_is_incoming && incoming_price > trade_price {
        quantity * (incoming_price - trade_price)
    } else {
        Decimal::ZERO
    };

    FillBreakdown {
        quantity,
        price: trade_price,
        buyer: Leg {
            symbol: base.symbol.clone(),
            gross: quantity,
            fee: buyer_fee,
            is_maker: buyer_is_maker,
        },
        seller: Leg {
            symbol: quote.symbol.clone(),
            gross: seller_gross,
            fee: seller_fee,
            is_maker: seller_is_maker,
        },
        refund,
    }
}
