//! Price resolution and the order quote computed from a cart snapshot.

use rust_decimal::{Decimal, prelude::ToPrimitive};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Effective selling price: the discount price when it is set and positive,
/// otherwise the list price.
pub fn current_price(price: Decimal, discount_price: Option<Decimal>) -> Decimal {
    match discount_price {
        Some(discount) if discount > Decimal::ZERO => discount,
        _ => price,
    }
}

/// Whole-number percentage saved by the discount, 0 when there is none.
pub fn discount_percent(price: Decimal, discount_price: Option<Decimal>) -> i32 {
    match discount_price {
        Some(discount) if discount > Decimal::ZERO && discount < price => {
            ((price - discount) / price * Decimal::ONE_HUNDRED)
                .round()
                .to_i32()
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Largest amount the `NUMERIC(10, 2)` money columns can store.
// 99_999_999.99 == mantissa 9_999_999_999 (0x2_540B_E3FF) at scale 2.
pub const MAX_MONEY: Decimal = Decimal::from_parts(0x540B_E3FF, 0x2, 0, false, 2);

pub const MAX_LINE_QUANTITY: i32 = 10_000;

pub fn check_quantity(quantity: i32) -> AppResult<()> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(AppError::InvalidQuantity)
    }
}

fn within_ceiling(amount: Option<Decimal>, what: &str) -> AppResult<Decimal> {
    match amount {
        Some(amount) if amount <= MAX_MONEY => Ok(amount),
        _ => Err(AppError::PriceComputation(format!(
            "{what} exceeds the maximum of {MAX_MONEY}"
        ))),
    }
}

pub fn line_total(unit_price: Decimal, quantity: i32) -> AppResult<Decimal> {
    within_ceiling(
        unit_price.checked_mul(Decimal::from(quantity)),
        &format!("{unit_price} x {quantity}"),
    )
}

/// One cart line joined with the product fields the order needs.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub cart_item_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub quantity: i32,
}

impl CartLine {
    pub fn unit_price(&self) -> AppResult<Decimal> {
        let resolved = current_price(self.price, self.discount_price);
        if resolved < Decimal::ZERO {
            return Err(AppError::PriceComputation(format!(
                "product {} has a negative price",
                self.product_id
            )));
        }
        Ok(resolved)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineSnapshot {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderQuote {
    pub lines: Vec<LineSnapshot>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub total_price: Decimal,
}

/// Price every line and add shipping. The result is frozen into the order and
/// never recomputed.
pub fn quote_order(lines: &[CartLine], shipping_cost: Option<Decimal>) -> AppResult<OrderQuote> {
    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }
    let shipping_cost = shipping_cost.unwrap_or(Decimal::ZERO);
    if shipping_cost < Decimal::ZERO {
        return Err(AppError::BadRequest(
            "shipping_cost must not be negative".into(),
        ));
    }

    let mut subtotal = Decimal::ZERO;
    let mut snapshots = Vec::with_capacity(lines.len());
    for line in lines {
        check_quantity(line.quantity)?;
        let unit_price = line.unit_price()?;
        let total = line_total(unit_price, line.quantity)?;
        subtotal = within_ceiling(subtotal.checked_add(total), "order subtotal")?;
        snapshots.push(LineSnapshot {
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            unit_price,
            quantity: line.quantity,
            line_total: total,
        });
    }

    let shipping_cost = within_ceiling(Some(shipping_cost), "shipping cost")?;
    let total_price = within_ceiling(subtotal.checked_add(shipping_cost), "order total")?;

    Ok(OrderQuote {
        lines: snapshots,
        subtotal,
        shipping_cost,
        total_price,
    })
}
