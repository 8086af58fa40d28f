use crate::models::ProposalItem;

/// Line total in minor currency units.
pub fn line_total(quantity: i32, unit_price: i64) -> i64 {
    i64::from(quantity) * unit_price
}

/// Derives a proposal's total amount from its current item set. Amounts are
/// integer minor units, so there is no rounding involved.
pub fn proposal_total(items: &[ProposalItem]) -> i64 {
    items
        .iter()
        .map(|item| line_total(item.quantity, item.unit_price))
        .sum()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn item(quantity: i32, unit_price: i64) -> ProposalItem {
        let now = Utc::now().naive_utc();
        ProposalItem {
            id: Uuid::new_v4(),
            proposal_id: Uuid::new_v4(),
            description: "item".to_string(),
            quantity,
            unit_price,
            total: line_total(quantity, unit_price),
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn empty_item_set_totals_zero() {
        assert_eq!(proposal_total(&[]), 0);
    }

    #[test]
    fn sums_quantity_times_unit_price() {
        let items = vec![item(2, 1000), item(1, 500)];
        assert_eq!(proposal_total(&items), 2500);
    }

    #[test]
    fn ignores_stale_denormalized_totals() {
        let mut stale = item(3, 1000);
        stale.total = 1;
        assert_eq!(proposal_total(&[stale]), 3000);
    }

    #[test]
    fn line_total_widens_before_multiplying() {
        assert_eq!(line_total(i32::MAX, 100), i64::from(i32::MAX) * 100);
    }
}
