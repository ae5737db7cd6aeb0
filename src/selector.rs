// 🏷️ Best-Price Selector - the price floor across time
//
// Walks observations newest → oldest. An observation survives when it is a
// new all-time low (strictly cheaper than everything newer), when it is the
// highlighted one, or when it is the first sighting of its package. Anything
// else is folded, as a count, into the nearest newer survivor.

use crate::error::CatalogError;
use crate::model::PriceObservation;
use crate::rate::Rate;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    None,
    CurrentBest,
    Highlighted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedPrice {
    pub observation: PriceObservation,
    pub rate: Rate,
    pub mark: Mark,

    /// Older observations folded into this entry
    pub discarded: usize,
}

/// Select the best-price frontier.
///
/// `observations` must be in the default query order (ascending date, higher
/// rate first within a day). The result is in the same ascending-date order.
pub fn select_best_prices(
    observations: &[PriceObservation],
    highlight_id: Option<i64>,
) -> Result<Vec<SelectedPrice>, CatalogError> {
    let mut minimum_rate = f64::INFINITY;
    let mut seen_packages: HashSet<i64> = HashSet::new();
    let mut selected: Vec<SelectedPrice> = Vec::new();

    for obs in observations.iter().rev() {
        let rate = obs.rate()?;

        let new_low = rate.value < minimum_rate;
        let highlighted = highlight_id == Some(obs.id);
        let first_sighting = seen_packages.insert(obs.package_id);

        if new_low {
            minimum_rate = rate.value;
        }

        if new_low || highlighted || first_sighting {
            let mark = if highlighted {
                Mark::Highlighted
            } else if new_low {
                Mark::CurrentBest
            } else {
                Mark::None
            };

            selected.push(SelectedPrice {
                observation: obs.clone(),
                rate,
                mark,
                discarded: 0,
            });
        } else if let Some(tail) = selected.last_mut() {
            tail.discarded += 1;
        }
    }

    selected.reverse();

    tracing::debug!(
        input = observations.len(),
        selected = selected.len(),
        "selected best prices"
    );

    Ok(selected)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitCode;
    use chrono::NaiveDate;

    /// Observation for 1 unit, so the rate equals the price in currency units
    fn create_test_observation(id: i64, package_id: i64, day: u32, price: i64) -> PriceObservation {
        PriceObservation {
            id,
            price,
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            store_name: "Corner".to_string(),
            package_id,
            package_amount: 1.0,
            package_extra: String::new(),
            product_id: 1,
            product_name: "Eggs".to_string(),
            product_extra: String::new(),
            product_unit: UnitCode::Unit,
            brand_name: String::new(),
            barcode: None,
        }
    }

    fn rates(selected: &[SelectedPrice]) -> Vec<f64> {
        selected.iter().map(|s| s.rate.value).collect()
    }

    #[test]
    fn test_empty_input() {
        let selected = select_best_prices(&[], Some(3)).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn test_older_worse_price_is_folded() {
        // 5.00 (oldest), 3.00, 4.00 (newest), same package
        let observations = vec![
            create_test_observation(1, 10, 1, 500),
            create_test_observation(2, 10, 2, 300),
            create_test_observation(3, 10, 3, 400),
        ];

        let selected = select_best_prices(&observations, None).unwrap();

        assert_eq!(rates(&selected), vec![3.0, 4.0]);
        assert_eq!(selected[0].discarded, 1);
        assert_eq!(selected[1].discarded, 0);
        assert_eq!(selected[0].mark, Mark::CurrentBest);
        assert_eq!(selected[1].mark, Mark::CurrentBest);
    }

    #[test]
    fn test_output_is_ascending_by_date() {
        let observations = vec![
            create_test_observation(1, 10, 1, 900),
            create_test_observation(2, 11, 5, 800),
            create_test_observation(3, 12, 9, 700),
        ];

        let selected = select_best_prices(&observations, None).unwrap();
        let days: Vec<u32> = selected
            .iter()
            .map(|s| chrono::Datelike::day(&s.observation.date))
            .collect();

        assert_eq!(days, vec![1, 5, 9]);
    }

    #[test]
    fn test_equal_rates_keep_every_package() {
        let observations = vec![
            create_test_observation(1, 10, 1, 250),
            create_test_observation(2, 11, 2, 250),
            create_test_observation(3, 12, 3, 250),
        ];

        let selected = select_best_prices(&observations, None).unwrap();
        let packages: Vec<i64> = selected.iter().map(|s| s.observation.package_id).collect();

        assert_eq!(packages, vec![10, 11, 12]);
        // Only the newest is a strict new low
        assert_eq!(selected[2].mark, Mark::CurrentBest);
        assert_eq!(selected[1].mark, Mark::None);
        assert_eq!(selected[0].mark, Mark::None);
    }

    #[test]
    fn test_equal_rate_same_package_is_not_a_new_low() {
        let observations = vec![
            create_test_observation(1, 10, 1, 250),
            create_test_observation(2, 10, 2, 250),
        ];

        let selected = select_best_prices(&observations, None).unwrap();

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].observation.id, 2);
        assert_eq!(selected[0].discarded, 1);
    }

    #[test]
    fn test_highlight_keeps_worse_observation_without_moving_minimum() {
        let observations = vec![
            create_test_observation(1, 10, 1, 350),
            create_test_observation(2, 10, 2, 900),
            create_test_observation(3, 10, 3, 300),
        ];

        let selected = select_best_prices(&observations, Some(2)).unwrap();

        assert_eq!(rates(&selected), vec![9.0, 3.0]);
        assert_eq!(selected[0].mark, Mark::Highlighted);
        // 3.50 is still worse than the 3.00 floor, so it folds into the highlighted entry
        assert_eq!(selected[0].discarded, 1);
        assert_eq!(selected[1].mark, Mark::CurrentBest);
    }

    #[test]
    fn test_highlighted_new_low_still_lowers_minimum() {
        let observations = vec![
            create_test_observation(1, 10, 1, 250),
            create_test_observation(2, 10, 2, 200),
            create_test_observation(3, 10, 3, 400),
        ];

        let selected = select_best_prices(&observations, Some(2)).unwrap();

        assert_eq!(rates(&selected), vec![2.0, 4.0]);
        assert_eq!(selected[0].mark, Mark::Highlighted);
        assert_eq!(selected[0].discarded, 1);
    }

    #[test]
    fn test_unknown_highlight_is_ignored() {
        let observations = vec![
            create_test_observation(1, 10, 1, 500),
            create_test_observation(2, 10, 2, 400),
        ];

        let with = select_best_prices(&observations, Some(99)).unwrap();
        let without = select_best_prices(&observations, None).unwrap();

        assert_eq!(with, without);
    }

    #[test]
    fn test_discard_count_accounts_for_every_observation() {
        let observations = vec![
            create_test_observation(1, 10, 1, 800),
            create_test_observation(2, 10, 2, 700),
            create_test_observation(3, 11, 3, 900),
            create_test_observation(4, 10, 4, 650),
            create_test_observation(5, 11, 5, 950),
            create_test_observation(6, 10, 6, 600),
        ];

        let selected = select_best_prices(&observations, None).unwrap();
        let total: usize = selected.iter().map(|s| 1 + s.discarded).sum();

        assert_eq!(total, observations.len());
        // Floor only ever decreases when read newest → oldest
        let lows: Vec<f64> = selected
            .iter()
            .rev()
            .filter(|s| s.mark == Mark::CurrentBest)
            .map(|s| s.rate.value)
            .collect();
        assert!(lows.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn test_invalid_amount_propagates() {
        let mut bad = create_test_observation(1, 10, 1, 100);
        bad.package_amount = 0.0;

        assert_eq!(
            select_best_prices(&[bad], None),
            Err(CatalogError::InvalidAmount(0.0))
        );
    }
}
