//! Property-based coverage of the cost model (spec §4.1 "Cost model"):
//! non-negative, monotone in each token count, additive across a split of
//! the same call, and always carries <=6 decimal places of precision.

use form_mapper_control_plane::budget::PriceTable;
use form_mapper_control_plane::domain::OperationType;
use proptest::prelude::*;

fn text_and_vision_ops() -> impl Strategy<Value = OperationType> {
    prop_oneof![
        Just(OperationType::GenerateFormSteps),
        Just(OperationType::RegenerateSteps),
        Just(OperationType::AnalyzeError),
        Just(OperationType::VerifyUiDefects),
        Just(OperationType::IsSubmissionButton),
        Just(OperationType::GetNavigationClickables),
        Just(OperationType::VerifyJunction),
    ]
}

proptest! {
    #[test]
    fn cost_is_never_negative(op in text_and_vision_ops(), input in 0u64..50_000_000, output in 0u64..50_000_000) {
        let prices = PriceTable::default();
        prop_assert!(prices.cost(op, input, output) >= 0.0);
    }

    #[test]
    fn cost_is_monotone_in_input_tokens(op in text_and_vision_ops(), base in 0u64..10_000_000, extra in 0u64..10_000_000, output in 0u64..10_000_000) {
        let prices = PriceTable::default();
        let smaller = prices.cost(op, base, output);
        let larger = prices.cost(op, base + extra, output);
        prop_assert!(larger >= smaller);
    }

    #[test]
    fn cost_is_monotone_in_output_tokens(op in text_and_vision_ops(), input in 0u64..10_000_000, base in 0u64..10_000_000, extra in 0u64..10_000_000) {
        let prices = PriceTable::default();
        let smaller = prices.cost(op, input, base);
        let larger = prices.cost(op, input, base + extra);
        prop_assert!(larger >= smaller);
    }

    /// Splitting one call's tokens into two sequential calls and summing
    /// their cost must equal costing the combined token counts once,
    /// within 6-decimal rounding — this is the per-call additivity the
    /// budget counter's atomic increments rely on (spec §8: "total
    /// recorded cost equals sum of per-call costs").
    #[test]
    fn cost_is_additive_across_a_split_of_the_same_call(
        op in text_and_vision_ops(),
        input_a in 0u64..5_000_000,
        input_b in 0u64..5_000_000,
        output_a in 0u64..5_000_000,
        output_b in 0u64..5_000_000,
    ) {
        let prices = PriceTable::default();
        let whole = prices.cost(op, input_a + input_b, output_a + output_b);
        let split = prices.cost(op, input_a, output_a) + prices.cost(op, input_b, output_b);
        prop_assert!((whole - split).abs() < 1e-6);
    }

    #[test]
    fn cost_never_exceeds_six_decimal_places(op in text_and_vision_ops(), input in 0u64..100_000_000, output in 0u64..100_000_000) {
        let prices = PriceTable::default();
        let cost = prices.cost(op, input, output);
        let rounded = (cost * 1_000_000.0).round() / 1_000_000.0;
        prop_assert!((cost - rounded).abs() < 1e-9);
    }
}
