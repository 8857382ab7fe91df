use enrollpay::domain::money::Money;
use enrollpay::domain::schedule::InstallmentSchedule;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn amounts(schedule: &InstallmentSchedule) -> Vec<Decimal> {
    schedule.amounts().iter().map(Money::value).collect()
}

#[test]
fn test_schedule_sum_matches_final_amount() {
    let mut rng = rand::thread_rng();
    for _ in 0..5_000 {
        let final_amount = Money::new(Decimal::from(rng.gen_range(0u64..=2_000_000)));
        let periods = rng.gen_range(1u32..=36);
        let schedule = InstallmentSchedule::compute(final_amount, periods).unwrap();

        assert_eq!(schedule.len(), periods);
        assert_eq!(
            schedule.total(),
            final_amount,
            "sum mismatch for {} over {} periods",
            final_amount,
            periods
        );
        // Every period but one boundary period holds the base amount
        let base = Money::new(final_amount.value() / Decimal::from(periods)).round_whole();
        let off_base = schedule.amounts().iter().filter(|a| **a != base).count();
        assert!(off_base <= 1);
    }
}

#[test]
fn test_small_totals_only_adjust_the_first_period_downwards() {
    for final_amount in 0..50 {
        for periods in 1..=12 {
            let schedule =
                InstallmentSchedule::compute(Money::new(Decimal::from(final_amount)), periods)
                    .unwrap();
            // A shortfall can push the first period to zero or below; the rest never go negative
            assert!(schedule.amounts()[1..].iter().all(|a| !a.is_negative()));
            assert_eq!(schedule.total(), Money::new(Decimal::from(final_amount)));
        }
    }
}

#[test]
fn test_documented_scenarios() {
    let even = InstallmentSchedule::compute(Money::new(dec!(17670)), 6).unwrap();
    assert_eq!(amounts(&even), vec![dec!(2945); 6]);

    let overflow = InstallmentSchedule::compute(Money::new(dec!(10000)), 3).unwrap();
    assert_eq!(amounts(&overflow), vec![dec!(3333), dec!(3333), dec!(3334)]);

    // 2 / 4 rounds up to a base of 1, so the first period absorbs -2
    let shortfall = InstallmentSchedule::compute(Money::new(dec!(2)), 4).unwrap();
    assert_eq!(amounts(&shortfall), vec![dec!(-1), dec!(1), dec!(1), dec!(1)]);
    assert_eq!(shortfall.next_payable(|_| false), Some(2));
}
