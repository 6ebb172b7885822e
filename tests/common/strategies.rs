use autoassign_core::models::CandidateMetrics;
use autoassign_core::scoring::ScoringWeights;
use autoassign_core::state_machine::EntryStatus;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

pub fn strategy_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Strategy for optional last-assignment instants up to 90 days back
pub fn last_assignment_strategy() -> impl Strategy<Value = Option<DateTime<Utc>>> {
    prop::option::of((0i64..90 * 24).prop_map(|hours| strategy_now() - Duration::hours(hours)))
}

/// Strategy for one candidate with signals inside their documented ranges
pub fn candidate_strategy(freelancer_id: i64) -> impl Strategy<Value = CandidateMetrics> {
    (
        last_assignment_strategy(),
        0.0f64..=5.0,
        0.0f64..=1.0,
        0.0f64..5_000.0,
        0u32..6,
        any::<bool>(),
    )
        .prop_map(
            move |(last, rating, completion, earnings, active, newcomer)| CandidateMetrics {
                freelancer_id,
                last_assignment_at: last,
                rating,
                completion_rate: completion,
                earnings_balance: earnings,
                active_assignment_count: active,
                is_newcomer: newcomer,
            },
        )
}

/// Strategy for a candidate set with unique freelancer ids
pub fn candidate_set_strategy(max: usize) -> impl Strategy<Value = Vec<CandidateMetrics>> {
    (1..=max).prop_flat_map(|len| {
        (1..=len as i64)
            .map(candidate_strategy)
            .collect::<Vec<_>>()
    })
}

/// Strategy for weight sets with at least one positive factor
pub fn weights_strategy() -> impl Strategy<Value = ScoringWeights> {
    (0.0f64..10.0, 0.0f64..10.0, 0.0f64..10.0, 0.0f64..10.0, 0.0f64..10.0)
        .prop_filter("at least one positive weight", |(a, b, c, d, e)| {
            a + b + c + d + e > 0.01
        })
        .prop_map(|(recency, rating, completion, earnings, inclusion)| ScoringWeights {
            recency,
            rating,
            completion_quality: completion,
            earnings_balance: earnings,
            inclusion,
        })
}

/// Power-of-two scale factors multiply exactly in binary floating point
pub fn exact_scale_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.25), Just(0.5), Just(2.0), Just(4.0), Just(1024.0)]
}

pub fn page_size_strategy() -> impl Strategy<Value = u32> {
    1u32..=12
}

pub fn status_strategy() -> impl Strategy<Value = EntryStatus> {
    prop::sample::select(EntryStatus::ALL.to_vec())
}
