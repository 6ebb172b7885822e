//! Property-based tests for ranking, scoring, pagination and transitions

mod common;

use autoassign_core::models::{Metadata, NewQueueEntry, QueueEntry, TargetRef, TargetType};
use autoassign_core::orchestration::{BuilderConfig, FairnessConfig, QueueBuilder};
use autoassign_core::scoring::{FairnessScorer, PartialWeights, ScoreBreakdown, ScoringWeights};
use autoassign_core::services::QueueFilter;
use autoassign_core::state_machine::{EntryStateMachine, EntryStatus, TransitionRequest};
use common::strategies::*;
use common::TestEngine;
use proptest::prelude::*;
use std::collections::HashSet;

fn builder_config(limit: u32, ensure_newcomer: bool) -> BuilderConfig {
    BuilderConfig {
        limit,
        expires_in_minutes: 60,
        weights: PartialWeights::default(),
        fairness: FairnessConfig {
            ensure_newcomer,
            ..FairnessConfig::default()
        },
        project_value: None,
        metadata: Metadata::new(),
    }
}

fn target() -> TargetRef {
    TargetRef::new(TargetType::Gig, 7)
}

fn entry_in(status: EntryStatus) -> QueueEntry {
    let mut entry = NewQueueEntry {
        target_id: 7,
        target_type: TargetType::Gig,
        freelancer_id: 1,
        position: 1,
        score: 50.0,
        priority_bucket: None,
        weights: ScoringWeights::default(),
        breakdown: ScoreBreakdown::default(),
        project_value: None,
        metadata: Metadata::new(),
        invitation_ttl_minutes: 60,
    }
    .into_entry(1, 1, strategy_now());
    entry.status = status;
    entry
}

proptest! {
    #[test]
    fn test_build_is_deterministic(
        candidates in candidate_set_strategy(25),
        weights in weights_strategy(),
        ensure_newcomer in any::<bool>(),
        limit in 1u32..30,
    ) {
        let builder = QueueBuilder::new(FairnessScorer::default(), weights, 100);
        let config = builder_config(limit, ensure_newcomer);

        let first = builder.rank_candidates(target(), candidates.clone(), &config, strategy_now()).unwrap();
        let second = builder.rank_candidates(target(), candidates, &config, strategy_now()).unwrap();

        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_positions_contiguous_and_scores_ordered(
        candidates in candidate_set_strategy(25),
        weights in weights_strategy(),
        limit in 1u32..30,
    ) {
        let builder = QueueBuilder::new(FairnessScorer::default(), weights, 100);
        let built = builder
            .rank_candidates(target(), candidates.clone(), &builder_config(limit, false), strategy_now())
            .unwrap();

        prop_assert_eq!(built.drafts.len(), candidates.len().min(limit as usize));
        for (index, draft) in built.drafts.iter().enumerate() {
            prop_assert_eq!(draft.position, index as i32 + 1);
        }
        for pair in built.drafts.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
        let ids: HashSet<i64> = built.drafts.iter().map(|d| d.freelancer_id).collect();
        prop_assert_eq!(ids.len(), built.drafts.len());
    }

    #[test]
    fn test_scores_invariant_under_exact_weight_scaling(
        candidates in candidate_set_strategy(10),
        weights in weights_strategy(),
        k in exact_scale_strategy(),
    ) {
        let scorer = FairnessScorer::default();
        let scaled = ScoringWeights {
            recency: weights.recency * k,
            rating: weights.rating * k,
            completion_quality: weights.completion_quality * k,
            earnings_balance: weights.earnings_balance * k,
            inclusion: weights.inclusion * k,
        };
        for candidate in &candidates {
            let base = scorer.score(candidate, &weights, strategy_now()).unwrap();
            let other = scorer.score(candidate, &scaled, strategy_now()).unwrap();
            prop_assert_eq!(base.score, other.score);
        }
    }

    #[test]
    fn test_scores_stable_under_any_positive_scaling(
        candidates in candidate_set_strategy(10),
        weights in weights_strategy(),
        k in 0.01f64..100.0,
    ) {
        let scorer = FairnessScorer::default();
        let scaled = ScoringWeights {
            recency: weights.recency * k,
            rating: weights.rating * k,
            completion_quality: weights.completion_quality * k,
            earnings_balance: weights.earnings_balance * k,
            inclusion: weights.inclusion * k,
        };
        for candidate in &candidates {
            let base = scorer.score(candidate, &weights, strategy_now()).unwrap();
            let other = scorer.score(candidate, &scaled, strategy_now()).unwrap();
            // Rounding to four decimals can differ by at most one unit
            prop_assert!((base.score - other.score).abs() <= 1e-4 + 1e-9);
        }
    }

    #[test]
    fn test_scores_within_range(
        candidates in candidate_set_strategy(10),
        weights in weights_strategy(),
    ) {
        let scorer = FairnessScorer::default();
        for candidate in &candidates {
            let outcome = scorer.score(candidate, &weights, strategy_now()).unwrap();
            prop_assert!((0.0..=100.0).contains(&outcome.score));
        }
    }

    #[test]
    fn test_reserved_slot_goes_to_best_eligible_newcomer(
        candidates in candidate_set_strategy(20),
        weights in weights_strategy(),
        limit in 1u32..25,
    ) {
        let builder = QueueBuilder::new(FairnessScorer::default(), weights, 100);
        let config = builder_config(limit, true);
        let built = builder
            .rank_candidates(target(), candidates.clone(), &config, strategy_now())
            .unwrap();

        let any_eligible = candidates
            .iter()
            .any(|c| config.fairness.is_reservation_eligible(c, strategy_now()));

        if any_eligible {
            let first = &built.drafts[0];
            let reserved = built.reserved_newcomer.unwrap();
            prop_assert_eq!(first.freelancer_id, reserved);
            prop_assert_eq!(first.priority_bucket, Some(1));
            let chosen = candidates.iter().find(|c| c.freelancer_id == reserved).unwrap();
            prop_assert!(config.fairness.is_reservation_eligible(chosen, strategy_now()));
            prop_assert!(built.drafts[1..].iter().all(|d| d.priority_bucket.is_none()));
        } else {
            prop_assert!(built.reserved_newcomer.is_none());
            prop_assert!(built.drafts.iter().all(|d| d.priority_bucket.is_none()));
        }
    }

    #[test]
    fn test_transitions_follow_the_table(
        from in status_strategy(),
        to in status_strategy(),
        deadline_passed in any::<bool>(),
    ) {
        let mut entry = entry_in(from);
        if from == EntryStatus::Notified {
            let offset = chrono::Duration::minutes(if deadline_passed { -1 } else { 1 });
            entry.expires_at = Some(strategy_now() + offset);
        }
        // Deadline only bounds transitions out of an open invitation
        let deadline_allows = from != EntryStatus::Notified
            || match to {
                EntryStatus::Expired => deadline_passed,
                EntryStatus::Accepted | EntryStatus::Declined => !deadline_passed,
                _ => true,
            };
        match TransitionRequest::to_status(to).to_event() {
            None => prop_assert_eq!(to, EntryStatus::Pending),
            Some(event) => {
                let result = EntryStateMachine::apply(&entry, &event, None, strategy_now());
                prop_assert_eq!(result.is_ok(), from.can_transition_to(to) && deadline_allows);
                if let Ok(next) = result {
                    prop_assert_eq!(next.status, to);
                    prop_assert_eq!(next.version, entry.version + 1);
                }
            }
        }
    }

    #[test]
    fn test_pages_cover_listing_without_duplicates(
        count in 1i64..30,
        page_size in page_size_strategy(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let target = common::project(3);
            let harness = TestEngine::rating_only()
                .with_candidates(target, TestEngine::ranked_candidates(count));
            let engine = &harness.engine;
            let config = engine.default_builder_config();
            engine.regenerate(target, &config).await.unwrap();
            engine.regenerate(target, &config).await.unwrap();

            let full = engine
                .list_queue(&QueueFilter::for_target(target).with_page(1, 50))
                .await
                .unwrap();
            let total = full.pagination.total_entries;

            let mut seen = Vec::new();
            let mut page = 1;
            loop {
                let listing = engine
                    .list_queue(&QueueFilter::for_target(target).with_page(page, page_size))
                    .await
                    .unwrap();
                prop_assert_eq!(listing.pagination.total_entries, total);
                if listing.entries.is_empty() {
                    break;
                }
                seen.extend(listing.entries.iter().map(|e| e.id));
                page += 1;
            }

            let unique: HashSet<i64> = seen.iter().copied().collect();
            prop_assert_eq!(unique.len(), seen.len());
            prop_assert_eq!(seen.len() as u64, total);
            let full_ids: Vec<i64> = full.entries.iter().map(|e| e.id).collect();
            prop_assert_eq!(seen, full_ids);
            Ok(())
        })?;
    }
}

#[cfg(test)]
mod state_machine_invariants {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in EntryStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in EntryStatus::ALL {
                assert!(!from.can_transition_to(*to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_declined_cannot_be_renotified() {
        let entry = entry_in(EntryStatus::Declined);
        let event = TransitionRequest::to_status(EntryStatus::Notified)
            .to_event()
            .unwrap();
        assert!(EntryStateMachine::apply(&entry, &event, None, strategy_now()).is_err());
    }
}
