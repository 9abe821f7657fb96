mod helpers;

use helpers::*;
use raffle_backend::error::AppError;
use raffle_backend::models::*;
use raffle_backend::services::{DrawService, IntegrityIssue, NotificationService};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

// =========================================================================
// ALLOCATION
// =========================================================================

#[tokio::test]
async fn test_sequential_allocation_covers_pool_without_gaps() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;

    let counts = [3, 1, 7, 2, 5, 1, 4, 6, 2, 9];
    let mut expected_start = 1i64;

    for (i, &count) in counts.iter().enumerate() {
        let (_, range) =
            create_allocated_entry(&app, &format!("fan{}@example.com", i), count).await;

        assert_eq!(range.start_number, expected_start);
        assert_eq!(range.len(), i64::from(count));
        expected_start = range.end_number + 1;
    }

    let total: i64 = counts.iter().map(|&c| i64::from(c)).sum();
    assert_pool_valid(&app, total).await;
}

#[tokio::test]
async fn test_allocation_is_idempotent_sequentially() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;

    let entry = create_completed_entry(&app, "fan@example.com", 4).await;

    let first = app.state.allocator.allocate_tickets(entry.id).await.unwrap();
    assert!(first.freshly_allocated);
    assert_eq!(first.range, TicketRange::new(1, 4));

    for _ in 0..5 {
        let replay = app.state.allocator.allocate_tickets(entry.id).await.unwrap();
        assert!(!replay.freshly_allocated);
        assert_eq!(replay.range, first.range);
    }

    assert_pool_valid(&app, 4).await;
}

#[tokio::test]
async fn test_concurrent_allocation_of_same_entry_yields_one_block() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;

    let entry = create_completed_entry(&app, "fan@example.com", 3).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let allocator = app.state.allocator.clone();
        let entry_id = entry.id;
        handles.push(tokio::spawn(
            async move { allocator.allocate_tickets(entry_id).await },
        ));
    }

    let mut ranges = HashSet::new();
    for handle in handles {
        let block = handle.await.unwrap().unwrap();
        ranges.insert((block.range.start_number, block.range.end_number));
    }

    // Every caller observed the same single block
    assert_eq!(ranges.len(), 1);
    assert!(ranges.contains(&(1, 3)));
    assert_pool_valid(&app, 3).await;
}

#[tokio::test]
async fn test_concurrent_allocation_of_many_entries_stays_gap_free() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;

    let mut entries = Vec::new();
    let mut total = 0i64;
    for i in 0..50 {
        let count = (i % 5) + 1;
        total += i64::from(count);
        entries.push(create_completed_entry(&app, &format!("fan{}@example.com", i), count).await);
    }

    let mut handles = Vec::new();
    for entry in &entries {
        let allocator = app.state.allocator.clone();
        let entry_id = entry.id;
        handles.push(tokio::spawn(
            async move { allocator.allocate_tickets(entry_id).await },
        ));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Exactly total tickets, numbered 1..=total, no duplicates or gaps
    assert_pool_valid(&app, total).await;

    // Each entry got a contiguous block of its own size
    for entry in &entries {
        let tickets = app.store().tickets_for_entry(entry.id).await.unwrap();
        assert_eq!(tickets.len(), entry.count as usize);
        let range = TicketRange::from_tickets(&tickets).unwrap();
        assert_eq!(range.len(), i64::from(entry.count));
    }
}

#[tokio::test]
async fn test_allocation_requires_completed_payment() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;

    let entry = app
        .state
        .entries
        .create_entry("fan@example.com", 2, 1000, None)
        .await
        .unwrap();

    let err = app.state.allocator.allocate_tickets(entry.id).await.unwrap_err();
    assert!(matches!(err, AppError::EntryNotCompleted { .. }));

    let missing = app
        .state
        .allocator
        .allocate_tickets(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(missing, AppError::EntryNotFound(_)));
}

#[tokio::test]
async fn test_no_new_allocation_after_close_but_replay_still_works() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;

    let (allocated, range) = create_allocated_entry(&app, "early@example.com", 2).await;
    let late = create_completed_entry(&app, "late@example.com", 3).await;

    close_raffle(&app, raffle.id).await;

    // New issuance is refused once the window closed
    let err = app.state.allocator.allocate_tickets(late.id).await.unwrap_err();
    assert!(matches!(err, AppError::RaffleClosed { .. }));

    // The refused entry is flagged for operator reconciliation
    let notifications = app.store().unread_notifications(50).await.unwrap();
    assert!(notifications
        .iter()
        .any(|n| n.kind == NotificationKind::AllocationFailed.as_str()));

    // Replaying an entry that was allocated before close stays idempotent
    let replay = app.state.allocator.allocate_tickets(allocated.id).await.unwrap();
    assert!(!replay.freshly_allocated);
    assert_eq!(replay.range, range);
}

#[tokio::test]
async fn test_allocation_retries_past_transient_conflicts() {
    // Two simulated serialization failures, then the store cooperates;
    // the retry budget is three, so the caller never sees the conflicts
    let state = conflicting_app(2);
    state.raffles.create(open_raffle_config(1)).await.unwrap();

    let entry = state
        .entries
        .create_entry("fan@example.com", 3, 1500, None)
        .await
        .unwrap();
    state
        .store
        .update_payment_status(entry.id, PaymentStatus::Completed, None)
        .await
        .unwrap();

    let block = state.allocator.allocate_tickets(entry.id).await.unwrap();
    assert!(block.freshly_allocated);
    assert_eq!(block.range, TicketRange::new(1, 3));
}

#[tokio::test]
async fn test_allocation_conflict_exhaustion_is_reported() {
    // The store never stops conflicting; after the retry budget the error
    // surfaces and the entry is flagged for reconciliation
    let state = conflicting_app(u32::MAX);
    state.raffles.create(open_raffle_config(1)).await.unwrap();

    let entry = state
        .entries
        .create_entry("fan@example.com", 2, 1000, None)
        .await
        .unwrap();
    state
        .store
        .update_payment_status(entry.id, PaymentStatus::Completed, None)
        .await
        .unwrap();

    let err = state.allocator.allocate_tickets(entry.id).await.unwrap_err();
    assert!(err.is_conflict());

    let notifications = state.store.unread_notifications(50).await.unwrap();
    assert!(notifications
        .iter()
        .any(|n| n.kind == NotificationKind::AllocationFailed.as_str()));
}

// =========================================================================
// PAYMENT OUTCOMES
// =========================================================================

#[tokio::test]
async fn test_completed_payment_allocates_inline() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;

    let entry = app
        .state
        .entries
        .create_entry("fan@example.com", 5, 2000, None)
        .await
        .unwrap();

    let (updated, block) = app
        .state
        .entries
        .record_payment(entry.id, PaymentStatus::Completed, Some("cs_123".to_string()))
        .await
        .unwrap();

    assert!(updated.is_completed());
    assert_eq!(updated.payment_ref.as_deref(), Some("cs_123"));
    let block = block.expect("completed payment should allocate");
    assert_eq!(block.range, TicketRange::new(1, 5));
    assert_pool_valid(&app, 5).await;

    // Retried webhook with the same outcome converges on the same block
    let (_, replay) = app
        .state
        .entries
        .record_payment(entry.id, PaymentStatus::Completed, None)
        .await
        .unwrap();
    let replay = replay.unwrap();
    assert!(!replay.freshly_allocated);
    assert_eq!(replay.range, block.range);
}

#[tokio::test]
async fn test_failed_payment_allocates_nothing() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;

    let entry = app
        .state
        .entries
        .create_entry("fan@example.com", 2, 1000, None)
        .await
        .unwrap();

    let (updated, block) = app
        .state
        .entries
        .record_payment(entry.id, PaymentStatus::Failed, None)
        .await
        .unwrap();

    assert_eq!(updated.payment_status_enum(), PaymentStatus::Failed);
    assert!(block.is_none());
    assert_eq!(app.store().ticket_count(updated.raffle_id).await.unwrap(), 0);

    let notifications = app.store().unread_notifications(50).await.unwrap();
    assert!(notifications
        .iter()
        .any(|n| n.kind == NotificationKind::PaymentFailed.as_str()));
}

#[tokio::test]
async fn test_payment_outcome_transitions_at_most_once() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;

    let entry = app
        .state
        .entries
        .create_entry("fan@example.com", 1, 500, None)
        .await
        .unwrap();

    // Pending is not an outcome
    let err = app
        .state
        .entries
        .record_payment(entry.id, PaymentStatus::Pending, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    app.state
        .entries
        .record_payment(entry.id, PaymentStatus::Failed, None)
        .await
        .unwrap();

    // Flipping a terminal outcome is refused
    let err = app
        .state
        .entries
        .record_payment(entry.id, PaymentStatus::Completed, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

// =========================================================================
// DRAW
// =========================================================================

#[tokio::test]
async fn test_draw_scenario_three_entries() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;

    for (i, count) in [2, 1, 3].into_iter().enumerate() {
        create_allocated_entry(&app, &format!("fan{}@example.com", i), count).await;
    }
    assert_pool_valid(&app, 6).await;

    close_raffle(&app, raffle.id).await;

    let result = app.state.draw.select_winners().await.unwrap();
    assert!(!result.already_selected);
    assert_eq!(result.winners.len(), 1);

    let winner = &result.winners[0];
    assert_eq!(winner.slot, 0);
    assert_eq!(winner.total_tickets_in_pool, 6);
    assert!(winner.winning_ticket_number >= 1 && winner.winning_ticket_number <= 6);
    assert_eq!(winner.derivation, DRAW_DERIVATION);
    assert_eq!(winner.seed.len(), 64); // 32 bytes hex-encoded

    // The recorded ticket really belongs to the recorded entry
    let ticket = app
        .store()
        .find_ticket_by_number(raffle.id, winner.winning_ticket_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ticket.entry_id, winner.winner_entry_id);
    assert_eq!(ticket.email, winner.winner_email);

    // Second call returns the same winner, never redraws
    let replay = app.state.draw.select_winners().await.unwrap();
    assert!(replay.already_selected);
    assert_eq!(replay.winners.len(), 1);
    assert_eq!(replay.winners[0].id, winner.id);
    assert_eq!(replay.winners[0].winning_ticket_number, winner.winning_ticket_number);
}

#[tokio::test]
async fn test_draw_rejected_while_raffle_open() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;
    create_allocated_entry(&app, "fan@example.com", 2).await;

    let err = app.state.draw.select_winners().await.unwrap_err();
    assert!(matches!(err, AppError::RaffleNotEnded { .. }));
}

#[tokio::test]
async fn test_draw_with_zero_participants() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;
    close_raffle(&app, raffle.id).await;

    let err = app.state.draw.select_winners().await.unwrap_err();
    assert!(matches!(err, AppError::NoParticipants));
}

#[tokio::test]
async fn test_concurrent_draws_converge_on_one_winner() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;

    for (i, count) in [4, 2, 1].into_iter().enumerate() {
        create_allocated_entry(&app, &format!("fan{}@example.com", i), count).await;
    }
    close_raffle(&app, raffle.id).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = app.store();
        let notifier = Arc::new(NotificationService::new(store.clone()));
        let draw = DrawService::new(store, notifier);
        handles.push(tokio::spawn(async move { draw.select_winners().await }));
    }

    let mut winner_ids = HashSet::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.winners.len(), 1);
        winner_ids.insert(result.winners[0].id);
    }

    // Every caller observed the same recorded winner
    assert_eq!(winner_ids.len(), 1);
    assert_eq!(app.store().winners_for_raffle(raffle.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_multi_winner_draw_gives_each_entry_at_most_one_slot() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 3).await;

    for i in 0..5 {
        create_allocated_entry(&app, &format!("fan{}@example.com", i), 2).await;
    }
    close_raffle(&app, raffle.id).await;

    let result = app.state.draw.select_winners().await.unwrap();
    assert!(!result.already_selected);
    assert_eq!(result.winners.len(), 3);

    let slots: Vec<i32> = result.winners.iter().map(|w| w.slot).collect();
    assert_eq!(slots, vec![0, 1, 2]);

    let entries: HashSet<Uuid> = result.winners.iter().map(|w| w.winner_entry_id).collect();
    assert_eq!(entries.len(), 3, "an entry won more than one slot");

    let replay = app.state.draw.select_winners().await.unwrap();
    assert!(replay.already_selected);
    assert_eq!(replay.winners.len(), 3);
}

#[tokio::test]
async fn test_multi_winner_draw_stops_when_entries_run_out() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 5).await;

    create_allocated_entry(&app, "only1@example.com", 3).await;
    create_allocated_entry(&app, "only2@example.com", 1).await;
    close_raffle(&app, raffle.id).await;

    // Two entries can fill at most two slots
    let result = app.state.draw.select_winners().await.unwrap();
    assert_eq!(result.winners.len(), 2);
}

#[tokio::test]
async fn test_draw_proceeds_after_post_close_refused_entry() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;

    create_allocated_entry(&app, "early@example.com", 2).await;
    let late = create_completed_entry(&app, "late@example.com", 3).await;
    close_raffle(&app, raffle.id).await;

    let err = app.state.allocator.allocate_tickets(late.id).await.unwrap_err();
    assert!(matches!(err, AppError::RaffleClosed { .. }));

    // The refused entry is a reconciliation concern, not a pool defect
    let report = app.state.integrity.validate_pool().await.unwrap();
    assert!(report.is_valid, "unexpected findings: {}", report.summary());
    assert_eq!(report.total_tickets, 2);
    assert_eq!(report.expected_tickets, 2);
    assert_eq!(report.unallocated_entries, 1);
    assert_eq!(report.unallocated_demand, 3);

    // The draw must not be blocked by the entry that never got tickets
    let result = app.state.draw.select_winners().await.unwrap();
    assert_eq!(result.winners.len(), 1);
    let winner = &result.winners[0];
    assert!(winner.winning_ticket_number >= 1 && winner.winning_ticket_number <= 2);
    assert_ne!(winner.winner_entry_id, late.id);
}

#[tokio::test]
async fn test_draw_refused_on_corrupt_pool() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;

    create_allocated_entry(&app, "fan@example.com", 3).await;
    app.memory.remove_ticket(raffle.id, 2).await;
    close_raffle(&app, raffle.id).await;

    let err = app.state.draw.select_winners().await.unwrap_err();
    assert!(matches!(err, AppError::IntegrityViolation(_)));
    assert!(app.store().winners_for_raffle(raffle.id).await.unwrap().is_empty());
}

// =========================================================================
// INTEGRITY CHECKER
// =========================================================================

#[tokio::test]
async fn test_integrity_detects_gap() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;
    create_allocated_entry(&app, "fan@example.com", 4).await;

    app.memory.remove_ticket(raffle.id, 2).await;

    let report = app.state.integrity.validate_pool().await.unwrap();
    assert!(!report.is_valid);
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, IntegrityIssue::SequenceMismatch { expected: 2, found: 3, .. })));
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, IntegrityIssue::CountMismatch { expected: 4, observed: 3 })));
}

#[tokio::test]
async fn test_integrity_detects_duplicate_number() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;
    let (entry, _) = create_allocated_entry(&app, "fan@example.com", 3).await;

    app.memory
        .insert_raw_ticket(Ticket {
            id: Uuid::new_v4(),
            raffle_id: raffle.id,
            entry_id: entry.id,
            email: entry.email.clone(),
            ticket_number: 2,
            created_at: now(),
        })
        .await;

    let report = app.state.integrity.validate_pool().await.unwrap();
    assert!(!report.is_valid);
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, IntegrityIssue::DuplicateNumbers { total: 4, distinct: 3 })));
}

#[tokio::test]
async fn test_integrity_detects_counter_drift() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;
    create_allocated_entry(&app, "fan@example.com", 2).await;

    // Simulate a reserved range whose tickets were never written
    app.memory.set_total_entries(raffle.id, 5).await;

    let report = app.state.integrity.validate_pool().await.unwrap();
    assert!(!report.is_valid);
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, IntegrityIssue::CounterDrift { counter: 5, observed: 2 })));
}

#[tokio::test]
async fn test_integrity_passes_on_healthy_pool() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;

    create_allocated_entry(&app, "fan1@example.com", 2).await;
    create_allocated_entry(&app, "fan2@example.com", 1).await;
    // A failed entry demands no tickets
    let failed = app
        .state
        .entries
        .create_entry("fan3@example.com", 9, 4500, None)
        .await
        .unwrap();
    app.state
        .entries
        .record_payment(failed.id, PaymentStatus::Failed, None)
        .await
        .unwrap();

    assert_pool_valid(&app, 3).await;
}

// =========================================================================
// RAFFLE CONFIGURATION
// =========================================================================

#[tokio::test]
async fn test_at_most_one_active_raffle() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;

    let err = app
        .state
        .raffles
        .create(open_raffle_config(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_raffle_update_refused_after_winner() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;
    create_allocated_entry(&app, "fan@example.com", 2).await;
    close_raffle(&app, raffle.id).await;
    app.state.draw.select_winners().await.unwrap();

    let err = app
        .state
        .raffles
        .update(RaffleConfigUpdate {
            name: Some("Renamed".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::WinnerAlreadySelected));
}

#[tokio::test]
async fn test_raffle_status_snapshot() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;
    create_allocated_entry(&app, "fan@example.com", 4).await;

    let status = app.state.raffles.status().await.unwrap();
    assert_eq!(status.raffle_id, raffle.id);
    assert!(status.is_open);
    assert_eq!(status.total_tickets, 4);
    assert!(!status.has_winner);

    close_raffle(&app, raffle.id).await;
    app.state.draw.select_winners().await.unwrap();

    let status = app.state.raffles.status().await.unwrap();
    assert!(!status.is_open);
    assert!(status.has_winner);
}

#[tokio::test]
async fn test_tickets_by_email_span_entries() {
    let app = TestApp::new();
    seed_open_raffle(&app, 1).await;

    // Same participant buys twice; lookup normalizes case and whitespace
    create_allocated_entry(&app, "fan@example.com", 2).await;
    create_allocated_entry(&app, "fan@example.com", 3).await;
    create_allocated_entry(&app, "other@example.com", 1).await;

    let tickets = app
        .state
        .entries
        .tickets_by_email("  Fan@Example.COM ")
        .await
        .unwrap();
    assert_eq!(tickets.len(), 5);
    let numbers: Vec<i64> = tickets.iter().map(|t| t.ticket_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

    let none = app
        .state
        .entries
        .tickets_by_email("stranger@example.com")
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_pool_stats_distribution() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;

    create_allocated_entry(&app, "fan@example.com", 2).await;
    create_allocated_entry(&app, "fan@example.com", 1).await;
    create_allocated_entry(&app, "other@example.com", 4).await;

    let stats = app.state.raffles.ticket_stats().await.unwrap();
    assert_eq!(stats.raffle_id, raffle.id);
    assert_eq!(stats.total_tickets, 7);
    assert_eq!(stats.entry_count, 3);
    assert_eq!(stats.participant_count, 2);
}

#[tokio::test]
async fn test_entry_creation_refused_after_close() {
    let app = TestApp::new();
    let raffle = seed_open_raffle(&app, 1).await;
    close_raffle(&app, raffle.id).await;

    let err = app
        .state
        .entries
        .create_entry("fan@example.com", 1, 500, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RaffleClosed { .. }));
}
