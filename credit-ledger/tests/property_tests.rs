//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: Σ(circulating) + retired + pool == issued, per batch
//! - Deterministic replay: same facts → same state
//! - Monotonicity: retired totals, buffer usage, and nonces never decrease
//! - Snapshot equality: rejected transitions leave no trace

use chrono::{Duration, Utc};
use credit_ledger::{
    buffer::calculate_buffer_amount,
    crypto::{attestation_digest, KeyPair},
    state::LedgerState,
    types::{AccountId, EvidenceHash, Role, BPS_DENOMINATOR, MAX_BUFFER_BPS},
};
use proptest::prelude::*;

fn account(byte: u8) -> AccountId {
    AccountId::new([byte; 32])
}

/// Admin with every role, project P1, MRV M1, and a batch of `issued`
/// credits held by the admin. Returns the state and the token id.
fn seeded_state(issued: u64) -> (LedgerState, AccountId, u64) {
    let mut state = LedgerState::default();
    let admin = account(1);
    let now = Utc::now();
    state.genesis(admin, now).unwrap();
    for role in [
        Role::Issuer,
        Role::Governance,
        Role::BufferManager,
        Role::Attestor,
    ] {
        state.grant_role(admin, role, admin, now).unwrap();
    }
    state
        .register_project(admin, "P1".to_string(), account(2), EvidenceHash::new("QmP1"), now)
        .unwrap();
    state
        .anchor_mrv(
            admin,
            "M1".to_string(),
            "P1".to_string(),
            EvidenceHash::new("QmM1"),
            issued,
            account(3),
            now,
        )
        .unwrap();
    let (token_id, _) = state
        .mint_batch(
            admin,
            admin,
            "P1".to_string(),
            "M1".to_string(),
            issued,
            2023,
            EvidenceHash::new("QmB1"),
            now,
        )
        .unwrap();
    (state, admin, token_id)
}

/// A random walk of transfer/retire/reverse steps over one batch
#[derive(Debug, Clone)]
enum Step {
    Transfer { to: u8, amount: u64 },
    Retire { amount: u64 },
    Reverse { amount: u64 },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (4u8..20, 1u64..200).prop_map(|(to, amount)| Step::Transfer { to, amount }),
        (1u64..200).prop_map(|amount| Step::Retire { amount }),
        (1u64..50).prop_map(|amount| Step::Reverse { amount }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: conservation holds across any interleaving of transfers,
    /// retirements, and reversals, counting both accepted and rejected
    /// steps.
    #[test]
    fn prop_conservation_over_random_walk(
        issued in 100u64..10_000,
        steps in prop::collection::vec(step_strategy(), 1..40),
    ) {
        let (mut state, admin, token_id) = seeded_state(issued);
        let now = Utc::now();
        state
            .reserve_buffer(admin, token_id, "P1".to_string(), issued, 1_000, now)
            .unwrap();
        let mut reversal_seq = 0u32;

        for step in steps {
            // Rejections are fine; the invariant must hold either way.
            let _ = match step {
                Step::Transfer { to, amount } => {
                    state.transfer(admin, admin, account(to), token_id, amount, now)
                }
                Step::Retire { amount } => state.retire(
                    admin,
                    token_id,
                    amount,
                    account(30),
                    "offset".to_string(),
                    now,
                ),
                Step::Reverse { amount } => {
                    reversal_seq += 1;
                    state.execute_reversal(
                        admin,
                        format!("R{}", reversal_seq),
                        "P1".to_string(),
                        token_id,
                        amount,
                        EvidenceHash::new("QmRev"),
                        now,
                    )
                }
            };
            prop_assert!(state.check_conservation(token_id));
        }
    }

    /// Property: replaying the fact log reproduces the state exactly
    #[test]
    fn prop_replay_is_deterministic(
        issued in 100u64..10_000,
        steps in prop::collection::vec(step_strategy(), 1..40),
    ) {
        let mut state = LedgerState::default();
        let admin = account(1);
        let now = Utc::now();
        let mut log = Vec::new();

        log.push(state.genesis(admin, now).unwrap());
        for role in [Role::Issuer, Role::Governance, Role::BufferManager] {
            if let Some(fact) = state.grant_role(admin, role, admin, now).unwrap() {
                log.push(fact);
            }
        }
        log.push(
            state
                .register_project(admin, "P1".to_string(), account(2), EvidenceHash::new("QmP1"), now)
                .unwrap(),
        );
        log.push(
            state
                .anchor_mrv(
                    admin,
                    "M1".to_string(),
                    "P1".to_string(),
                    EvidenceHash::new("QmM1"),
                    issued,
                    account(3),
                    now,
                )
                .unwrap(),
        );
        let (token_id, mint_fact) = state
            .mint_batch(
                admin,
                admin,
                "P1".to_string(),
                "M1".to_string(),
                issued,
                2023,
                EvidenceHash::new("QmB1"),
                now,
            )
            .unwrap();
        log.push(mint_fact);

        let mut reversal_seq = 0u32;
        for step in steps {
            let result = match step {
                Step::Transfer { to, amount } => {
                    state.transfer(admin, admin, account(to), token_id, amount, now)
                }
                Step::Retire { amount } => state.retire(
                    admin,
                    token_id,
                    amount,
                    account(30),
                    "offset".to_string(),
                    now,
                ),
                Step::Reverse { amount } => {
                    reversal_seq += 1;
                    state.execute_reversal(
                        admin,
                        format!("R{}", reversal_seq),
                        "P1".to_string(),
                        token_id,
                        amount,
                        EvidenceHash::new("QmRev"),
                        now,
                    )
                }
            };
            if let Ok(fact) = result {
                log.push(fact);
            }
        }

        let mut replayed = LedgerState::default();
        for fact in &log {
            replayed.apply_fact(fact);
        }
        prop_assert_eq!(replayed, state);
    }

    /// Property: retired totals and buffer usage never decrease
    #[test]
    fn prop_counters_are_monotonic(
        issued in 100u64..10_000,
        steps in prop::collection::vec(step_strategy(), 1..40),
    ) {
        let (mut state, admin, token_id) = seeded_state(issued);
        let now = Utc::now();
        state
            .reserve_buffer(admin, token_id, "P1".to_string(), issued, 1_000, now)
            .unwrap();

        let mut last_retired = 0u64;
        let mut last_used = 0u64;
        let mut reversal_seq = 0u32;

        for step in steps {
            let _ = match step {
                Step::Transfer { to, amount } => {
                    state.transfer(admin, admin, account(to), token_id, amount, now)
                }
                Step::Retire { amount } => state.retire(
                    admin,
                    token_id,
                    amount,
                    account(30),
                    "offset".to_string(),
                    now,
                ),
                Step::Reverse { amount } => {
                    reversal_seq += 1;
                    state.execute_reversal(
                        admin,
                        format!("R{}", reversal_seq),
                        "P1".to_string(),
                        token_id,
                        amount,
                        EvidenceHash::new("QmRev"),
                        now,
                    )
                }
            };

            let retired = state.batch(token_id).unwrap().total_retired;
            let used = state.buffer_reserve(token_id).unwrap().total_used;
            prop_assert!(retired >= last_retired);
            prop_assert!(used >= last_used);
            last_retired = retired;
            last_used = used;
        }
    }

    /// Property: the buffer floor arithmetic never exceeds issuance and
    /// loses less than one whole basis-point unit to rounding
    #[test]
    fn prop_buffer_amount_floor(issued in 0u64..u64::MAX / 2, bps in 1u16..=MAX_BUFFER_BPS) {
        let amount = calculate_buffer_amount(issued, bps);
        prop_assert!(amount <= issued);

        let exact = u128::from(issued) * u128::from(bps);
        let floored = u128::from(amount) * u128::from(BPS_DENOMINATOR);
        prop_assert!(floored <= exact);
        prop_assert!(exact - floored < u128::from(BPS_DENOMINATOR));
    }

    /// Property: a rejected duplicate registration leaves the state
    /// bit-identical to the pre-call snapshot
    #[test]
    fn prop_duplicate_registration_leaves_no_trace(id in "[A-Z][A-Z0-9]{1,12}") {
        let mut state = LedgerState::default();
        let admin = account(1);
        let now = Utc::now();
        state.genesis(admin, now).unwrap();
        state.grant_role(admin, Role::Issuer, admin, now).unwrap();
        state
            .register_project(admin, id.clone(), account(2), EvidenceHash::new("QmP"), now)
            .unwrap();

        let snapshot = state.clone();
        let result =
            state.register_project(admin, id, account(9), EvidenceHash::new("QmX"), now);
        prop_assert!(result.is_err());
        prop_assert_eq!(state, snapshot);
    }

    /// Property: a direct-attestation signature is single-use, whatever
    /// the signed payload was
    #[test]
    fn prop_signature_replay_rejected(seed in any::<[u8; 32]>(), t_co2e in 1u64..1_000_000) {
        let (mut state, admin, _) = seeded_state(1_000);
        let now = Utc::now();
        let auditor_key = KeyPair::from_seed(&seed);
        let auditor = auditor_key.account_id();

        state
            .anchor_mrv(
                admin,
                "M2".to_string(),
                "P1".to_string(),
                EvidenceHash::new("QmM2"),
                t_co2e,
                auditor,
                now,
            )
            .unwrap();
        state
            .anchor_mrv(
                admin,
                "M3".to_string(),
                "P1".to_string(),
                EvidenceHash::new("QmM3"),
                t_co2e,
                auditor,
                now,
            )
            .unwrap();

        let deadline = now + Duration::hours(1);
        let digest = attestation_digest("M2", "P1", &auditor, t_co2e, 0, deadline);
        let signature = auditor_key.sign(&digest);

        state
            .create_direct_attestation(
                admin,
                "M2".to_string(),
                "P1".to_string(),
                auditor,
                t_co2e,
                deadline,
                &signature,
                now,
            )
            .unwrap();
        prop_assert_eq!(state.nonce(&auditor), 1);

        // Same signature against another MRV: the advanced nonce changes
        // the expected digest, so verification fails.
        let replay = state.create_direct_attestation(
            admin,
            "M3".to_string(),
            "P1".to_string(),
            auditor,
            t_co2e,
            deadline,
            &signature,
            now,
        );
        prop_assert!(replay.is_err());
        prop_assert_eq!(state.nonce(&auditor), 1);
        prop_assert!(state.attestation("M3").is_none());
    }
}
