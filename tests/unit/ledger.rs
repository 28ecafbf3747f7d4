use payment_gateway::adapter::ledger::{
    AbstractLedgerEngine, AccountSpec, AppInMemLedgerEngine, LedgerErrorReason, LedgerOpCode,
    TransferLeg, TransferQuery, TransferSpec, TransferState,
};

use super::ut_logctx;

const ACCT_SRC: u128 = 0x11;
const ACCT_DST: u128 = 0x22;
const ACCT_FEE: u128 = 0x33;
const ACCT_CAPPED: u128 = 0x44;

async fn ut_engine() -> AppInMemLedgerEngine {
    let engine = AppInMemLedgerEngine::new(ut_logctx());
    let specs = vec![
        AccountSpec {
            id: ACCT_SRC,
            debits_must_not_exceed_credits: false,
        },
        AccountSpec {
            id: ACCT_DST,
            debits_must_not_exceed_credits: false,
        },
        AccountSpec {
            id: ACCT_FEE,
            debits_must_not_exceed_credits: false,
        },
        AccountSpec {
            id: ACCT_CAPPED,
            debits_must_not_exceed_credits: true,
        },
    ];
    engine.create_accounts(specs).await.unwrap();
    engine
}

fn ut_spec(debit_amt: u64, credit_amts: &[(u128, u64)], pending: bool, ext: Option<&str>) -> TransferSpec {
    TransferSpec {
        debits: vec![TransferLeg {
            account: ACCT_SRC,
            amount: debit_amt,
        }],
        credits: credit_amts
            .iter()
            .map(|(account, amount)| TransferLeg {
                account: *account,
                amount: *amount,
            })
            .collect(),
        code: LedgerOpCode::Manual,
        pending,
        external_ref: ext.map(|s| s.to_string()),
    }
}

#[tokio::test]
async fn imbalanced_legs_rejected() {
    let engine = ut_engine().await;
    let spec = ut_spec(100, &[(ACCT_DST, 60), (ACCT_FEE, 30)], false, None);
    let e = engine.transfer(spec).await.unwrap_err();
    assert_eq!(e.reason, LedgerErrorReason::ImbalancedLegs(100, 90));
    let spec = ut_spec(100, &[(ACCT_DST, 0), (ACCT_FEE, 100)], false, None);
    let e = engine.transfer(spec).await.unwrap_err();
    assert_eq!(e.reason, LedgerErrorReason::ZeroAmountLeg(ACCT_DST));
}

#[tokio::test]
async fn posted_totals_always_balance() {
    let engine = ut_engine().await;
    let spec = ut_spec(149900, &[(ACCT_DST, 146656), (ACCT_FEE, 3244)], false, None);
    let _tid = engine.transfer(spec).await.unwrap();
    let rows = engine.get_balances(&[ACCT_SRC, ACCT_DST, ACCT_FEE]).await.unwrap();
    let sum_net = rows.iter().map(|(_a, b)| b.net()).sum::<i128>();
    assert_eq!(sum_net, 0i128);
    let (_a, src) = rows[0];
    assert_eq!(src.debits_posted, 149900);
    assert_eq!(src.net(), -149900i128);
}

#[tokio::test]
async fn pending_lifecycle_post() {
    let engine = ut_engine().await;
    let spec = ut_spec(500, &[(ACCT_DST, 500)], true, None);
    let tid = engine.transfer(spec).await.unwrap();
    let bal = engine.get_balance(ACCT_DST).await.unwrap();
    assert_eq!(bal.credits_pending, 500);
    assert_eq!(bal.credits_posted, 0);
    assert_eq!(bal.net(), 0i128); // reservation is not balance
    engine.post(tid).await.unwrap();
    let bal = engine.get_balance(ACCT_DST).await.unwrap();
    assert_eq!(bal.credits_pending, 0);
    assert_eq!(bal.net(), 500i128);
    // settling twice is a state error the caller tolerates explicitly
    let e = engine.post(tid).await.unwrap_err();
    assert_eq!(e.reason, LedgerErrorReason::NotPending(tid));
    let e = engine.void(tid).await.unwrap_err();
    assert_eq!(e.reason, LedgerErrorReason::NotPending(tid));
}

#[tokio::test]
async fn pending_lifecycle_void() {
    let engine = ut_engine().await;
    let tid = engine
        .transfer(ut_spec(500, &[(ACCT_DST, 500)], true, None))
        .await
        .unwrap();
    engine.void(tid).await.unwrap();
    let bal = engine.get_balance(ACCT_SRC).await.unwrap();
    assert_eq!(bal.debits_pending, 0);
    assert_eq!(bal.debits_posted, 0);
}

#[tokio::test]
async fn external_ref_replay_returns_original() {
    let engine = ut_engine().await;
    let first = engine
        .transfer(ut_spec(700, &[(ACCT_DST, 700)], false, Some("cap:PI-1")))
        .await
        .unwrap();
    let second = engine
        .transfer(ut_spec(700, &[(ACCT_DST, 700)], false, Some("cap:PI-1")))
        .await
        .unwrap();
    assert_eq!(first, second);
    // legs applied exactly once
    let bal = engine.get_balance(ACCT_DST).await.unwrap();
    assert_eq!(bal.credits_posted, 700);
}

#[tokio::test]
async fn external_ref_mismatch_is_duplicate() {
    let engine = ut_engine().await;
    let _tid = engine
        .transfer(ut_spec(700, &[(ACCT_DST, 700)], false, Some("cap:PI-2")))
        .await
        .unwrap();
    let e = engine
        .transfer(ut_spec(900, &[(ACCT_DST, 900)], false, Some("cap:PI-2")))
        .await
        .unwrap_err();
    assert_eq!(
        e.reason,
        LedgerErrorReason::DuplicateTransfer("cap:PI-2".to_string())
    );
}

#[tokio::test]
async fn debit_cap_counts_pending_reservations() {
    let engine = ut_engine().await;
    // fund the capped account with 1000 posted credits
    let fund = TransferSpec {
        debits: vec![TransferLeg {
            account: ACCT_SRC,
            amount: 1000,
        }],
        credits: vec![TransferLeg {
            account: ACCT_CAPPED,
            amount: 1000,
        }],
        code: LedgerOpCode::Manual,
        pending: false,
        external_ref: None,
    };
    engine.transfer(fund).await.unwrap();
    let reserve = |amount: u64| TransferSpec {
        debits: vec![TransferLeg {
            account: ACCT_CAPPED,
            amount,
        }],
        credits: vec![TransferLeg {
            account: ACCT_DST,
            amount,
        }],
        code: LedgerOpCode::PayoutHold,
        pending: true,
        external_ref: None,
    };
    let hold = engine.transfer(reserve(800)).await.unwrap();
    let e = engine.transfer(reserve(300)).await.unwrap_err();
    assert_eq!(e.reason, LedgerErrorReason::InsufficientFunds(ACCT_CAPPED));
    // releasing the first reservation frees the headroom again
    engine.void(hold).await.unwrap();
    let _second = engine.transfer(reserve(300)).await.unwrap();
}

#[tokio::test]
async fn reverse_swaps_legs_of_posted_only() {
    let engine = ut_engine().await;
    let pending = engine
        .transfer(ut_spec(400, &[(ACCT_DST, 400)], true, None))
        .await
        .unwrap();
    let e = engine.reverse(pending).await.unwrap_err();
    assert_eq!(e.reason, LedgerErrorReason::NotPosted(pending));
    engine.post(pending).await.unwrap();
    let rev = engine.reverse(pending).await.unwrap();
    assert_ne!(rev, pending);
    let bal = engine.get_balance(ACCT_DST).await.unwrap();
    assert_eq!(bal.credits_posted, 400);
    assert_eq!(bal.debits_posted, 400);
    assert_eq!(bal.net(), 0i128);
    let rows = engine
        .query_transfers(TransferQuery {
            account: ACCT_DST,
            limit: 10,
            code: Some(LedgerOpCode::Reversal),
            reversed: false,
            time_range: None,
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].reversal_of, Some(pending));
    assert_eq!(rows[0].state, TransferState::Posted);
}

#[tokio::test]
async fn query_honors_ordering_flag() {
    let engine = ut_engine().await;
    for amount in [100u64, 200, 300] {
        let _tid = engine
            .transfer(ut_spec(amount, &[(ACCT_DST, amount)], false, None))
            .await
            .unwrap();
    }
    let query = |reversed: bool, limit: usize| TransferQuery {
        account: ACCT_DST,
        limit,
        code: None,
        reversed,
        time_range: None,
    };
    let rows = engine.query_transfers(query(false, 10)).await.unwrap();
    let amounts = rows.iter().map(|r| r.credits[0].amount).collect::<Vec<_>>();
    assert_eq!(amounts, vec![100u64, 200, 300]);
    let rows = engine.query_transfers(query(true, 10)).await.unwrap();
    let amounts = rows.iter().map(|r| r.credits[0].amount).collect::<Vec<_>>();
    assert_eq!(amounts, vec![300u64, 200, 100]);
    // the limit cuts after ordering, newest-first keeps the newest
    let rows = engine.query_transfers(query(true, 2)).await.unwrap();
    let amounts = rows.iter().map(|r| r.credits[0].amount).collect::<Vec<_>>();
    assert_eq!(amounts, vec![300u64, 200]);
}
