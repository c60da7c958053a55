//! Integration tests for the Eloits rewards engine
//!
//! End-to-end behaviour over the in-memory store: award pipeline, trust,
//! spam, referrals, redemptions and the HTTP surface.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;

use eloits_engine::api::{SecurityMiddlewareConfig, create_app};
use eloits_engine::database::{LedgerRepository, MemoryStore};
use eloits_engine::rewards::redemption::RedemptionRequest;
use eloits_engine::rewards::settings::{CONVERSION_RATE, PAYOUT_MODE};
use eloits_engine::rewards::{
    LedgerEntry, RedemptionStatus, RedemptionUpdate, trust_level_for_score,
};
use eloits_engine::{Account, EloitsEngine, RewardRule, RewardsError, Tier, TierCatalog};

// ============================================================================
// Test Helpers
// ============================================================================

const API_KEY: &str = "test-api-key-0123456789abcdef0123";

/// Engine over a shared memory store with the given rules registered
async fn create_test_engine(rules: Vec<RewardRule>) -> (Arc<MemoryStore>, Arc<EloitsEngine>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(EloitsEngine::new(store.clone()));
    for rule in rules {
        engine.upsert_reward_rule(rule).await.unwrap();
    }
    (store, engine)
}

/// Seed an account whose balance and lifetime total are `balance`
async fn seed_account(store: &MemoryStore, user_id: &str, balance: Decimal) {
    let mut account = Account::new(user_id);
    account.current_balance = balance;
    account.total_earned = balance;
    account.tier = TierCatalog::tier_for_points(balance);
    store.seed_account(account).await;
}

fn redemption(amount: Decimal) -> RedemptionRequest {
    RedemptionRequest {
        amount,
        payout_method: "bank_transfer".to_string(),
        payout_details: json!({ "iban": "DE00 0000" }),
    }
}

fn create_test_app(engine: Arc<EloitsEngine>) -> Router {
    create_app(
        engine,
        SecurityMiddlewareConfig {
            api_keys: vec![API_KEY.to_string()],
            ..Default::default()
        },
    )
}

fn request(method: &str, uri: &str, user: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", API_KEY)
        .header("content-type", "application/json");
    if let Some((user_id, role)) = user {
        builder = builder.header("x-user-id", user_id).header("x-user-role", role);
    }
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    builder.body(body).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn decimal_at(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

// ============================================================================
// Trust
// ============================================================================

mod trust {
    use super::*;

    #[tokio::test]
    async fn test_trust_score_stays_in_range() {
        let (_, engine) = create_test_engine(vec![]).await;
        engine.initialize_user_eloits_data("user_1").await.unwrap();

        for delta in [250, -7, i32::MAX / 2, -1_000_000, 3] {
            let entry = engine
                .update_trust_score("user_1", delta, "test", None)
                .await
                .unwrap()
                .unwrap();
            assert!((0..=100).contains(&entry.new_score));
        }
        let account = engine.get_user_eloits_data("user_1").await.unwrap().unwrap();
        assert_eq!(account.trust_score, 3);
        assert_eq!(account.trust_level, Tier::Bronze);
        assert_eq!(engine.get_trust_history("user_1", None).await.unwrap().len(), 5);
    }

    #[test]
    fn test_trust_level_boundaries() {
        let cases = [
            (0, Tier::Bronze),
            (39, Tier::Bronze),
            (40, Tier::Silver),
            (59, Tier::Silver),
            (60, Tier::Gold),
            (74, Tier::Gold),
            (75, Tier::Platinum),
            (89, Tier::Platinum),
            (90, Tier::Diamond),
            (100, Tier::Diamond),
        ];
        for (score, level) in cases {
            assert_eq!(trust_level_for_score(score), level, "score {}", score);
        }
    }

    #[tokio::test]
    async fn test_inactivity_decay_after_grace_period() {
        let (store, engine) = create_test_engine(vec![]).await;
        let mut account = Account::new("idle");
        account.last_activity_date = Some(Utc::now() - Duration::days(9));
        store.seed_account(account).await;

        let entry = engine.apply_inactivity_decay("idle").await.unwrap().unwrap();
        assert_eq!(entry.decay_amount, 4);
        assert_eq!(entry.new_score, 46);
        assert_eq!(engine.get_trust_decay_history("idle", None).await.unwrap().len(), 1);
    }
}

// ============================================================================
// Award pipeline
// ============================================================================

mod awards {
    use super::*;

    #[tokio::test]
    async fn test_daily_cap_rejects_the_extra_award() {
        let rule = RewardRule::new("daily_login", dec!(10)).with_limits(Some(3), None, None);
        let (_, engine) = create_test_engine(vec![rule]).await;

        for _ in 0..3 {
            let outcome = engine.award_points("user_1", "daily_login", json!({})).await.unwrap();
            assert_eq!(outcome.amount, dec!(12));
        }
        let err = engine
            .award_points("user_1", "daily_login", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, RewardsError::NotEligible(ref msg) if msg == "Activity limit reached"));

        let account = engine.get_user_eloits_data("user_1").await.unwrap().unwrap();
        assert_eq!(account.current_balance, dec!(36));
        assert_eq!(account.streak_days, 1);
    }

    #[tokio::test]
    async fn test_trust_gate() {
        let rule = RewardRule::new("create_video", dec!(500)).with_minimum_trust(70);
        let (_, engine) = create_test_engine(vec![rule]).await;

        let err = engine
            .award_points("user_1", "create_video", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Trust score too low. Required: 70, Current: 50");
    }

    #[tokio::test]
    async fn test_repetition_decay_is_monotonic_and_floored() {
        let rule = RewardRule::new("like_post", dec!(100)).with_decay(5, dec!(0.8), dec!(0.1));
        let (_, engine) = create_test_engine(vec![rule]).await;

        let mut amounts = Vec::new();
        for _ in 0..20 {
            let outcome = engine.award_points("user_1", "like_post", json!({})).await.unwrap();
            amounts.push(outcome.amount);
        }

        assert!(amounts[..6].iter().all(|a| *a == dec!(120)));
        assert_eq!(amounts[6], dec!(96));
        // strictly decreasing until the floor, flat afterwards
        for i in 6..=16 {
            assert!(amounts[i] < amounts[i - 1], "award {} did not decrease", i + 1);
        }
        assert!(amounts[16..].iter().all(|a| *a == dec!(12)));
    }

    #[tokio::test]
    async fn test_product_sold_uses_point_tier() {
        let (store, engine) = create_test_engine(vec![RewardRule::new("product_sold", dec!(750))]).await;
        seed_account(&store, "seller", dec!(20001)).await;

        let outcome = engine.handle_product_sold_reward("seller", "prod_9").await.unwrap();
        assert_eq!(outcome.amount, dec!(1125));
        assert_eq!(outcome.multiplier_applied, dec!(1.5));

        let account = engine.get_user_eloits_data("seller").await.unwrap().unwrap();
        assert_eq!(account.current_balance, dec!(21126));
    }

    #[tokio::test]
    async fn test_marketplace_purchase_reward_is_capped() {
        let (_, engine) = create_test_engine(vec![
            RewardRule::new("purchase_product", dec!(1)),
            RewardRule::new("marketplace_purchase", dec!(1)),
        ])
        .await;

        let small = engine
            .handle_marketplace_purchase_reward("buyer", dec!(250), "prod_1")
            .await
            .unwrap();
        assert_eq!(small.amount, dec!(12.5));

        let large = engine
            .handle_marketplace_purchase_reward("buyer", dec!(50000), "prod_2")
            .await
            .unwrap();
        assert_eq!(large.amount, dec!(200));

        // reward rows plus zero-amount audit rows
        let history = engine.get_transaction_history("buyer", None, None).await.unwrap();
        assert_eq!(history.len(), 4);
        let total: Decimal = history.iter().map(|tx| tx.amount).sum();
        let account = engine.get_user_eloits_data("buyer").await.unwrap().unwrap();
        assert_eq!(total, account.current_balance);
    }

    #[tokio::test]
    async fn test_oversized_rule_is_rejected() {
        let (_, engine) = create_test_engine(vec![]).await;
        let err = engine
            .upsert_reward_rule(RewardRule::new("big", Decimal::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, RewardsError::InvalidInput(_)));

        let err = engine.award_points("user_1", "big", json!({})).await.unwrap_err();
        assert!(matches!(err, RewardsError::NotFound(_)));
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_awards_and_redemptions_reconcile() {
        let (store, engine) = create_test_engine(vec![RewardRule::new("post_content", dec!(10))]).await;
        engine
            .update_system_config(HashMap::from([(PAYOUT_MODE.to_string(), "automated".to_string())]))
            .await
            .unwrap();
        seed_account(&store, "user_1", dec!(1000)).await;

        let mut handles = Vec::new();
        for i in 0..100 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    let outcome = engine
                        .award_points("user_1", "post_content", json!({ "n": i }))
                        .await
                        .unwrap();
                    outcome.amount
                } else {
                    engine
                        .request_redemption("user_1", redemption(dec!(5)))
                        .await
                        .unwrap();
                    dec!(-5)
                }
            }));
        }

        let mut delta = Decimal::ZERO;
        for handle in handles {
            delta += handle.await.unwrap();
        }
        assert_eq!(delta, dec!(350));

        let account = store.get_account("user_1").await.unwrap().unwrap();
        assert_eq!(account.current_balance, dec!(1350));
        assert!(account.current_balance >= Decimal::ZERO);
        assert_eq!(account.total_earned - account.total_spent, account.current_balance);

        let rows = store.list_transactions("user_1", 500, 0).await.unwrap();
        assert_eq!(rows.len(), 100);
        let ledger_total: Decimal = rows.iter().map(|tx| tx.amount).sum();
        assert_eq!(dec!(1000) + ledger_total, account.current_balance);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_trust_updates_are_not_lost() {
        let (_, engine) = create_test_engine(vec![]).await;
        engine.initialize_user_eloits_data("user_1").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..30 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.update_trust_score("user_1", 1, "endorsement", None).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        let account = engine.get_user_eloits_data("user_1").await.unwrap().unwrap();
        assert_eq!(account.trust_score, 80);
        assert_eq!(engine.get_trust_history("user_1", Some(100)).await.unwrap().len(), 30);
    }
}

// ============================================================================
// Tiers & cash value
// ============================================================================

mod tiers {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        let engine = EloitsEngine::in_memory();
        assert_eq!(engine.get_user_tier(dec!(5000)), Tier::Bronze);
        assert_eq!(engine.get_user_tier(dec!(5001)), Tier::Silver);
        assert_eq!(engine.get_user_tier(dec!(100000)), Tier::Gold);
        assert_eq!(engine.get_user_tier(dec!(100001)), Tier::Platinum);
        assert_eq!(engine.get_user_tier(dec!(500001)), Tier::Diamond);
        assert_eq!(engine.get_tier_config(Tier::Diamond).monthly_withdrawal_limit, dec!(100));
    }

    #[tokio::test]
    async fn test_cash_value_follows_conversion_rate() {
        let (_, engine) = create_test_engine(vec![]).await;
        assert_eq!(engine.calculate_cash_value(dec!(5000)).await, dec!(5));

        engine
            .update_system_config(HashMap::from([(CONVERSION_RATE.to_string(), "500".to_string())]))
            .await
            .unwrap();
        assert_eq!(engine.calculate_cash_value(dec!(5000)).await, dec!(10));
    }

    #[tokio::test]
    async fn test_invalid_setting_is_rejected() {
        let (_, engine) = create_test_engine(vec![]).await;
        let err = engine
            .update_system_config(HashMap::from([(PAYOUT_MODE.to_string(), "sometimes".to_string())]))
            .await
            .unwrap_err();
        assert!(matches!(err, RewardsError::InvalidInput(_)));
        assert_eq!(engine.get_system_config().await.get(PAYOUT_MODE), Some("manual"));
    }
}

// ============================================================================
// Spam
// ============================================================================

mod spam {
    use super::*;

    #[tokio::test]
    async fn test_excess_likes_cost_two_trust_points() {
        let (store, engine) = create_test_engine(vec![]).await;
        store.seed_account(Account::new("liker")).await;

        let now = Utc::now();
        for _ in 0..31 {
            let tx = LedgerEntry::new("like_post", dec!(1), "like").into_transaction("liker", dec!(1), dec!(1), now);
            store.insert_transaction(tx).await;
        }

        let check = engine.check_for_spam("liker", "like_post").await;
        assert!(check.is_spam);
        assert_eq!(
            check.reason.as_deref(),
            Some("Excessive like_post activity (31 in the last hour)")
        );

        let account = engine.get_user_eloits_data("liker").await.unwrap().unwrap();
        assert_eq!(account.trust_score, 48);
        assert_eq!(engine.get_user_spam_records("liker", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_thirty_likes_are_fine() {
        let (store, engine) = create_test_engine(vec![]).await;
        store.seed_account(Account::new("liker")).await;
        for _ in 0..30 {
            let tx = LedgerEntry::new("like_post", dec!(1), "like").into_transaction("liker", dec!(1), dec!(1), Utc::now());
            store.insert_transaction(tx).await;
        }
        assert!(!engine.check_for_spam("liker", "like_post").await.is_spam);
    }
}

// ============================================================================
// Referrals
// ============================================================================

mod referrals {
    use super::*;

    #[tokio::test]
    async fn test_cascade_pays_direct_referrer_and_ancestor() {
        let (_, engine) = create_test_engine(vec![
            RewardRule::new("refer_user", dec!(500)),
            RewardRule::new("multi_level_referral", dec!(1)),
        ])
        .await;
        engine.create_referral_link("grandparent", Some("GP".to_string())).await.unwrap();
        engine.create_referral_link("parent", Some("PARENT".to_string())).await.unwrap();

        engine.process_referral("grandparent", "parent", "GP").await.unwrap();
        let rewards = engine
            .process_multi_level_referral("parent", "child", "PARENT")
            .await
            .unwrap();

        assert_eq!(rewards.len(), 2);
        assert_eq!((rewards[0].level, rewards[0].user_id.as_str()), (1, "parent"));
        assert_eq!(rewards[0].amount, dec!(600));
        assert_eq!((rewards[1].level, rewards[1].user_id.as_str()), (2, "grandparent"));
        assert_eq!(rewards[1].amount, dec!(100));

        let grandparent = engine.get_user_eloits_data("grandparent").await.unwrap().unwrap();
        assert_eq!(grandparent.current_balance, dec!(700));
        assert_eq!(engine.get_user_referrals("parent").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_referee_can_only_be_referred_once() {
        let (_, engine) = create_test_engine(vec![RewardRule::new("refer_user", dec!(500))]).await;
        engine.create_referral_link("a", Some("A".to_string())).await.unwrap();
        engine.create_referral_link("b", Some("B".to_string())).await.unwrap();

        engine.process_referral("a", "new_user", "A").await.unwrap();
        let err = engine.process_referral("b", "new_user", "B").await.unwrap_err();
        assert!(matches!(err, RewardsError::DuplicateReferral));
        assert!(engine.get_user_referrals("b").await.unwrap().is_empty());
    }
}

// ============================================================================
// Redemptions
// ============================================================================

mod redemptions {
    use super::*;

    #[tokio::test]
    async fn test_over_redemption_is_rejected() {
        let (store, engine) = create_test_engine(vec![]).await;
        seed_account(&store, "user_1", dec!(600)).await;

        let err = engine
            .request_redemption("user_1", redemption(dec!(700)))
            .await
            .unwrap_err();
        assert!(matches!(err, RewardsError::InsufficientBalance { .. }));

        let account = store.get_account("user_1").await.unwrap().unwrap();
        assert_eq!(account.current_balance, dec!(600));
        assert!(engine.get_redemptions("user_1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tier_cap_limits_requested_points() {
        let (store, engine) = create_test_engine(vec![]).await;
        seed_account(&store, "bronze", dec!(600)).await;
        seed_account(&store, "gold", dec!(30000)).await;

        let err = engine
            .request_redemption("bronze", redemption(dec!(100)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Maximum redemption for your tier is 5 ELO");
        assert!(engine.get_redemptions("bronze", None).await.unwrap().is_empty());

        // 10000 / 1000 caps gold below its own tier limit of 25
        let err = engine
            .request_redemption("gold", redemption(dec!(11)))
            .await
            .unwrap_err();
        assert!(matches!(err, RewardsError::ExceedsTierCap { limit } if limit == dec!(10)));
        assert!(engine.request_redemption("gold", redemption(dec!(10))).await.is_ok());
    }

    #[tokio::test]
    async fn test_balance_below_minimum_cannot_redeem() {
        let (store, engine) = create_test_engine(vec![]).await;
        seed_account(&store, "user_1", dec!(400)).await;

        let err = engine
            .request_redemption("user_1", redemption(dec!(100)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Minimum balance of 500 ELO required for redemption");
    }

    #[tokio::test]
    async fn test_manual_approval_settles_once() {
        let (store, engine) = create_test_engine(vec![]).await;
        seed_account(&store, "user_1", dec!(3000)).await;

        let receipt = engine
            .request_redemption("user_1", redemption(dec!(5)))
            .await
            .unwrap();
        assert_eq!(receipt.status, RedemptionStatus::Pending);

        for status in [RedemptionStatus::Approved, RedemptionStatus::Processed] {
            engine
                .update_redemption_status(RedemptionUpdate {
                    id: receipt.redemption_id,
                    status,
                    approved_by: Some("admin".to_string()),
                    rejection_reason: None,
                })
                .await
                .unwrap();
        }

        let account = store.get_account("user_1").await.unwrap().unwrap();
        assert_eq!(account.current_balance, dec!(2995));
        assert!(account.current_balance >= Decimal::ZERO);

        let all = engine.list_all_redemptions(Some(RedemptionStatus::Processed)).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].processed_at.is_some());
    }

    #[tokio::test]
    async fn test_rejection_keeps_balance() {
        let (store, engine) = create_test_engine(vec![]).await;
        seed_account(&store, "user_1", dec!(3000)).await;
        let receipt = engine
            .request_redemption("user_1", redemption(dec!(3)))
            .await
            .unwrap();

        let rejected = engine
            .update_redemption_status(RedemptionUpdate {
                id: receipt.redemption_id,
                status: RedemptionStatus::Rejected,
                approved_by: None,
                rejection_reason: Some("payout details incomplete".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some("payout details incomplete"));
        assert_eq!(store.get_account("user_1").await.unwrap().unwrap().current_balance, dec!(3000));
    }
}

// ============================================================================
// HTTP API
// ============================================================================

mod api {
    use super::*;

    #[tokio::test]
    async fn test_health_is_public() {
        let (_, engine) = create_test_engine(vec![]).await;
        let app = create_test_app(engine);

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn test_requests_need_key_and_identity() {
        let (_, engine) = create_test_engine(vec![]).await;
        let app = create_test_app(engine);

        let req = Request::builder().uri("/rewards/tiers").body(Body::empty()).unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, request("GET", "/rewards/tiers", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, request("GET", "/rewards/tiers", Some(("user_1", "user")), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_users_only_see_their_own_data() {
        let (_, engine) = create_test_engine(vec![]).await;
        let app = create_test_app(engine);

        let (status, _) = send(&app, request("GET", "/rewards/user/user_2", Some(("user_1", "user")), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, request("GET", "/rewards/user/user_2", Some(("admin_1", "admin")), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, request("GET", "/rewards/admin/config", Some(("user_1", "user")), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, request("GET", "/rewards/admin/config", Some(("admin_1", "admin")), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["conversion_rate"], "1000");
    }

    #[tokio::test]
    async fn test_award_reports_spam_without_blocking() {
        let (store, engine) = create_test_engine(vec![RewardRule::new("like_post", dec!(5))]).await;
        for _ in 0..30 {
            let tx = LedgerEntry::new("like_post", dec!(1), "like").into_transaction("user_1", dec!(1), dec!(1), Utc::now());
            store.insert_transaction(tx).await;
        }
        let app = create_test_app(engine);

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/rewards/award-points",
                Some(("user_1", "user")),
                Some(json!({ "user_id": "user_1", "action_type": "like_post", "metadata": { "postId": "p1" } })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(decimal_at(&body["data"]["award"]["amount"]), dec!(6));
        assert_eq!(body["data"]["spam"]["is_spam"], true);

        let account = store.get_account("user_1").await.unwrap().unwrap();
        assert_eq!(account.trust_score, 48);
        assert_eq!(account.current_balance, dec!(6));
    }

    #[tokio::test]
    async fn test_admins_cannot_redeem_for_other_users() {
        let (store, engine) = create_test_engine(vec![]).await;
        seed_account(&store, "user_2", dec!(4000)).await;
        let app = create_test_app(engine.clone());

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/rewards/request-redemption",
                Some(("admin_1", "admin")),
                Some(json!({ "user_id": "user_2", "amount": 5, "payout_method": "paypal" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);

        let account = engine.get_user_eloits_data("user_2").await.unwrap().unwrap();
        assert_eq!(account.current_balance, dec!(4000));
        assert!(engine.get_redemptions("user_2", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redemption_flow_over_http() {
        let (store, engine) = create_test_engine(vec![]).await;
        seed_account(&store, "user_1", dec!(400)).await;
        seed_account(&store, "user_2", dec!(4000)).await;
        let app = create_test_app(engine);

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/rewards/request-redemption",
                Some(("user_1", "user")),
                Some(json!({ "user_id": "user_1", "amount": 100, "payout_method": "paypal" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Minimum balance of 500 ELO required for redemption");

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/rewards/request-redemption",
                Some(("user_2", "user")),
                Some(json!({ "user_id": "user_2", "amount": 5, "payout_method": "paypal" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "pending");
        let redemption_id = body["data"]["redemption_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            request(
                "PATCH",
                &format!("/rewards/admin/redemptions/{}", redemption_id),
                Some(("admin_1", "admin")),
                Some(json!({ "status": "approved" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["approved_by"], "admin_1");
        assert_eq!(store.get_account("user_2").await.unwrap().unwrap().current_balance, dec!(3995));

        let (status, body) = send(
            &app,
            request("GET", "/rewards/user/user_2/redemptions?status=approved", Some(("user_2", "user")), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cash_value_endpoint() {
        let (_, engine) = create_test_engine(vec![]).await;
        let app = create_test_app(engine);

        let (status, body) = send(&app, request("GET", "/rewards/cash-value?points=2500", Some(("user_1", "user")), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decimal_at(&body["data"]["cash_value"]), dec!(2.5));
    }
}
