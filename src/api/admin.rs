//! Admin API Endpoints
//!
//! Settings, reward rules, redemption review, referral links, trust decay and
//! the marketplace reward hooks. Every route sits behind
//! [`require_admin`](crate::api::middleware::require_admin).

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::info;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Caller;
use crate::api::rewards::{PageQuery, RewardsApiState, StatusQuery};
use crate::rewards::{
    ActionResult, AwardOutcome, Redemption, RedemptionStatus, RedemptionUpdate, ReferralLink,
    RewardRule, SpamDetection, TrustDecayEntry,
};

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    pub config: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRedemptionRequest {
    pub status: RedemptionStatus,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReferralLinkRequest {
    pub user_id: String,
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpamDecayRequest {
    pub reason: String,
    pub activity_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarketplacePurchaseRequest {
    pub user_id: String,
    pub purchase_amount: Decimal,
    pub product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductSoldRequest {
    pub user_id: String,
    pub product_id: String,
}

pub fn create_router(state: RewardsApiState) -> Router {
    Router::new()
        .route("/config", get(get_config).post(update_config))
        .route("/reward-rules", get(list_reward_rules).post(upsert_reward_rule))
        .route("/redemptions", get(list_redemptions))
        .route("/redemptions/{redemption_id}", patch(update_redemption))
        .route("/referral-links", post(create_referral_link))
        .route("/decay/inactivity/{user_id}", post(apply_inactivity_decay))
        .route("/decay/spam/{user_id}", post(apply_spam_decay))
        .route("/users/{user_id}/spam-records", get(get_spam_records))
        .route("/users/{user_id}/decay-history", get(get_decay_history))
        .route("/hooks/marketplace-purchase", post(marketplace_purchase))
        .route("/hooks/product-sold", post(product_sold))
        .with_state(state)
}

/// GET /rewards/admin/config
pub async fn get_config(State(state): State<RewardsApiState>) -> Json<ActionResult<BTreeMap<String, String>>> {
    let config = state.engine.get_system_config().await;
    Json(ActionResult::ok(config.values().clone(), "System config"))
}

/// POST /rewards/admin/config
pub async fn update_config(
    State(state): State<RewardsApiState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<UpdateConfigRequest>,
) -> ApiResult<Json<ActionResult<BTreeMap<String, String>>>> {
    let entries: HashMap<String, String> = body
        .config
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect();
    let keys: Vec<String> = entries.keys().cloned().collect();

    state.engine.update_system_config(entries).await?;
    info!(admin = %caller.user_id, keys = ?keys, "System config updated");

    let config = state.engine.get_system_config().await;
    Ok(Json(ActionResult::ok(config.values().clone(), "System config updated")))
}

/// GET /rewards/admin/reward-rules
pub async fn list_reward_rules(
    State(state): State<RewardsApiState>,
) -> ApiResult<Json<ActionResult<Vec<RewardRule>>>> {
    let rules = state.engine.list_all_reward_rules().await?;
    Ok(Json(ActionResult::ok(rules, "Reward rules")))
}

/// POST /rewards/admin/reward-rules
pub async fn upsert_reward_rule(
    State(state): State<RewardsApiState>,
    Json(rule): Json<RewardRule>,
) -> ApiResult<Json<ActionResult<RewardRule>>> {
    let rule = state.engine.upsert_reward_rule(rule).await?;
    Ok(Json(ActionResult::ok(rule, "Reward rule saved")))
}

/// GET /rewards/admin/redemptions?status
pub async fn list_redemptions(
    State(state): State<RewardsApiState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<ActionResult<Vec<Redemption>>>> {
    let rows = state.engine.list_all_redemptions(query.status).await?;
    Ok(Json(ActionResult::ok(rows, "Redemptions")))
}

/// PATCH /rewards/admin/redemptions/{redemption_id}
pub async fn update_redemption(
    State(state): State<RewardsApiState>,
    Extension(caller): Extension<Caller>,
    Path(redemption_id): Path<Uuid>,
    Json(body): Json<UpdateRedemptionRequest>,
) -> ApiResult<Json<ActionResult<Redemption>>> {
    if body.status == RedemptionStatus::Rejected && body.rejection_reason.is_none() {
        return Err(ApiError::BadRequest("rejection_reason is required".to_string()));
    }
    let redemption = state
        .engine
        .update_redemption_status(RedemptionUpdate {
            id: redemption_id,
            status: body.status,
            approved_by: body.approved_by.or(Some(caller.user_id)),
            rejection_reason: body.rejection_reason,
        })
        .await?;
    Ok(Json(ActionResult::ok(redemption, "Redemption updated")))
}

/// POST /rewards/admin/referral-links
pub async fn create_referral_link(
    State(state): State<RewardsApiState>,
    Json(body): Json<CreateReferralLinkRequest>,
) -> ApiResult<Json<ActionResult<ReferralLink>>> {
    let link = state
        .engine
        .create_referral_link(&body.user_id, body.referral_code)
        .await?;
    Ok(Json(ActionResult::ok(link, "Referral link created")))
}

/// POST /rewards/admin/decay/inactivity/{user_id}
pub async fn apply_inactivity_decay(
    State(state): State<RewardsApiState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ActionResult<Option<TrustDecayEntry>>>> {
    let entry = state.engine.apply_inactivity_decay(&user_id).await?;
    let message = if entry.is_some() {
        "Inactivity decay applied"
    } else {
        "No decay due"
    };
    Ok(Json(ActionResult::ok(entry, message)))
}

/// POST /rewards/admin/decay/spam/{user_id}
pub async fn apply_spam_decay(
    State(state): State<RewardsApiState>,
    Path(user_id): Path<String>,
    Json(body): Json<SpamDecayRequest>,
) -> ApiResult<Json<ActionResult<Option<TrustDecayEntry>>>> {
    let entry = state
        .engine
        .apply_spam_decay(&user_id, &body.reason, body.activity_type.as_deref())
        .await?;
    Ok(Json(ActionResult::ok(entry, "Spam decay applied")))
}

/// GET /rewards/admin/users/{user_id}/spam-records?limit
pub async fn get_spam_records(
    State(state): State<RewardsApiState>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<ActionResult<Vec<SpamDetection>>>> {
    let rows = state.engine.get_user_spam_records(&user_id, page.limit).await?;
    Ok(Json(ActionResult::ok(rows, "Spam records")))
}

/// GET /rewards/admin/users/{user_id}/decay-history?limit
pub async fn get_decay_history(
    State(state): State<RewardsApiState>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<ActionResult<Vec<TrustDecayEntry>>>> {
    let rows = state.engine.get_trust_decay_history(&user_id, page.limit).await?;
    Ok(Json(ActionResult::ok(rows, "Trust decay history")))
}

/// POST /rewards/admin/hooks/marketplace-purchase
pub async fn marketplace_purchase(
    State(state): State<RewardsApiState>,
    Json(body): Json<MarketplacePurchaseRequest>,
) -> ApiResult<Json<ActionResult<AwardOutcome>>> {
    let outcome = state
        .engine
        .handle_marketplace_purchase_reward(&body.user_id, body.purchase_amount, &body.product_id)
        .await?;
    let message = outcome.message.clone();
    Ok(Json(ActionResult::ok(outcome, message)))
}

/// POST /rewards/admin/hooks/product-sold
pub async fn product_sold(
    State(state): State<RewardsApiState>,
    Json(body): Json<ProductSoldRequest>,
) -> ApiResult<Json<ActionResult<AwardOutcome>>> {
    let outcome = state
        .engine
        .handle_product_sold_reward(&body.user_id, &body.product_id)
        .await?;
    let message = outcome.message.clone();
    Ok(Json(ActionResult::ok(outcome, message)))
}
