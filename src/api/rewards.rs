//! Rewards API Endpoints
//!
//! User-facing routes. The caller comes from [`Caller`]; users may only touch
//! their own data unless they are admins.

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Caller;
use crate::rewards::{
    Account, ActionResult, AwardOutcome, EloitsEngine, LevelReward, Redemption, RedemptionReceipt,
    RedemptionRequest, RedemptionStatus, ReferralEdge, RewardTransaction, SpamCheck, TierConfig,
    TrustHistoryEntry,
};

/// Shared state for the rewards and admin routers
#[derive(Clone)]
pub struct RewardsApiState {
    pub engine: Arc<EloitsEngine>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<RedemptionStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CashValueQuery {
    pub points: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AwardPointsRequest {
    pub user_id: String,
    pub action_type: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Serialize)]
pub struct AwardPointsResponse {
    pub award: AwardOutcome,
    /// Advisory only; the award above already committed
    pub spam: SpamCheck,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTrustScoreRequest {
    pub user_id: String,
    pub score_change: i32,
    pub reason: String,
    pub activity_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub user_id: String,
    pub amount: Decimal,
    pub payout_method: String,
    #[serde(default)]
    pub payout_details: Value,
}

#[derive(Debug, Deserialize)]
pub struct ProcessReferralRequest {
    pub referrer_id: String,
    pub referee_id: String,
    pub referral_code: String,
}

#[derive(Debug, Serialize)]
pub struct CashValueResponse {
    pub points: Decimal,
    pub cash_value: Decimal,
}

pub fn create_router(state: RewardsApiState) -> Router {
    Router::new()
        .route("/user/{user_id}", get(get_user_data))
        .route("/user/{user_id}/transactions", get(get_transactions))
        .route("/user/{user_id}/trust-history", get(get_trust_history))
        .route("/user/{user_id}/referrals", get(get_referrals))
        .route("/user/{user_id}/redemptions", get(get_redemptions))
        .route("/award-points", post(award_points))
        .route("/update-trust-score", post(update_trust_score))
        .route("/request-redemption", post(request_redemption))
        .route("/process-referral", post(process_referral))
        .route("/tiers", get(get_tiers))
        .route("/cash-value", get(get_cash_value))
        .with_state(state)
}

/// GET /rewards/user/{user_id}
pub async fn get_user_data(
    State(state): State<RewardsApiState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ActionResult<Account>>> {
    caller.ensure_can_access(&user_id)?;
    let account = state
        .engine
        .get_user_eloits_data(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User reward data not found".to_string()))?;
    Ok(Json(ActionResult::ok(account, "User reward data")))
}

/// GET /rewards/user/{user_id}/transactions?limit&offset
pub async fn get_transactions(
    State(state): State<RewardsApiState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<ActionResult<Vec<RewardTransaction>>>> {
    caller.ensure_can_access(&user_id)?;
    let rows = state
        .engine
        .get_transaction_history(&user_id, page.limit, page.offset)
        .await?;
    Ok(Json(ActionResult::ok(rows, "Transaction history")))
}

/// GET /rewards/user/{user_id}/trust-history?limit
pub async fn get_trust_history(
    State(state): State<RewardsApiState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<ActionResult<Vec<TrustHistoryEntry>>>> {
    caller.ensure_can_access(&user_id)?;
    let rows = state.engine.get_trust_history(&user_id, page.limit).await?;
    Ok(Json(ActionResult::ok(rows, "Trust history")))
}

/// GET /rewards/user/{user_id}/referrals
pub async fn get_referrals(
    State(state): State<RewardsApiState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ActionResult<Vec<ReferralEdge>>>> {
    caller.ensure_can_access(&user_id)?;
    let rows = state.engine.get_user_referrals(&user_id).await?;
    Ok(Json(ActionResult::ok(rows, "Referrals")))
}

/// GET /rewards/user/{user_id}/redemptions?status
pub async fn get_redemptions(
    State(state): State<RewardsApiState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<ActionResult<Vec<Redemption>>>> {
    caller.ensure_can_access(&user_id)?;
    let rows = state.engine.get_redemptions(&user_id, query.status).await?;
    Ok(Json(ActionResult::ok(rows, "Redemptions")))
}

/// POST /rewards/award-points
pub async fn award_points(
    State(state): State<RewardsApiState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<AwardPointsRequest>,
) -> ApiResult<Json<ActionResult<AwardPointsResponse>>> {
    caller.ensure_can_access(&body.user_id)?;
    let award = state
        .engine
        .award_points(&body.user_id, &body.action_type, body.metadata)
        .await?;
    let spam = state
        .engine
        .check_for_spam(&body.user_id, &body.action_type)
        .await;

    let message = award.message.clone();
    Ok(Json(ActionResult::ok(AwardPointsResponse { award, spam }, message)))
}

/// POST /rewards/update-trust-score (admin)
pub async fn update_trust_score(
    State(state): State<RewardsApiState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<UpdateTrustScoreRequest>,
) -> ApiResult<Json<ActionResult<TrustHistoryEntry>>> {
    if !caller.is_admin {
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }
    let entry = state
        .engine
        .update_trust_score(
            &body.user_id,
            body.score_change,
            &body.reason,
            body.activity_type.as_deref(),
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("User reward data not found".to_string()))?;

    info!(admin = %caller.user_id, user_id = %body.user_id, delta = body.score_change, "Trust score adjusted by admin");
    Ok(Json(ActionResult::ok(entry, "Trust score updated")))
}

/// POST /rewards/request-redemption
pub async fn request_redemption(
    State(state): State<RewardsApiState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<RedeemRequest>,
) -> ApiResult<Json<ActionResult<RedemptionReceipt>>> {
    // Only the owner can cash out, admins included
    if caller.user_id != body.user_id {
        return Err(ApiError::Forbidden("Access denied".to_string()));
    }
    let receipt = state
        .engine
        .request_redemption(
            &body.user_id,
            RedemptionRequest {
                amount: body.amount,
                payout_method: body.payout_method,
                payout_details: body.payout_details,
            },
        )
        .await?;
    let message = receipt.message.clone();
    Ok(Json(ActionResult::ok(receipt, message)))
}

/// POST /rewards/process-referral
pub async fn process_referral(
    State(state): State<RewardsApiState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<ProcessReferralRequest>,
) -> ApiResult<Json<ActionResult<Vec<LevelReward>>>> {
    caller.ensure_can_access(&body.referrer_id)?;
    let rewards = state
        .engine
        .process_multi_level_referral(&body.referrer_id, &body.referee_id, &body.referral_code)
        .await?;
    Ok(Json(ActionResult::ok(rewards, "Referral processed")))
}

/// GET /rewards/tiers
pub async fn get_tiers(State(state): State<RewardsApiState>) -> Json<ActionResult<&'static [TierConfig]>> {
    Json(ActionResult::ok(state.engine.get_all_tiers(), "Tiers"))
}

/// GET /rewards/cash-value?points
pub async fn get_cash_value(
    State(state): State<RewardsApiState>,
    Query(query): Query<CashValueQuery>,
) -> ApiResult<Json<ActionResult<CashValueResponse>>> {
    if query.points < Decimal::ZERO {
        return Err(ApiError::BadRequest("points cannot be negative".to_string()));
    }
    let cash_value = state.engine.calculate_cash_value(query.points).await;
    Ok(Json(ActionResult::ok(
        CashValueResponse {
            points: query.points,
            cash_value,
        },
        "Cash value",
    )))
}
