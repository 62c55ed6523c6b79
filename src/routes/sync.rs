//! Offline replay submission endpoint (§4.9).

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{post, State};

use crate::models::SyncBatchRequest;
use crate::models::SyncBatchResponse;
use crate::sync::SyncReplayService;

use super::{ApiResult, AuthUser, Envelope};

#[post("/sync/batch", data = "<body>")]
pub fn sync_batch(body: Json<SyncBatchRequest>, auth: AuthUser, sync: &State<Arc<SyncReplayService>>) -> ApiResult<SyncBatchResponse> {
    let outcomes = sync.replay(&auth.0.id, &body.items);
    Ok(Envelope::ok(SyncBatchResponse { outcomes }))
}
