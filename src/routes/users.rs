//! User search, for picking sharing/chat-invite targets (§ Open Questions —
//! 2-character minimum, enumeration risk accepted and mitigated only by
//! requiring authentication).

use std::sync::Arc;

use rocket::get;
use rocket::State;

use crate::identity::IdentityService;
use crate::models::UserSearchResult;

use super::{ApiResult, AuthUser, Envelope};

#[get("/users/search?<q>")]
pub fn search_users(q: &str, auth: AuthUser, identity: &State<Arc<IdentityService>>) -> ApiResult<Vec<UserSearchResult>> {
    let results = identity
        .search_by_username(q, &auth.0.id)?
        .into_iter()
        .map(|u| UserSearchResult { id: u.id, username: u.username })
        .collect();
    Ok(Envelope::ok(results))
}
