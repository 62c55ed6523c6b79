//! Administrative user management (§4.2). Every handler here additionally
//! requires `AdminUser`; the bootstrap admin itself is protected from all of
//! these by `IdentityService::set_locked`/`set_admin`/`delete_user`. An admin
//! can also never revoke their own admin rights or delete their own account.

use std::sync::Arc;

use rocket::{delete, get, post, State};

use crate::errors::AppError;
use crate::identity::IdentityService;
use crate::models::{AdminUserRow, UserPublic};

use super::{AdminUser, ApiResult, Envelope};

#[get("/admin/users")]
pub fn admin_list_users(_admin: AdminUser, identity: &State<Arc<IdentityService>>) -> ApiResult<Vec<AdminUserRow>> {
    let rows = identity.list_all()?.iter().map(|u| AdminUserRow { user: UserPublic::from(u) }).collect();
    Ok(Envelope::ok(rows))
}

#[post("/admin/users/<id>/lock")]
pub fn admin_lock_user(id: &str, _admin: AdminUser, identity: &State<Arc<IdentityService>>) -> ApiResult<()> {
    let target = identity.find_by_id(id)?.ok_or_else(|| crate::errors::AppError::not_found("user not found"))?;
    identity.set_locked(&target, true)?;
    Ok(Envelope::ok(()))
}

#[post("/admin/users/<id>/unlock")]
pub fn admin_unlock_user(id: &str, _admin: AdminUser, identity: &State<Arc<IdentityService>>) -> ApiResult<()> {
    let target = identity.find_by_id(id)?.ok_or_else(|| crate::errors::AppError::not_found("user not found"))?;
    identity.set_locked(&target, false)?;
    Ok(Envelope::ok(()))
}

#[post("/admin/users/<id>/grant-admin")]
pub fn admin_grant_admin(id: &str, _admin: AdminUser, identity: &State<Arc<IdentityService>>) -> ApiResult<()> {
    let target = identity.find_by_id(id)?.ok_or_else(|| crate::errors::AppError::not_found("user not found"))?;
    identity.set_admin(&target, true)?;
    Ok(Envelope::ok(()))
}

#[post("/admin/users/<id>/revoke-admin")]
pub fn admin_revoke_admin(id: &str, admin: AdminUser, identity: &State<Arc<IdentityService>>) -> ApiResult<()> {
    if id == admin.0.id {
        return Err(AppError::forbidden("you cannot revoke your own admin privileges"));
    }
    let target = identity.find_by_id(id)?.ok_or_else(|| crate::errors::AppError::not_found("user not found"))?;
    identity.set_admin(&target, false)?;
    Ok(Envelope::ok(()))
}

#[post("/admin/users/<id>/disable-2fa")]
pub fn admin_disable_2fa(id: &str, _admin: AdminUser, identity: &State<Arc<IdentityService>>) -> ApiResult<()> {
    let target = identity.find_by_id(id)?.ok_or_else(|| crate::errors::AppError::not_found("user not found"))?;
    identity.force_disable_2fa(&target)?;
    Ok(Envelope::ok(()))
}

#[delete("/admin/users/<id>")]
pub fn admin_delete_user(id: &str, admin: AdminUser, identity: &State<Arc<IdentityService>>) -> ApiResult<()> {
    if id == admin.0.id {
        return Err(AppError::forbidden("you cannot delete your own account"));
    }
    let target = identity.find_by_id(id)?.ok_or_else(|| crate::errors::AppError::not_found("user not found"))?;
    identity.delete_user(&target)?;
    Ok(Envelope::ok(()))
}
