use rocket::http::{ContentType, Status};

use crate::common::{admin_login, auth_header, register_and_login, test_client};

#[test]
fn test_admin_can_list_and_lock_a_user() {
    let client = test_client();
    let admin_token = admin_login(&client);
    let (user_id, user_token) = register_and_login(&client, "odell");

    let res = client.get("/api/v1/admin/users").header(auth_header(&admin_token)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let usernames: Vec<&str> = body["data"].as_array().unwrap().iter().map(|u| u["username"].as_str().unwrap()).collect();
    assert!(usernames.contains(&"odell"));

    let res = client.post(format!("/api/v1/admin/users/{user_id}/lock")).header(auth_header(&admin_token)).dispatch();
    assert_eq!(res.status(), Status::Ok);

    // The locked account's existing access token is now rejected.
    let res = client.get("/api/v1/folders").header(auth_header(&user_token)).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn test_non_admin_cannot_reach_admin_routes() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "paz");
    let res = client.get("/api/v1/admin/users").header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn test_bootstrap_admin_cannot_be_locked_or_deleted() {
    let client = test_client();
    let admin_token = admin_login(&client);
    let whoami: serde_json::Value =
        client.get("/api/v1/auth/whoami").header(auth_header(&admin_token)).dispatch().into_json().unwrap();
    let admin_id = whoami["data"]["id"].as_str().unwrap().to_string();

    let res = client.post(format!("/api/v1/admin/users/{admin_id}/lock")).header(auth_header(&admin_token)).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"]["code"], "FORBIDDEN_PROTECTED");

    let res = client.delete(format!("/api/v1/admin/users/{admin_id}")).header(auth_header(&admin_token)).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn test_admin_grant_and_revoke_admin() {
    let client = test_client();
    let admin_token = admin_login(&client);
    let (user_id, user_token) = register_and_login(&client, "quinn");

    client.post(format!("/api/v1/admin/users/{user_id}/grant-admin")).header(auth_header(&admin_token)).dispatch();
    let res = client.get("/api/v1/admin/users").header(auth_header(&user_token)).dispatch();
    assert_eq!(res.status(), Status::Ok, "quinn should now have admin privileges");

    let res = client
        .post(format!("/api/v1/admin/users/{user_id}/revoke-admin"))
        .header(auth_header(&admin_token))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let res = client.get("/api/v1/admin/users").header(auth_header(&user_token)).dispatch();
    assert_eq!(res.status(), Status::Forbidden, "revoked admin should lose access again");
}

#[test]
fn test_change_password_requires_correct_old_password() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "riko");
    let res = client
        .post("/api/v1/auth/change-password")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"old_password":"wrong","new_password":"Another-Strong-Pass9!"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}
