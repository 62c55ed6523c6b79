use rocket::http::{ContentType, Status};

use crate::common::{auth_header, register_and_login, test_client};

#[test]
fn test_register_and_whoami() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "alice");

    let res = client.get("/api/v1/auth/whoami").header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["data"]["username"], "alice");
}

#[test]
fn test_register_weak_password_rejected() {
    let client = test_client();
    let res = client
        .post("/api/v1/auth/register")
        .header(ContentType::JSON)
        .body(r#"{"username":"weakpw","password":"short"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_register_duplicate_username_conflicts() {
    let client = test_client();
    register_and_login(&client, "dupe");
    let res = client
        .post("/api/v1/auth/register")
        .header(ContentType::JSON)
        .body(r#"{"username":"dupe","password":"Sup3r-Secret-Passw0rd!"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn test_login_wrong_password() {
    let client = test_client();
    register_and_login(&client, "bob");
    let res = client
        .post("/api/v1/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"username_or_email":"bob","password":"Totally-Wrong-1!"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_whoami_without_token_rejected() {
    let client = test_client();
    let res = client.get("/api/v1/auth/whoami").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_refresh_rotates_tokens() {
    let client = test_client();
    register_and_login(&client, "carol");
    let res = client
        .post("/api/v1/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"username_or_email":"carol","password":"Sup3r-Secret-Passw0rd!"}"#)
        .dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    let refresh_token = body["data"]["refresh_token"].as_str().unwrap().to_string();

    let res = client
        .post("/api/v1/auth/refresh")
        .header(ContentType::JSON)
        .body(format!(r#"{{"refresh_token":"{refresh_token}"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    // The old refresh token was revoked by rotation; reusing it must fail.
    let res = client
        .post("/api/v1/auth/refresh")
        .header(ContentType::JSON)
        .body(format!(r#"{{"refresh_token":"{refresh_token}"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_logout_revokes_refresh_token() {
    let client = test_client();
    register_and_login(&client, "dave");
    let res = client
        .post("/api/v1/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"username_or_email":"dave","password":"Sup3r-Secret-Passw0rd!"}"#)
        .dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    let access_token = body["data"]["access_token"].as_str().unwrap().to_string();
    let refresh_token = body["data"]["refresh_token"].as_str().unwrap().to_string();

    let res = client
        .post("/api/v1/auth/logout")
        .header(ContentType::JSON)
        .header(auth_header(&access_token))
        .body(format!(r#"{{"refresh_token":"{refresh_token}"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .post("/api/v1/auth/refresh")
        .header(ContentType::JSON)
        .body(format!(r#"{{"refresh_token":"{refresh_token}"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn test_2fa_enable_and_login_requires_code() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "erin");

    let res = client.post("/api/v1/auth/2fa/enable").header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);

    // Login without the TOTP step should signal need_2fa rather than issue tokens.
    let res = client
        .post("/api/v1/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"username_or_email":"erin","password":"Sup3r-Secret-Passw0rd!"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["data"]["need_2fa"], false, "2fa is only pending until confirmed");
}
