use rocket::http::Status;

use crate::common::{auth_header, register_and_login, test_client};

#[test]
fn test_health_check_ok() {
    let client = test_client();
    let res = client.get("/health").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "ok");
}

#[test]
fn test_every_response_carries_a_request_id() {
    let client = test_client();
    let res = client.get("/health").dispatch();
    assert!(res.headers().get_one("X-Request-ID").is_some());
}

#[test]
fn test_error_envelope_echoes_request_id_in_meta() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "nora");

    // A handler-level `AppError` (not a request-guard rejection) goes
    // through the `AppError` Responder, so its body's `meta.requestId`
    // must match the header the request-id fairing stamped on the same
    // response (§7: "the request id is always echoed").
    let res = client.get("/api/v1/notes/does-not-exist").header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::NotFound);
    let header_id = res.headers().get_one("X-Request-ID").unwrap().to_string();
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["meta"]["requestId"], header_id);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}
