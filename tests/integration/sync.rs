use rocket::http::{ContentType, Status};

use crate::common::{auth_header, register_and_login, test_client};

#[test]
fn test_offline_batch_creates_then_updates_via_temp_id() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "ines");

    let batch = r#"{"items":[
        {"client_id":"c1","operation":"create","entity_type":"note","entity_id":null,"data":{"title":"x","body":""}},
        {"client_id":"c2","operation":"update","entity_type":"note","entity_id":"c1","data":{"title":"y"}}
    ]}"#;

    let res = client
        .post("/api/v1/sync/batch")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(batch)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let outcomes = body["data"]["outcomes"].as_array().unwrap();
    assert_eq!(outcomes[0]["status"], "ok");
    let server_id = outcomes[0]["server_id"].as_str().unwrap().to_string();
    assert_eq!(outcomes[1]["status"], "ok");

    let note: serde_json::Value = client
        .get(format!("/api/v1/notes/{server_id}"))
        .header(auth_header(&token))
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(note["data"]["title"], "y");

    // Replaying the identical batch is a no-op and yields the same final state.
    let res2 = client
        .post("/api/v1/sync/batch")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(batch)
        .dispatch();
    let body2: serde_json::Value = res2.into_json().unwrap();
    let outcomes2 = body2["data"]["outcomes"].as_array().unwrap();
    assert_eq!(outcomes2[0]["server_id"].as_str().unwrap(), server_id, "replay maps the temp id to the same server id");
    assert!(outcomes2[0]["no_op"].as_bool().unwrap());
    assert!(outcomes2[1]["no_op"].as_bool().unwrap());

    let note_after: serde_json::Value = client
        .get(format!("/api/v1/notes/{server_id}"))
        .header(auth_header(&token))
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(note_after["data"]["title"], "y", "title remains from the first replay, not re-applied");
}

#[test]
fn test_sync_batch_continues_after_a_conflicting_item() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "joss");

    let batch = r#"{"items":[
        {"client_id":"bad1","operation":"update","entity_type":"note","entity_id":"does-not-exist","data":{"title":"z"}},
        {"client_id":"good1","operation":"create","entity_type":"note","entity_id":null,"data":{"title":"fine","body":""}}
    ]}"#;

    let res = client
        .post("/api/v1/sync/batch")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(batch)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let outcomes = body["data"]["outcomes"].as_array().unwrap();
    assert_eq!(outcomes[0]["status"], "error");
    assert_eq!(outcomes[1]["status"], "ok", "one bad item must not abort the rest of the batch");
}
