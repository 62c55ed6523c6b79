use rocket::http::{ContentType, Status};

use crate::common::{auth_header, register_and_login, test_client};

#[test]
fn test_create_list_and_filter_notes() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "lara");

    client
        .post("/api/v1/notes")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"title":"Grocery list","body":"milk, eggs","tags":["home"]}"#)
        .dispatch();
    client
        .post("/api/v1/notes")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"title":"Trip plan","body":"itinerary","tags":["travel"],"favorite":true}"#)
        .dispatch();

    let res = client.get("/api/v1/notes?tag=home").header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let notes = body["data"].as_array().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["title"], "Grocery list");
}

#[test]
fn test_update_note_persists_fields() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "milo");

    let created: serde_json::Value = client
        .post("/api/v1/notes")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"title":"Draft","body":"v1"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .patch(format!("/api/v1/notes/{id}"))
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"body":"v2","pinned":true}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["data"]["body"], "v2");
    assert_eq!(body["data"]["pinned"], true);
    assert_eq!(body["data"]["title"], "Draft");
}

#[test]
fn test_share_note_grants_read_access() {
    let client = test_client();
    let (_, owner_token) = register_and_login(&client, "nina");
    let (grantee_id, grantee_token) = register_and_login(&client, "oscar");

    let created: serde_json::Value = client
        .post("/api/v1/notes")
        .header(ContentType::JSON)
        .header(auth_header(&owner_token))
        .body(r#"{"title":"Shared","body":"secret"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    let note_id = created["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .get(format!("/api/v1/notes/{note_id}"))
        .header(auth_header(&grantee_token))
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);

    let res = client
        .post(format!("/api/v1/notes/{note_id}/share"))
        .header(ContentType::JSON)
        .header(auth_header(&owner_token))
        .body(format!(r#"{{"user_id":"{grantee_id}","can_edit":false}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .get(format!("/api/v1/notes/{note_id}"))
        .header(auth_header(&grantee_token))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["data"]["can_edit"], false);
}

#[test]
fn test_share_note_with_self_rejected() {
    let client = test_client();
    let (owner_id, token) = register_and_login(&client, "penny");
    let created: serde_json::Value = client
        .post("/api/v1/notes")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"title":"Self","body":"x"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    let note_id = created["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/v1/notes/{note_id}/share"))
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(format!(r#"{{"user_id":"{owner_id}","can_edit":false}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn test_delete_note_removes_it() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "quinn");
    let created: serde_json::Value = client
        .post("/api/v1/notes")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"title":"Temp","body":"x"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let res = client.delete(format!("/api/v1/notes/{id}")).header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/api/v1/notes/{id}")).header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}
