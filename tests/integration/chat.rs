use rocket::http::{ContentType, Status};

use crate::common::{auth_header, register_and_login, test_client};

#[test]
fn test_direct_room_is_created_once_and_reused() {
    let client = test_client();
    let (alice_id, alice_token) = register_and_login(&client, "ray");
    let (_, _bea_token) = register_and_login(&client, "sia");
    let bea_id: serde_json::Value = client
        .get("/api/v1/chat/users")
        .header(auth_header(&alice_token))
        .dispatch()
        .into_json()
        .unwrap();
    let bea_id = bea_id["data"].as_array().unwrap().iter().find(|u| u["username"] == "sia").unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(alice_id, bea_id);

    let first: serde_json::Value = client
        .post("/api/v1/chat/rooms/direct")
        .header(ContentType::JSON)
        .header(auth_header(&alice_token))
        .body(format!(r#"{{"user_id":"{bea_id}"}}"#))
        .dispatch()
        .into_json()
        .unwrap();
    let room_id = first["data"]["id"].as_str().unwrap().to_string();

    let second: serde_json::Value = client
        .post("/api/v1/chat/rooms/direct")
        .header(ContentType::JSON)
        .header(auth_header(&alice_token))
        .body(format!(r#"{{"user_id":"{bea_id}"}}"#))
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(second["data"]["id"].as_str().unwrap(), room_id, "repeated direct-room lookup must not create a duplicate");
}

#[test]
fn test_group_room_requires_at_least_three_participants() {
    let client = test_client();
    let (_, alice_token) = register_and_login(&client, "theo");
    let (bea_id, _) = register_and_login(&client, "uma");

    let res = client
        .post("/api/v1/chat/rooms/group")
        .header(ContentType::JSON)
        .header(auth_header(&alice_token))
        .body(format!(r#"{{"name":"Pair","participant_ids":["{bea_id}"]}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest, "creator + one invitee is only two total participants");
}

#[test]
fn test_message_reaction_toggles() {
    let client = test_client();
    let (_, alice_token) = register_and_login(&client, "vera");
    let (bea_id, _) = register_and_login(&client, "walt");

    let room: serde_json::Value = client
        .post("/api/v1/chat/rooms/direct")
        .header(ContentType::JSON)
        .header(auth_header(&alice_token))
        .body(format!(r#"{{"user_id":"{bea_id}"}}"#))
        .dispatch()
        .into_json()
        .unwrap();
    let room_id = room["data"]["id"].as_str().unwrap().to_string();

    let message: serde_json::Value = client
        .post(format!("/api/v1/chat/rooms/{room_id}/messages"))
        .header(ContentType::JSON)
        .header(auth_header(&alice_token))
        .body(r#"{"body":"hey there"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    let message_id = message["data"]["id"].as_str().unwrap().to_string();

    let react = |path: &str| {
        client
            .post(path)
            .header(ContentType::JSON)
            .header(auth_header(&alice_token))
            .body(r#"{"emoji":"👍"}"#)
            .dispatch()
            .into_json::<serde_json::Value>()
            .unwrap()
    };

    let after_first: serde_json::Value = react(&format!("/api/v1/chat/messages/{message_id}/reactions"));
    assert_eq!(after_first["data"].as_array().unwrap().len(), 1);

    let after_second: serde_json::Value = react(&format!("/api/v1/chat/messages/{message_id}/reactions"));
    assert_eq!(after_second["data"].as_array().unwrap().len(), 0, "second identical reaction removes it");

    let after_third: serde_json::Value = react(&format!("/api/v1/chat/messages/{message_id}/reactions"));
    assert_eq!(after_third["data"].as_array().unwrap().len(), 1, "third identical reaction adds it back");
}

#[test]
fn test_mark_read_is_idempotent() {
    let client = test_client();
    let (_, alice_token) = register_and_login(&client, "xena");
    let (_, bea_token) = register_and_login(&client, "yuri");
    let bea_id: serde_json::Value = client
        .get("/api/v1/chat/users")
        .header(auth_header(&alice_token))
        .dispatch()
        .into_json()
        .unwrap();
    let bea_id =
        bea_id["data"].as_array().unwrap().iter().find(|u| u["username"] == "yuri").unwrap()["id"].as_str().unwrap().to_string();

    let room: serde_json::Value = client
        .post("/api/v1/chat/rooms/direct")
        .header(ContentType::JSON)
        .header(auth_header(&alice_token))
        .body(format!(r#"{{"user_id":"{bea_id}"}}"#))
        .dispatch()
        .into_json()
        .unwrap();
    let room_id = room["data"]["id"].as_str().unwrap().to_string();

    client
        .post(format!("/api/v1/chat/rooms/{room_id}/messages"))
        .header(ContentType::JSON)
        .header(auth_header(&alice_token))
        .body(r#"{"body":"ping"}"#)
        .dispatch();

    let first: serde_json::Value =
        client.post(format!("/api/v1/chat/rooms/{room_id}/read")).header(auth_header(&bea_token)).dispatch().into_json().unwrap();
    let second: serde_json::Value =
        client.post(format!("/api/v1/chat/rooms/{room_id}/read")).header(auth_header(&bea_token)).dispatch().into_json().unwrap();
    assert_eq!(first["data"]["last_read_at"], second["data"]["last_read_at"]);
}

#[test]
fn test_non_participant_cannot_read_room_messages() {
    let client = test_client();
    let (_, alice_token) = register_and_login(&client, "zane");
    let (bea_id, _) = register_and_login(&client, "abby");
    let (_, carl_token) = register_and_login(&client, "carl");

    let room: serde_json::Value = client
        .post("/api/v1/chat/rooms/direct")
        .header(ContentType::JSON)
        .header(auth_header(&alice_token))
        .body(format!(r#"{{"user_id":"{bea_id}"}}"#))
        .dispatch()
        .into_json()
        .unwrap();
    let room_id = room["data"]["id"].as_str().unwrap().to_string();

    let res = client.get(format!("/api/v1/chat/rooms/{room_id}/messages")).header(auth_header(&carl_token)).dispatch();
    assert_eq!(res.status(), Status::NotFound, "room must be indistinguishable from nonexistent to non-participants");
}
