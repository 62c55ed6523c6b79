use rocket::http::{ContentType, Status};

use crate::common::{auth_header, register_and_login, test_client};

#[test]
fn test_create_and_complete_task() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "rex");

    let created: serde_json::Value = client
        .post("/api/v1/tasks")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"title":"Write report"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(created["data"]["priority"], "medium");
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .patch(format!("/api/v1/tasks/{id}/completed"))
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"completed":true}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["data"]["completed"], true);
}

#[test]
fn test_list_tasks_filters_by_completed() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "sara");

    let done: serde_json::Value = client
        .post("/api/v1/tasks")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"title":"Done task"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    let done_id = done["data"]["id"].as_str().unwrap().to_string();
    client
        .patch(format!("/api/v1/tasks/{done_id}/completed"))
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"completed":true}"#)
        .dispatch();

    client
        .post("/api/v1/tasks")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"title":"Pending task"}"#)
        .dispatch();

    let res = client.get("/api/v1/tasks?completed=true").header(auth_header(&token)).dispatch();
    let body: serde_json::Value = res.into_json().unwrap();
    let tasks = body["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["title"], "Done task");
}

#[test]
fn test_task_share_and_unshare() {
    let client = test_client();
    let (_, owner_token) = register_and_login(&client, "tina");
    let (grantee_id, grantee_token) = register_and_login(&client, "umar");

    let created: serde_json::Value = client
        .post("/api/v1/tasks")
        .header(ContentType::JSON)
        .header(auth_header(&owner_token))
        .body(r#"{"title":"Shared task"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    let task_id = created["data"]["id"].as_str().unwrap().to_string();

    client
        .post(format!("/api/v1/tasks/{task_id}/share"))
        .header(ContentType::JSON)
        .header(auth_header(&owner_token))
        .body(format!(r#"{{"user_id":"{grantee_id}","can_edit":true}}"#))
        .dispatch();

    let res = client.get(format!("/api/v1/tasks/{task_id}")).header(auth_header(&grantee_token)).dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .delete(format!("/api/v1/tasks/{task_id}/share/{grantee_id}"))
        .header(auth_header(&owner_token))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/api/v1/tasks/{task_id}")).header(auth_header(&grantee_token)).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn test_task_share_requires_owner() {
    let client = test_client();
    let (_, owner_token) = register_and_login(&client, "vik");
    let (_, other_token) = register_and_login(&client, "wendy");
    let (other_id, _) = register_and_login(&client, "xena");

    let created: serde_json::Value = client
        .post("/api/v1/tasks")
        .header(ContentType::JSON)
        .header(auth_header(&owner_token))
        .body(r#"{"title":"Owner only"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    let task_id = created["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/v1/tasks/{task_id}/share"))
        .header(ContentType::JSON)
        .header(auth_header(&other_token))
        .body(format!(r#"{{"user_id":"{other_id}","can_edit":false}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::NotFound, "a non-owner can't even see the task to share it");
}
