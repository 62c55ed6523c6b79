use rocket::http::{ContentType, Status};

use crate::common::{auth_header, register_and_login, test_client};

#[test]
fn test_default_folders_seeded_on_register() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "finn");
    let res = client.get("/api/v1/folders").header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let names: Vec<&str> = body["data"].as_array().unwrap().iter().map(|f| f["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"Work"));
    assert!(names.contains(&"Personal"));
    assert!(names.contains(&"Archive"));
}

#[test]
fn test_create_and_move_folder() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "gwen");

    let res = client
        .post("/api/v1/folders")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"name":"Projects"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let parent: serde_json::Value = res.into_json().unwrap();
    let parent_id = parent["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .post("/api/v1/folders")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"name":"Subproject"}"#)
        .dispatch();
    let child: serde_json::Value = res.into_json().unwrap();
    let child_id = child["data"]["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/v1/folders/{child_id}/move"))
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(format!(r#"{{"parent_id":"{parent_id}"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn test_move_folder_into_own_descendant_is_cyclic() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "hank");

    let parent: serde_json::Value = client
        .post("/api/v1/folders")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"name":"Parent"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    let parent_id = parent["data"]["id"].as_str().unwrap().to_string();

    let child: serde_json::Value = client
        .post("/api/v1/folders")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(format!(r#"{{"name":"Child","parent_id":"{parent_id}"}}"#))
        .dispatch()
        .into_json()
        .unwrap();
    let child_id = child["data"]["id"].as_str().unwrap().to_string();

    // Moving the parent under its own child would create a cycle.
    let res = client
        .post(format!("/api/v1/folders/{parent_id}/move"))
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(format!(r#"{{"parent_id":"{child_id}"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn test_delete_nonempty_folder_rejected_without_recursive_flag() {
    let client = test_client();
    let (_, token) = register_and_login(&client, "iris");

    let parent: serde_json::Value = client
        .post("/api/v1/folders")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(r#"{"name":"Keepsakes"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    let parent_id = parent["data"]["id"].as_str().unwrap().to_string();

    client
        .post("/api/v1/folders")
        .header(ContentType::JSON)
        .header(auth_header(&token))
        .body(format!(r#"{{"name":"Nested","parent_id":"{parent_id}"}}"#))
        .dispatch();

    let res = client.delete(format!("/api/v1/folders/{parent_id}")).header(auth_header(&token)).dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn test_folder_not_visible_to_other_user() {
    let client = test_client();
    let (_, token_a) = register_and_login(&client, "jack");
    let (_, token_b) = register_and_login(&client, "kate");

    let folder: serde_json::Value = client
        .post("/api/v1/folders")
        .header(ContentType::JSON)
        .header(auth_header(&token_a))
        .body(r#"{"name":"Private"}"#)
        .dispatch()
        .into_json()
        .unwrap();
    let folder_id = folder["data"]["id"].as_str().unwrap().to_string();

    let res = client.get(format!("/api/v1/folders/{folder_id}")).header(auth_header(&token_b)).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}
