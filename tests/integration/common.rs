use std::sync::Once;

use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;

static ENV_SETUP: Once = Once::new();

/// Sets the process-wide config env vars the crate requires at boot, once.
/// A constant `JWT_SECRET`/admin credential pair is safe to share across every
/// test case since only the database path (passed to `rocket_with_db`)
/// varies between them.
fn ensure_env() {
    ENV_SETUP.call_once(|| {
        std::env::set_var("JWT_SECRET", "0".repeat(64));
        std::env::set_var("ADMIN_USERNAME", "admin");
        std::env::set_var("ADMIN_PASSWORD", "Sup3r-Secret-Passw0rd!");
    });
}

/// Wrapper around `Client` that deletes the temp DB (and its WAL/SHM
/// sidecars) on drop, so repeated test runs don't accumulate files.
pub struct TestClient {
    client: Option<Client>,
    db_path: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

pub fn test_client() -> TestClient {
    ensure_env();
    let db_path = format!("/tmp/noteflow_test_{}.db", uuid::Uuid::new_v4().to_string().split('-').next().unwrap());
    let rocket = noteflow_core::rocket_with_db(&db_path);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), db_path }
}

/// Registers a fresh user and returns `(user_id, access_token)`.
pub fn register_and_login(client: &Client, username: &str) -> (String, String) {
    let password = "Sup3r-Secret-Passw0rd!";
    let res = client
        .post("/api/v1/auth/register")
        .header(ContentType::JSON)
        .body(format!(r#"{{"username":"{username}","password":"{password}"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok, "register failed for {username}");

    let res = client
        .post("/api/v1/auth/login")
        .header(ContentType::JSON)
        .body(format!(r#"{{"username_or_email":"{username}","password":"{password}"}}"#))
        .dispatch();
    assert_eq!(res.status(), Status::Ok, "login failed for {username}");
    let body: serde_json::Value = res.into_json().unwrap();
    let data = &body["data"];
    let access_token = data["access_token"].as_str().expect("access_token present").to_string();
    let user_id = data["user"]["id"].as_str().expect("user id present").to_string();
    (user_id, access_token)
}

pub fn auth_header(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

pub fn admin_login(client: &Client) -> String {
    let res = client
        .post("/api/v1/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"username_or_email":"admin","password":"Sup3r-Secret-Passw0rd!"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    body["data"]["access_token"].as_str().unwrap().to_string()
}
