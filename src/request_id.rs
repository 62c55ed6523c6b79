//! Per-request UUID, attached to every response as `X-Request-ID` and
//! echoed in each `Envelope`'s `meta.requestId` (§4.10, §7: "the request id
//! is always echoed"). Generated once per request in `on_request` and read
//! back from the request-local cache wherever a response is built, so every
//! handler and error path sees the same id without threading it through
//! function signatures.

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::{Data, Request, Response};
use uuid::Uuid;

struct RequestIdValue(String);

pub struct RequestId;

#[rocket::async_trait]
impl Fairing for RequestId {
    fn info(&self) -> Info {
        Info { name: "Request ID", kind: Kind::Request | Kind::Response }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        req.local_cache(|| RequestIdValue(Uuid::new_v4().to_string()));
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        res.set_header(Header::new("X-Request-ID", current(req)));
    }
}

/// Reads this request's id, generating one on the spot if the fairing
/// somehow didn't run first (e.g. a catcher invoked before ignition).
pub fn current(req: &Request<'_>) -> String {
    req.local_cache(|| RequestIdValue(Uuid::new_v4().to_string())).0.clone()
}
